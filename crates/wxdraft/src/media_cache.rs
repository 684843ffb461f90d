//! Content-addressed cache of remote media uploads.
//!
//! Keys are file digests from [`crate::hashing::ContentHasher`]. Thumbnails map
//! to a permanent media id, content images to either the uploaded URL or the
//! reason the upload failed, so a failing image is not retried within its
//! lifetime. The cache is advisory: a miss only costs a redundant upload.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use moka::sync::Cache;
use moka::Expiry;
use serde::{Deserialize, Serialize};

/// Outcome of a content image upload, cached either way.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ContentImageResult {
    Uploaded { url: String },
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Stored<V> {
    value: V,
    /// Unix seconds; drives expiry so restored snapshots keep their age.
    stored_at: i64,
}

impl<V> Stored<V> {
    fn now(value: V) -> Self {
        Self {
            value,
            stored_at: Utc::now().timestamp(),
        }
    }
}

struct AgeExpiry {
    ttl: Option<Duration>,
}

impl AgeExpiry {
    fn remaining(&self, stored_at: i64) -> Option<Duration> {
        let ttl = self.ttl?;
        let age = Utc::now().timestamp().saturating_sub(stored_at).max(0) as u64;
        Some(ttl.saturating_sub(Duration::from_secs(age)))
    }
}

impl<V> Expiry<String, Stored<V>> for AgeExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &Stored<V>,
        _created_at: Instant,
    ) -> Option<Duration> {
        self.remaining(value.stored_at)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &Stored<V>,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        self.remaining(value.stored_at)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    #[serde(default)]
    thumbs: BTreeMap<String, Stored<String>>,
    #[serde(default)]
    content_images: BTreeMap<String, Stored<ContentImageResult>>,
}

/// Hit and miss counters since construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub thumb_hits: u64,
    pub thumb_misses: u64,
    pub content_hits: u64,
    pub content_misses: u64,
}

#[derive(Default)]
struct Counters {
    thumb_hits: AtomicU64,
    thumb_misses: AtomicU64,
    content_hits: AtomicU64,
    content_misses: AtomicU64,
}

/// Shared media cache. Cloning is cheap and clones share state.
#[derive(Clone)]
pub struct MediaCache {
    thumbs: Cache<String, Stored<String>>,
    content_images: Cache<String, Stored<ContentImageResult>>,
    persist_path: Option<PathBuf>,
    counters: Arc<Counters>,
}

impl MediaCache {
    /// Creates an empty in-memory cache. `ttl = None` keeps entries until
    /// [`MediaCache::invalidate_all`].
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            thumbs: Cache::builder()
                .expire_after(AgeExpiry { ttl })
                .build(),
            content_images: Cache::builder()
                .expire_after(AgeExpiry { ttl })
                .build(),
            persist_path: None,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Creates a cache backed by a JSON snapshot at `path`, restoring any
    /// entries that have not yet expired. A missing or unreadable snapshot
    /// yields an empty cache.
    pub fn load(path: impl Into<PathBuf>, ttl: Option<Duration>) -> Self {
        let path = path.into();
        let mut cache = Self::new(ttl);

        match read_snapshot(&path) {
            Ok(Some(snapshot)) => {
                let expiry = AgeExpiry { ttl };
                for (digest, stored) in snapshot.thumbs {
                    if expiry.remaining(stored.stored_at) != Some(Duration::ZERO) {
                        cache.thumbs.insert(digest, stored);
                    }
                }
                for (digest, stored) in snapshot.content_images {
                    if expiry.remaining(stored.stored_at) != Some(Duration::ZERO) {
                        cache.content_images.insert(digest, stored);
                    }
                }
                log::debug!(
                    "Restored media cache from {}: {} thumbs, {} content images",
                    crate::sanitize::redact_path(&path),
                    cache.thumbs.entry_count(),
                    cache.content_images.entry_count()
                );
            }
            Ok(None) => {}
            Err(e) => {
                log::warn!(
                    "Ignoring unreadable media cache snapshot {}: {}",
                    crate::sanitize::redact_path(&path),
                    e
                );
            }
        }

        cache.persist_path = Some(path);
        cache
    }

    pub fn get_thumb(&self, digest: &str) -> Option<String> {
        let found = self.thumbs.get(digest).map(|stored| stored.value);
        self.count(
            found.is_some(),
            &self.counters.thumb_hits,
            &self.counters.thumb_misses,
        );
        found
    }

    pub fn put_thumb(&self, digest: &str, media_id: &str) {
        self.thumbs
            .insert(digest.to_string(), Stored::now(media_id.to_string()));
    }

    pub fn get_content_image(&self, digest: &str) -> Option<ContentImageResult> {
        let found = self.content_images.get(digest).map(|stored| stored.value);
        self.count(
            found.is_some(),
            &self.counters.content_hits,
            &self.counters.content_misses,
        );
        found
    }

    pub fn put_content_image(&self, digest: &str, result: ContentImageResult) {
        self.content_images
            .insert(digest.to_string(), Stored::now(result));
    }

    pub fn invalidate_all(&self) {
        self.thumbs.invalidate_all();
        self.content_images.invalidate_all();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            thumb_hits: self.counters.thumb_hits.load(Ordering::Relaxed),
            thumb_misses: self.counters.thumb_misses.load(Ordering::Relaxed),
            content_hits: self.counters.content_hits.load(Ordering::Relaxed),
            content_misses: self.counters.content_misses.load(Ordering::Relaxed),
        }
    }

    /// Writes the current entries to the snapshot file, if one is configured.
    /// Failures are logged and otherwise ignored.
    pub fn persist(&self) {
        let Some(path) = &self.persist_path else {
            return;
        };

        if let Err(e) = self.write_snapshot(path) {
            log::warn!(
                "Failed to persist media cache to {}: {}",
                crate::sanitize::redact_path(path),
                e
            );
        }
    }

    fn write_snapshot(&self, path: &Path) -> std::io::Result<()> {
        let snapshot = Snapshot {
            thumbs: self
                .thumbs
                .iter()
                .map(|(k, v)| (k.as_ref().clone(), v))
                .collect(),
            content_images: self
                .content_images
                .iter()
                .map(|(k, v)| (k.as_ref().clone(), v))
                .collect(),
        };

        let json = serde_json::to_vec_pretty(&snapshot).map_err(std::io::Error::other)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)
    }

    fn count(&self, hit: bool, hits: &AtomicU64, misses: &AtomicU64) {
        if hit {
            hits.fetch_add(1, Ordering::Relaxed);
        } else {
            misses.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl std::fmt::Debug for MediaCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaCache")
            .field("thumbs", &self.thumbs.entry_count())
            .field("content_images", &self.content_images.entry_count())
            .field("persist_path", &self.persist_path)
            .finish()
    }
}

fn read_snapshot(path: &Path) -> std::io::Result<Option<Snapshot>> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    let snapshot = serde_json::from_slice(&bytes).map_err(std::io::Error::other)?;
    Ok(Some(snapshot))
}
