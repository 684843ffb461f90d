//! Job repository, CRUD operations for the `publishing_jobs` table.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::ToSql;
use rusqlite::{params, Row};

use super::{Database, DatabaseError};
use crate::job::{JobFilter, JobStatus, JobStore, JobUpdate, PublishingJob};

const SELECT_COLUMNS: &str = "id, status, original_markdown_path, original_cover_image_path, \
     metadata, thumb_media_id, preview_path, wechat_media_id, error_message, \
     created_at, updated_at, published_at";

/// A raw job row as stored.
#[derive(Debug, Clone)]
struct JobRow {
    id: String,
    status: String,
    original_markdown_path: Option<String>,
    original_cover_image_path: Option<String>,
    metadata: String,
    thumb_media_id: Option<String>,
    preview_path: Option<String>,
    wechat_media_id: Option<String>,
    error_message: Option<String>,
    created_at: String,
    updated_at: String,
    published_at: Option<String>,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            status: row.get("status")?,
            original_markdown_path: row.get("original_markdown_path")?,
            original_cover_image_path: row.get("original_cover_image_path")?,
            metadata: row.get("metadata")?,
            thumb_media_id: row.get("thumb_media_id")?,
            preview_path: row.get("preview_path")?,
            wechat_media_id: row.get("wechat_media_id")?,
            error_message: row.get("error_message")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            published_at: row.get("published_at")?,
        })
    }

    fn into_job(self) -> Result<PublishingJob, DatabaseError> {
        let corrupt = |reason: String| DatabaseError::Corrupt {
            id: self.id.clone(),
            reason,
        };

        let status = self.status.parse::<JobStatus>().map_err(corrupt)?;
        let metadata = serde_json::from_str(&self.metadata)
            .map_err(|e| corrupt(format!("metadata: {}", e)))?;
        let created_at = parse_timestamp(&self.created_at).map_err(corrupt)?;
        let updated_at = parse_timestamp(&self.updated_at).map_err(corrupt)?;
        let published_at = self
            .published_at
            .as_deref()
            .map(parse_timestamp)
            .transpose()
            .map_err(corrupt)?;

        Ok(PublishingJob {
            id: self.id,
            status,
            original_markdown_path: self.original_markdown_path,
            original_cover_image_path: self.original_cover_image_path,
            metadata,
            thumb_media_id: self.thumb_media_id,
            preview_path: self.preview_path,
            wechat_media_id: self.wechat_media_id,
            error_message: self.error_message,
            created_at,
            updated_at,
            published_at,
        })
    }
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("timestamp '{}': {}", raw, e))
}

/// Inserts a fresh job row and returns its id.
pub fn insert(db: &Database, status: JobStatus) -> Result<String, DatabaseError> {
    let id = uuid::Uuid::new_v4().to_string();
    let now = format_timestamp(Utc::now());

    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO publishing_jobs (id, status, metadata, created_at, updated_at)
             VALUES (?1, ?2, '{}', ?3, ?3)",
            params![id, status.as_str(), now],
        )?;
        Ok(())
    })?;

    log::debug!("Created job {} ({})", id, status);
    Ok(id)
}

/// Finds a job by its ID.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<PublishingJob>, DatabaseError> {
    let row = db.with_conn(|conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM publishing_jobs WHERE id = ?1",
            SELECT_COLUMNS
        ))?;
        let mut rows = stmt.query_map(params![id], JobRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })?;

    row.map(JobRow::into_job).transpose()
}

/// Writes only the fields present in `update`; `updated_at` is always stamped.
pub fn update_fields(db: &Database, id: &str, update: &JobUpdate) -> Result<(), DatabaseError> {
    let mut assignments: Vec<&'static str> = Vec::new();
    let mut values: Vec<Box<dyn ToSql>> = Vec::new();

    if let Some(status) = update.status {
        assignments.push("status");
        values.push(Box::new(status.as_str()));
    }
    if let Some(path) = &update.original_markdown_path {
        assignments.push("original_markdown_path");
        values.push(Box::new(path.clone()));
    }
    if let Some(path) = &update.original_cover_image_path {
        assignments.push("original_cover_image_path");
        values.push(Box::new(path.clone()));
    }
    if let Some(metadata) = &update.metadata {
        let json = serde_json::to_string(metadata).map_err(|e| DatabaseError::Corrupt {
            id: id.to_string(),
            reason: format!("metadata: {}", e),
        })?;
        assignments.push("metadata");
        values.push(Box::new(json));
    }
    if let Some(media_id) = &update.thumb_media_id {
        assignments.push("thumb_media_id");
        values.push(Box::new(media_id.clone()));
    }
    if let Some(path) = &update.preview_path {
        assignments.push("preview_path");
        values.push(Box::new(path.clone()));
    }
    if let Some(media_id) = &update.wechat_media_id {
        assignments.push("wechat_media_id");
        values.push(Box::new(media_id.clone()));
    }
    if let Some(message) = &update.error_message {
        assignments.push("error_message");
        values.push(Box::new(message.clone()));
    }
    if let Some(published_at) = update.published_at {
        assignments.push("published_at");
        values.push(Box::new(format_timestamp(published_at)));
    }

    assignments.push("updated_at");
    values.push(Box::new(format_timestamp(Utc::now())));
    values.push(Box::new(id.to_string()));

    let set_clause = assignments
        .iter()
        .enumerate()
        .map(|(i, column)| format!("{} = ?{}", column, i + 1))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "UPDATE publishing_jobs SET {} WHERE id = ?{}",
        set_clause,
        values.len()
    );

    let changed = db.with_conn(|conn| {
        let params_ref: Vec<&dyn ToSql> = values.iter().map(|p| p.as_ref()).collect();
        Ok(conn.execute(&sql, params_ref.as_slice())?)
    })?;

    if changed == 0 {
        return Err(DatabaseError::JobNotFound(id.to_string()));
    }
    Ok(())
}

/// Lists jobs newest first.
pub fn query(db: &Database, filter: &JobFilter) -> Result<Vec<PublishingJob>, DatabaseError> {
    let rows = db.with_conn(|conn| {
        let mut param_values: Vec<Box<dyn ToSql>> = Vec::new();

        let where_clause = match filter.status {
            Some(status) => {
                param_values.push(Box::new(status.as_str()));
                "WHERE status = ?1"
            }
            None => "",
        };

        param_values.push(Box::new(filter.limit.unwrap_or(100) as i64));
        param_values.push(Box::new(filter.offset.unwrap_or(0) as i64));
        let sql = format!(
            "SELECT {} FROM publishing_jobs {} ORDER BY created_at DESC, id LIMIT ?{} OFFSET ?{}",
            SELECT_COLUMNS,
            where_clause,
            param_values.len() - 1,
            param_values.len()
        );

        let params_ref: Vec<&dyn ToSql> = param_values.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_ref.as_slice(), JobRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })?;

    rows.into_iter().map(JobRow::into_job).collect()
}

impl JobStore for Database {
    fn create(&self, status: JobStatus) -> Result<String, DatabaseError> {
        insert(self, status)
    }

    fn load(&self, id: &str) -> Result<Option<PublishingJob>, DatabaseError> {
        find_by_id(self, id)
    }

    fn save_fields(&self, id: &str, update: &JobUpdate) -> Result<(), DatabaseError> {
        update_fields(self, id, update)
    }

    fn list(&self, filter: &JobFilter) -> Result<Vec<PublishingJob>, DatabaseError> {
        query(self, filter)
    }
}
