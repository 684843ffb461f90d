//! Re-encoding and down-scaling of images to fit WeChat upload limits.

use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat};

use crate::error::ProcessError;
use crate::sanitize::redact_path;

const DEFAULT_JPEG_QUALITY: u8 = 85;
const MIN_JPEG_QUALITY: u8 = 60;
const QUALITY_STEP: u8 = 5;
const MAX_INITIAL_SCALE: f64 = 0.95;
const SCALE_STEP: f64 = 0.9;
const MIN_SCALE: f64 = 0.1;

/// Size and encoding constraints for one kind of upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageTarget {
    pub name: &'static str,
    pub max_bytes: u64,
    /// Accepted encodings; the first one is used when converting.
    pub formats: &'static [ImageFormat],
}

impl ImageTarget {
    /// Permanent thumbnail material: JPEG, at most 64 KiB.
    pub const fn thumbnail() -> Self {
        Self {
            name: "thumbnail",
            max_bytes: 64 * 1024,
            formats: &[ImageFormat::Jpeg],
        }
    }

    /// Image embedded in article content: JPEG or PNG, at most 1 MiB.
    pub const fn content_image() -> Self {
        Self {
            name: "content image",
            max_bytes: 1024 * 1024,
            formats: &[ImageFormat::Jpeg, ImageFormat::Png],
        }
    }

    fn accepts(&self, format: ImageFormat) -> bool {
        self.formats.contains(&format)
    }
}

/// Extension-based format, the same check the upload endpoints apply.
pub fn format_from_extension(path: &Path) -> Option<ImageFormat> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => Some(ImageFormat::Jpeg),
        "png" => Some(ImageFormat::Png),
        "gif" => Some(ImageFormat::Gif),
        "bmp" => Some(ImageFormat::Bmp),
        "webp" => Some(ImageFormat::WebP),
        "tif" | "tiff" => Some(ImageFormat::Tiff),
        _ => None,
    }
}

fn extension_for(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Png => "png",
        _ => "jpg",
    }
}

#[derive(Debug, Clone, Default)]
pub struct ImageOptimizer;

impl ImageOptimizer {
    pub fn new() -> Self {
        Self
    }

    /// Returns a path to an image satisfying `target`: the input itself when
    /// it already does, otherwise `<stem>_optimized.<ext>` written next to it.
    pub fn optimize(&self, path: &Path, target: &ImageTarget) -> Result<PathBuf, ProcessError> {
        let _span = tracing::info_span!(
            "processor.image.optimize",
            file = %redact_path(path),
            target = target.name
        )
        .entered();

        let bytes = std::fs::read(path).map_err(|e| ProcessError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;
        let size = bytes.len() as u64;

        let declared = format_from_extension(path);
        let detected = image::guess_format(&bytes).ok();

        let already_valid = size <= target.max_bytes
            && matches!((declared, detected), (Some(d), Some(g)) if d == g && target.accepts(d));
        if already_valid {
            tracing::debug!(size, "image already within limits");
            return Ok(path.to_path_buf());
        }

        let detected = detected.ok_or_else(|| ProcessError::UnsupportedFormat(redact_path(path)))?;
        let img = image::load_from_memory_with_format(&bytes, detected).map_err(|e| {
            ProcessError::ImageProcessing(format!(
                "failed to decode {}: {}",
                redact_path(path),
                e
            ))
        })?;

        let output_format = if target.accepts(detected) {
            detected
        } else {
            target.formats[0]
        };

        tracing::info!(
            size,
            limit = target.max_bytes,
            ?output_format,
            "optimizing image"
        );

        let encoded = reduce(&img, size, output_format, target.max_bytes)?.ok_or_else(|| {
            ProcessError::ImageProcessing(format!(
                "could not reduce {} below {} KB",
                redact_path(path),
                target.max_bytes / 1024
            ))
        })?;

        let output = optimized_path(path, encoded.format);
        std::fs::write(&output, &encoded.bytes).map_err(|e| {
            ProcessError::ImageProcessing(format!(
                "failed to write {}: {}",
                redact_path(&output),
                e
            ))
        })?;

        tracing::info!(
            from = size,
            to = encoded.bytes.len(),
            output = %redact_path(&output),
            "image optimized"
        );
        Ok(output)
    }
}

struct Encoded {
    bytes: Vec<u8>,
    format: ImageFormat,
}

/// Quality reduction, then down-scaling, then a last minimum-quality JPEG.
fn reduce(
    img: &DynamicImage,
    original_size: u64,
    format: ImageFormat,
    max_bytes: u64,
) -> Result<Option<Encoded>, ProcessError> {
    let fits = |bytes: &Vec<u8>| bytes.len() as u64 <= max_bytes;

    if format == ImageFormat::Jpeg {
        let mut quality = DEFAULT_JPEG_QUALITY;
        while quality >= MIN_JPEG_QUALITY {
            let bytes = encode_jpeg(img, quality)?;
            if fits(&bytes) {
                return Ok(Some(Encoded { bytes, format }));
            }
            tracing::debug!(quality, size = bytes.len(), "still too large");
            quality -= QUALITY_STEP;
        }
    }

    let (width, height) = img.dimensions();
    let mut scale = (max_bytes as f64 / original_size.max(1) as f64)
        .sqrt()
        .min(MAX_INITIAL_SCALE);

    while scale > MIN_SCALE {
        let new_width = ((width as f64 * scale) as u32).max(1);
        let new_height = ((height as f64 * scale) as u32).max(1);
        let resized = img.resize_exact(new_width, new_height, FilterType::Lanczos3);

        let bytes = match format {
            ImageFormat::Png => encode_png(&resized)?,
            _ => encode_jpeg(&resized, DEFAULT_JPEG_QUALITY)?,
        };
        if fits(&bytes) {
            return Ok(Some(Encoded { bytes, format }));
        }
        tracing::debug!(new_width, new_height, size = bytes.len(), "resized still too large");
        scale *= SCALE_STEP;
    }

    let bytes = encode_jpeg(img, MIN_JPEG_QUALITY)?;
    if fits(&bytes) {
        return Ok(Some(Encoded {
            bytes,
            format: ImageFormat::Jpeg,
        }));
    }

    Ok(None)
}

fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, ProcessError> {
    let mut buffer = Vec::new();
    img.to_rgb8()
        .write_with_encoder(JpegEncoder::new_with_quality(&mut buffer, quality))
        .map_err(|e| ProcessError::ImageProcessing(format!("JPEG encoding failed: {}", e)))?;
    Ok(buffer)
}

fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, ProcessError> {
    let mut buffer = Vec::new();
    img.write_with_encoder(PngEncoder::new_with_quality(
        &mut buffer,
        CompressionType::Best,
        PngFilter::Adaptive,
    ))
    .map_err(|e| ProcessError::ImageProcessing(format!("PNG encoding failed: {}", e)))?;
    Ok(buffer)
}

fn optimized_path(path: &Path, format: ImageFormat) -> PathBuf {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("image");
    path.with_file_name(format!("{}_optimized.{}", stem, extension_for(format)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    /// Deterministic noise compresses badly, which is what these tests need.
    fn noise(width: u32, height: u32) -> DynamicImage {
        let mut state: u32 = 0x1234_5678;
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |_, _| {
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            let [a, b, c, _] = state.to_le_bytes();
            Rgb([a, b, c])
        }))
    }

    fn write_jpeg(dir: &TempDir, name: &str, img: &DynamicImage, quality: u8) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, encode_jpeg(img, quality).unwrap()).unwrap();
        path
    }

    #[test]
    fn test_small_jpeg_returned_unchanged() {
        let dir = TempDir::new().unwrap();
        let path = write_jpeg(&dir, "small.jpg", &noise(16, 16), 80);

        let out = ImageOptimizer::new()
            .optimize(&path, &ImageTarget::thumbnail())
            .unwrap();
        assert_eq!(out, path);
    }

    #[test]
    fn test_large_jpeg_reduced_for_thumbnail() {
        let dir = TempDir::new().unwrap();
        let path = write_jpeg(&dir, "cover.jpg", &noise(400, 400), 100);
        assert!(std::fs::metadata(&path).unwrap().len() > 64 * 1024);

        let out = ImageOptimizer::new()
            .optimize(&path, &ImageTarget::thumbnail())
            .unwrap();

        assert_eq!(out, dir.path().join("cover_optimized.jpg"));
        assert!(std::fs::metadata(&out).unwrap().len() <= 64 * 1024);
        assert_eq!(
            image::guess_format(&std::fs::read(&out).unwrap()).unwrap(),
            ImageFormat::Jpeg
        );
    }

    #[test]
    fn test_png_cover_converted_to_jpeg() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cover.png");
        noise(32, 32).save(&path).unwrap();

        let out = ImageOptimizer::new()
            .optimize(&path, &ImageTarget::thumbnail())
            .unwrap();

        assert_eq!(out, dir.path().join("cover_optimized.jpg"));
    }

    #[test]
    fn test_small_png_is_valid_content_image() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("diagram.png");
        noise(32, 32).save(&path).unwrap();

        let out = ImageOptimizer::new()
            .optimize(&path, &ImageTarget::content_image())
            .unwrap();
        assert_eq!(out, path);
    }

    #[test]
    fn test_large_png_content_image_stays_png() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("big.png");
        noise(800, 800).save(&path).unwrap();
        assert!(std::fs::metadata(&path).unwrap().len() > 1024 * 1024);

        let out = ImageOptimizer::new()
            .optimize(&path, &ImageTarget::content_image())
            .unwrap();

        assert!(std::fs::metadata(&out).unwrap().len() <= 1024 * 1024);
        assert_eq!(out, dir.path().join("big_optimized.png"));
    }

    #[test]
    fn test_mislabelled_extension_is_reencoded() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("photo.jpg");
        noise(16, 16).save_with_format(&path, ImageFormat::Png).unwrap();

        let out = ImageOptimizer::new()
            .optimize(&path, &ImageTarget::thumbnail())
            .unwrap();
        assert_eq!(out, dir.path().join("photo_optimized.jpg"));
    }

    #[test]
    fn test_non_image_is_unsupported_format() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.jpg");
        std::fs::write(&path, b"definitely not an image").unwrap();

        let result = ImageOptimizer::new().optimize(&path, &ImageTarget::thumbnail());
        assert!(matches!(result, Err(ProcessError::UnsupportedFormat(name)) if name == "broken.jpg"));
    }

    #[test]
    fn test_truncated_image_is_processing_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cut.png");
        noise(16, 16).save_with_format(&path, ImageFormat::Png).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();

        let result = ImageOptimizer::new().optimize(&path, &ImageTarget::thumbnail());
        assert!(matches!(result, Err(ProcessError::ImageProcessing(_))));
    }

    #[test]
    fn test_missing_file() {
        let result = ImageOptimizer::new()
            .optimize(Path::new("/nonexistent/a.jpg"), &ImageTarget::thumbnail());
        assert!(matches!(result, Err(ProcessError::ReadFile { .. })));
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(
            format_from_extension(Path::new("a.JPEG")),
            Some(ImageFormat::Jpeg)
        );
        assert_eq!(format_from_extension(Path::new("a.png")), Some(ImageFormat::Png));
        assert_eq!(format_from_extension(Path::new("a")), None);
    }
}
