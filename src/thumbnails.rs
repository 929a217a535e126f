use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use rayon::prelude::*;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use crate::error::{CatalogError, Result};
use crate::scanner::ImageRef;

const THUMB_SUFFIX: &str = "_thumbnail.jpg";
const THUMB_HEIGHT: u32 = 256;
const THUMB_FILTER: FilterType = FilterType::Lanczos3;
const THUMB_JPEG_QUALITY: u8 = 85;

/// Deterministic thumbnail path for a source image: `<stem>_thumbnail.jpg`
/// under the cache directory.
pub fn thumbnail_path(reference: &ImageRef, cache_dir: &Path) -> PathBuf {
    let name = reference.file_name();
    let stem = name.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(name);
    cache_dir.join(format!("{}{}", stem, THUMB_SUFFIX))
}

/// Returns the cached thumbnail path, generating the file first if absent.
///
/// An existing thumbnail is never invalidated: if the source image is edited
/// afterwards, the stale thumbnail stays (documented limitation).
pub fn ensure_thumbnail(reference: &ImageRef, cache_dir: &Path) -> Result<PathBuf> {
    let thumb_path = thumbnail_path(reference, cache_dir);
    if thumb_path.exists() {
        return Ok(thumb_path);
    }

    std::fs::create_dir_all(cache_dir).map_err(|e| CatalogError::io(cache_dir, e))?;

    let img = image::open(&reference.path).map_err(|e| CatalogError::Io {
        path: reference.path.clone(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
    })?;
    let ratio = img.width() as f32 / img.height() as f32;
    let width = (THUMB_HEIGHT as f32 * ratio).round().max(1.0) as u32;
    let thumbnail = img.resize(width, THUMB_HEIGHT, THUMB_FILTER);

    let rgb = thumbnail.to_rgb8();
    let file = File::create(&thumb_path).map_err(|e| CatalogError::io(&thumb_path, e))?;
    let writer = BufWriter::with_capacity(64 * 1024, file);
    let mut encoder = JpegEncoder::new_with_quality(writer, THUMB_JPEG_QUALITY);
    encoder
        .encode(
            rgb.as_raw(),
            rgb.width(),
            rgb.height(),
            image::ExtendedColorType::Rgb8,
        )
        .map_err(|e| CatalogError::Io {
            path: thumb_path.clone(),
            source: std::io::Error::other(e),
        })?;

    Ok(thumb_path)
}

/// Generates any missing thumbnails for a batch of references in parallel.
/// Per-image failures are logged and skipped; the returned pairs cover the
/// successes only.
pub fn generate_missing(refs: &[ImageRef], cache_dir: &Path) -> Vec<(ImageRef, PathBuf)> {
    if let Err(error) = std::fs::create_dir_all(cache_dir) {
        log::error!(
            "thumbnail cache dir {} unavailable: {}",
            cache_dir.display(),
            error
        );
        return Vec::new();
    }

    refs.par_iter()
        .filter_map(|reference| match ensure_thumbnail(reference, cache_dir) {
            Ok(thumb_path) => Some((reference.clone(), thumb_path)),
            Err(error) => {
                log::warn!("thumbnail failed for {}: {}", reference.relative, error);
                None
            }
        })
        .collect()
}
