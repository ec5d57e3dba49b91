// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Content-addressed thumbnail cache

use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::config::ThumbnailConfig;
use crate::Result;

/// Produces a thumbnail file for a source image
pub trait ThumbnailCache: Send + Sync {
    /// Return the thumbnail path, generating it on first use
    fn ensure_thumb(&self, source: &Path) -> Result<PathBuf>;
}

/// Thumbnails stored as `<hash>.jpg` in a cache directory
#[derive(Debug, Clone)]
pub struct DiskThumbnailCache {
    dir: PathBuf,
    size: u32,
    quality: u8,
}

impl DiskThumbnailCache {
    pub fn new(dir: impl Into<PathBuf>, config: &ThumbnailConfig) -> Self {
        Self {
            dir: dir.into(),
            size: config.size,
            quality: config.quality,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Cache key: hash of source path, cache dir and size
    pub fn thumb_key(&self, source: &Path) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(source.to_string_lossy().as_bytes());
        hasher.update(format!("{}:{}x{}", self.dir.display(), self.size, self.size).as_bytes());
        format!("{}.jpg", hasher.finalize().to_hex())
    }

    fn render(&self, source: &Path, out: &Path) -> Result<()> {
        let img = image::open(source)?;
        let thumb = DynamicImage::ImageRgb8(img.thumbnail(self.size, self.size).to_rgb8());

        fs::create_dir_all(&self.dir)?;

        // Write beside the target and rename so readers never see a partial file
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        {
            let mut writer = BufWriter::new(&mut tmp);
            thumb.write_with_encoder(JpegEncoder::new_with_quality(&mut writer, self.quality))?;
            writer.flush()?;
        }
        tmp.persist(out).map_err(|e| e.error)?;
        Ok(())
    }
}

impl ThumbnailCache for DiskThumbnailCache {
    fn ensure_thumb(&self, source: &Path) -> Result<PathBuf> {
        let out = self.dir.join(self.thumb_key(source));
        if out.exists() {
            return Ok(out);
        }
        debug!("Generating thumbnail for {:?}", source);
        self.render(source, &out)?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, Rgba, RgbaImage};

    fn cache(dir: &Path, size: u32) -> DiskThumbnailCache {
        let config = ThumbnailConfig {
            dir: None,
            size,
            quality: 85,
        };
        DiskThumbnailCache::new(dir.join("thumbs"), &config)
    }

    #[test]
    fn test_thumbnail_fits_bounding_box() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("wide.png");
        RgbaImage::from_pixel(64, 32, Rgba([200, 10, 10, 255])).save(&source).unwrap();

        let thumbs = cache(dir.path(), 16);
        let out = thumbs.ensure_thumb(&source).unwrap();
        assert!(out.starts_with(thumbs.dir()));
        assert_eq!(out.extension().and_then(|e| e.to_str()), Some("jpg"));

        let thumb = image::open(&out).unwrap();
        assert_eq!(thumb.dimensions(), (16, 8));
    }

    #[test]
    fn test_second_call_reuses_file() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("a.png");
        RgbaImage::from_pixel(8, 8, Rgba([0, 0, 0, 255])).save(&source).unwrap();

        let thumbs = cache(dir.path(), 4);
        let first = thumbs.ensure_thumb(&source).unwrap();
        let modified = fs::metadata(&first).unwrap().modified().unwrap();
        let second = thumbs.ensure_thumb(&source).unwrap();
        assert_eq!(first, second);
        assert_eq!(fs::metadata(&second).unwrap().modified().unwrap(), modified);
    }

    #[test]
    fn test_cache_dir_holds_only_thumbnails() {
        let dir = tempfile::tempdir().unwrap();
        let thumbs = cache(dir.path(), 4);
        for name in ["a.png", "b.png"] {
            let source = dir.path().join(name);
            RgbaImage::from_pixel(8, 8, Rgba([9, 9, 9, 255])).save(&source).unwrap();
            thumbs.ensure_thumb(&source).unwrap();
        }

        let mut names: Vec<String> = fs::read_dir(thumbs.dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names.len(), 2);
        assert!(names.iter().all(|n| n.ends_with(".jpg")));
    }

    #[test]
    fn test_key_depends_on_size() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("a.png");
        assert_ne!(cache(dir.path(), 16).thumb_key(&source), cache(dir.path(), 32).thumb_key(&source));
        assert_eq!(cache(dir.path(), 16).thumb_key(&source), cache(dir.path(), 16).thumb_key(&source));
    }

    #[test]
    fn test_unreadable_source_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("broken.jpg");
        fs::write(&source, b"not an image").unwrap();

        let thumbs = cache(dir.path(), 16);
        assert!(thumbs.ensure_thumb(&source).is_err());
        assert!(!dir.path().join("thumbs").join(thumbs.thumb_key(&source)).exists());
    }
}
