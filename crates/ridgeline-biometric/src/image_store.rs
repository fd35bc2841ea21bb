//! Captured images on disk.
//!
//! Images are written as 8-bit grayscale BMP files named
//! `fingerprint_<YYYYMMDD_HHMMSS>.bmp` (local time) under one directory.
//! The returned path is the only thing downstream consumers rely on.

use bytes::{BufMut, Bytes, BytesMut};
use chrono::{DateTime, Local};
use ridgeline_core::Result;
use ridgeline_core::constants::{
    DEFAULT_IMAGE_DIR, IMAGE_EXTENSION, IMAGE_FILE_PREFIX, IMAGE_TIMESTAMP_FORMAT,
};
use ridgeline_hardware::FingerprintImage;
use std::path::{Path, PathBuf};
use tracing::info;

const FILE_HEADER_LEN: u32 = 14;
const INFO_HEADER_LEN: u32 = 40;
const PALETTE_LEN: u32 = 256 * 4;
const PIXEL_OFFSET: u32 = FILE_HEADER_LEN + INFO_HEADER_LEN + PALETTE_LEN;

/// Encode an image as an uncompressed 8-bit grayscale BMP.
///
/// Rows are stored bottom-up and padded to four bytes.
pub fn encode_bmp(image: &FingerprintImage) -> Bytes {
    let width = u32::from(image.width());
    let height = u32::from(image.height());
    let stride = (width + 3) & !3;
    let pixel_len = stride * height;
    let file_len = PIXEL_OFFSET + pixel_len;

    let mut buf = BytesMut::with_capacity(file_len as usize);

    // BITMAPFILEHEADER
    buf.put_slice(b"BM");
    buf.put_u32_le(file_len);
    buf.put_u32_le(0);
    buf.put_u32_le(PIXEL_OFFSET);

    // BITMAPINFOHEADER
    buf.put_u32_le(INFO_HEADER_LEN);
    buf.put_i32_le(width as i32);
    buf.put_i32_le(height as i32);
    buf.put_u16_le(1); // planes
    buf.put_u16_le(8); // bits per pixel
    buf.put_u32_le(0); // BI_RGB
    buf.put_u32_le(pixel_len);
    buf.put_i32_le(2_835); // 72 dpi
    buf.put_i32_le(2_835);
    buf.put_u32_le(256);
    buf.put_u32_le(0);

    for level in 0..=255u8 {
        buf.put_slice(&[level, level, level, 0]);
    }

    let padding = (stride - width) as usize;
    for y in (0..image.height()).rev() {
        buf.put_slice(image.row(y));
        buf.put_bytes(0, padding);
    }

    buf.freeze()
}

/// Writes captured images into one directory.
#[derive(Debug, Clone)]
pub struct ImageStore {
    dir: PathBuf,
}

impl ImageStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path an image taken at `taken_at` is written to.
    pub fn path_for(&self, taken_at: DateTime<Local>) -> PathBuf {
        self.dir.join(format!(
            "{}{}.{}",
            IMAGE_FILE_PREFIX,
            taken_at.format(IMAGE_TIMESTAMP_FORMAT),
            IMAGE_EXTENSION
        ))
    }

    /// Write `image` stamped with the current local time.
    ///
    /// The directory is created when missing. A second image within the
    /// same second replaces the first.
    ///
    /// # Errors
    ///
    /// [`ridgeline_core::Error::ImageStore`] when the directory or file
    /// cannot be written.
    pub async fn save(&self, image: &FingerprintImage) -> Result<PathBuf> {
        self.save_at(image, Local::now()).await
    }

    pub async fn save_at(&self, image: &FingerprintImage, taken_at: DateTime<Local>) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(taken_at);
        tokio::fs::write(&path, encode_bmp(image)).await?;
        info!("Saved fingerprint image to {}", path.display());
        Ok(path)
    }
}

impl Default for ImageStore {
    fn default() -> Self {
        Self::new(DEFAULT_IMAGE_DIR)
    }
}
