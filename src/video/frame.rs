/*!
 * Raw Frame Representation
 *
 * Uncompressed pixel buffers as returned by a capability provider.
 */

use anyhow::{bail, Result};
use image::RgbImage;
use std::time::{SystemTime, UNIX_EPOCH};

/// Pixel format for raw frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// BGRA 8-bit per channel (X11 / GDI framebuffers)
    BGRA,
    /// RGBA 8-bit per channel
    RGBA,
    /// RGB 24-bit
    RGB24,
}

impl PixelFormat {
    /// Get bytes per pixel
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::BGRA | PixelFormat::RGBA => 4,
            PixelFormat::RGB24 => 3,
        }
    }
}

/// Raw uncompressed frame
#[derive(Debug, Clone)]
pub struct RawFrame {
    /// Frame pixel data, row-major without padding
    pub data: Vec<u8>,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Pixel format
    pub format: PixelFormat,
    /// Timestamp in milliseconds since epoch
    pub timestamp_ms: u64,
}

impl RawFrame {
    /// Create a new raw frame stamped with the current time
    pub fn new(data: Vec<u8>, width: u32, height: u32, format: PixelFormat) -> Self {
        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();

        Self {
            data,
            width,
            height,
            format,
            timestamp_ms,
        }
    }

    /// Get expected data size for this frame
    pub fn expected_size(&self) -> usize {
        (self.width as usize) * (self.height as usize) * self.format.bytes_per_pixel()
    }

    /// Validate frame data size
    pub fn is_valid(&self) -> bool {
        self.data.len() == self.expected_size()
    }

    /// Copy a rectangle out of this frame, keeping its pixel format.
    /// The copy is timestamped now.
    pub fn crop(&self, left: u32, top: u32, width: u32, height: u32) -> Result<RawFrame> {
        if left.saturating_add(width) > self.width || top.saturating_add(height) > self.height {
            bail!(
                "Region {}x{}+{}+{} lies outside the {}x{} frame",
                width,
                height,
                left,
                top,
                self.width,
                self.height
            );
        }

        let bpp = self.format.bytes_per_pixel();
        let stride = self.width as usize * bpp;
        let row_len = width as usize * bpp;
        let mut data = Vec::with_capacity(row_len * height as usize);
        for row in top..top + height {
            let start = row as usize * stride + left as usize * bpp;
            data.extend_from_slice(&self.data[start..start + row_len]);
        }

        Ok(RawFrame::new(data, width, height, self.format))
    }

    /// Convert to a packed RGB image, dropping alpha
    pub fn to_rgb_image(&self) -> Result<RgbImage> {
        if !self.is_valid() {
            bail!(
                "Frame data is {} bytes, expected {} for {}x{} {:?}",
                self.data.len(),
                self.expected_size(),
                self.width,
                self.height,
                self.format
            );
        }

        let rgb: Vec<u8> = match self.format {
            PixelFormat::RGB24 => self.data.clone(),
            PixelFormat::RGBA => self
                .data
                .chunks_exact(4)
                .flat_map(|px| [px[0], px[1], px[2]])
                .collect(),
            PixelFormat::BGRA => self
                .data
                .chunks_exact(4)
                .flat_map(|px| [px[2], px[1], px[0]])
                .collect(),
        };

        match RgbImage::from_raw(self.width, self.height, rgb) {
            Some(image) => Ok(image),
            None => bail!("Failed to build {}x{} RGB image", self.width, self.height),
        }
    }
}
