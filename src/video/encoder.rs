/*!
 * Frame Encoder Module
 *
 * Compresses raw frames to JPEG and fingerprints the compressed bytes.
 * The fingerprint answers "would I send identical bytes", so it is taken
 * over the encoder output, never over the raw pixels.
 */

use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::ColorType;
use tracing::debug;

use super::frame::RawFrame;

/// Length of a fingerprint in hex characters
pub const FINGERPRINT_LEN: usize = 64;

/// Encoder configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderConfig {
    /// JPEG quality, 1-100
    pub quality: u8,
    /// Target dimensions; aspect ratio is not preserved
    pub resize: Option<(u32, u32)>,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            quality: 50,
            resize: None,
        }
    }
}

/// Encoded frame
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    /// JPEG bytes
    pub data: Vec<u8>,
    /// Hex digest of `data`
    pub fingerprint: String,
    /// Encoded width
    pub width: u32,
    /// Encoded height
    pub height: u32,
    /// Capture timestamp in milliseconds since epoch
    pub timestamp_ms: u64,
}

/// Compute the fingerprint of a compressed frame.
pub fn fingerprint(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

/// Encode a raw frame to JPEG, resampling first when requested.
///
/// CPU bound; call from a blocking context.
pub fn encode_jpeg(frame: &RawFrame, config: &EncoderConfig) -> Result<EncodedFrame> {
    let mut image = frame.to_rgb_image().context("Failed to convert frame to RGB")?;

    if let Some((width, height)) = config.resize {
        if (width, height) != image.dimensions() {
            image = imageops::resize(&image, width, height, FilterType::Lanczos3);
        }
    }

    let (width, height) = image.dimensions();
    let mut data = Vec::new();
    JpegEncoder::new_with_quality(&mut data, config.quality)
        .encode(image.as_raw(), width, height, ColorType::Rgb8)
        .context("JPEG encoding failed")?;

    let fingerprint = fingerprint(&data);
    debug!(
        "Encoded {}x{} frame at quality {}: {} bytes ({})",
        width,
        height,
        config.quality,
        data.len(),
        &fingerprint[..12]
    );

    Ok(EncodedFrame {
        data,
        fingerprint,
        width,
        height,
        timestamp_ms: frame.timestamp_ms,
    })
}
