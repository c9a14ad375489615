use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::DispatchError;
use crate::provider::{CapabilityProvider, DisplayBounds};
use crate::video::{encode_jpeg, EncodedFrame, EncoderConfig};

/// Rectangle of the display to capture, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureRegion {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

impl CaptureRegion {
    pub fn new(left: u32, top: u32, width: u32, height: u32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    /// The whole display.
    pub fn full(bounds: DisplayBounds) -> Self {
        Self::new(0, 0, bounds.width, bounds.height)
    }
}

impl fmt::Display for CaptureRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}+{}+{}", self.width, self.height, self.left, self.top)
    }
}

/// Capture Manager
///
/// Captures a region through the provider and encodes it into a
/// fingerprinted JPEG frame.
#[derive(Clone)]
pub struct CaptureManager {
    provider: Arc<dyn CapabilityProvider>,
}

impl CaptureManager {
    pub fn new(provider: Arc<dyn CapabilityProvider>) -> Self {
        Self { provider }
    }

    /// Capture `region` and encode it at `quality`, optionally resampled.
    ///
    /// A provider failure is reported as [`DispatchError::Capture`].
    pub async fn encode(
        &self,
        region: CaptureRegion,
        quality: u8,
        resize: Option<(u32, u32)>,
    ) -> Result<EncodedFrame, DispatchError> {
        let raw = self.provider.capture_region(region).await.map_err(|e| {
            warn!("Capture of {} failed: {:#}", region, e);
            DispatchError::Capture(format!("Failed to capture region {}: {:#}", region, e))
        })?;

        debug!("Captured {}: {} bytes raw", region, raw.data.len());

        let config = EncoderConfig { quality, resize };
        // JPEG encoding is CPU bound; keep it off the async workers
        let frame = tokio::task::spawn_blocking(move || encode_jpeg(&raw, &config))
            .await
            .map_err(|e| DispatchError::handler(format!("Encode task failed: {}", e)))??;

        Ok(frame)
    }
}
