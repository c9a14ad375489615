use anyhow::{bail, Context};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::capture::{CaptureManager, CaptureRegion};
use crate::config::ServerConfig;
use crate::dispatch::Reply;
use crate::error::DispatchError;
use crate::input::{HoldTable, HoldTarget};
use crate::provider::{normalize_key, ButtonAction, CapabilityProvider, KeyAction, MouseButton};
use crate::shutdown::ShutdownHandle;
use crate::streaming::{CaptureOutcome, CaptureRequest};
use crate::validation::RegionValidator;
use crate::video::EncodedFrame;

type HandlerResult = Result<Reply, DispatchError>;

/// Desk Agent
///
/// Owns the provider and the server-wide state every command touches: the
/// hold table, the default capture area, the fingerprint of the last frame
/// sent and the shutdown handle. Each public async method is the handler for
/// one route.
pub struct DeskAgent {
    provider: Arc<dyn CapabilityProvider>,
    capture: CaptureManager,
    holds: Arc<HoldTable>,
    capture_area: RwLock<Option<CaptureRegion>>,
    last_sent: Mutex<Option<String>>,
    shutdown: ShutdownHandle,
    config: ServerConfig,
}

impl DeskAgent {
    pub fn new(
        provider: Arc<dyn CapabilityProvider>,
        shutdown: ShutdownHandle,
        config: ServerConfig,
    ) -> Self {
        let holds = Arc::new(HoldTable::new(provider.clone(), config.hold_timeout));
        Self {
            capture: CaptureManager::new(provider.clone()),
            provider,
            holds,
            capture_area: RwLock::new(None),
            last_sent: Mutex::new(None),
            shutdown,
            config,
        }
    }

    pub fn holds(&self) -> &Arc<HoldTable> {
        &self.holds
    }

    pub fn shutdown_handle(&self) -> &ShutdownHandle {
        &self.shutdown
    }

    pub async fn screen_size(&self) -> HandlerResult {
        let bounds = self
            .provider
            .display_bounds()
            .await
            .context("Failed to get screen size")?;
        Ok(Reply::Json(json!({ "width": bounds.width, "height": bounds.height })))
    }

    /// Capture and encode one frame.
    ///
    /// The region is the requested area, else the default area, else the
    /// whole display; `full_display` skips straight to the whole display.
    async fn encode(
        &self,
        request: &CaptureRequest,
        full_display: bool,
    ) -> Result<EncodedFrame, DispatchError> {
        let bounds = self
            .provider
            .display_bounds()
            .await
            .map_err(|e| DispatchError::Capture(format!("Failed to read display bounds: {:#}", e)))?;

        let region = if full_display {
            CaptureRegion::full(bounds)
        } else {
            let default_area = *self.capture_area.read().await;
            request
                .area
                .or(default_area)
                .unwrap_or_else(|| CaptureRegion::full(bounds))
        };

        RegionValidator::new(bounds)
            .validate(&region)
            .map_err(|e| DispatchError::Capture(format!("{:#}", e)))?;

        let quality = request.quality.unwrap_or(self.config.default_quality);
        let frame = self.capture.encode(region, quality, request.resize).await?;
        debug!(
            "Encoded {} at q{}: {} bytes, {}",
            region,
            quality,
            frame.data.len(),
            frame.fingerprint
        );
        Ok(frame)
    }

    /// Capture, encode and diff against the client's last fingerprint.
    pub async fn capture(&self, request: CaptureRequest) -> HandlerResult {
        let frame = self.encode(&request, false).await?;
        let outcome = CaptureOutcome::diff(frame, request.last_hash.as_deref());
        *self.last_sent.lock().await = Some(outcome.fingerprint().to_string());
        Ok(Reply::Capture(outcome))
    }

    /// Capture the whole display, ignoring any requested or default area.
    pub async fn capture_full(&self, request: CaptureRequest) -> HandlerResult {
        let frame = self.encode(&request, true).await?;
        Ok(Reply::Capture(CaptureOutcome::diff(
            frame,
            request.last_hash.as_deref(),
        )))
    }

    /// Capture and diff against the last frame the server sent from
    /// `capture` or `capture_new_only`; a client-supplied hash is ignored.
    pub async fn capture_new_only(&self, request: CaptureRequest) -> HandlerResult {
        let mut last_sent = self.last_sent.lock().await;
        let frame = self.encode(&request, false).await?;
        let outcome = CaptureOutcome::diff(frame, last_sent.as_deref());
        *last_sent = Some(outcome.fingerprint().to_string());
        Ok(Reply::Capture(outcome))
    }

    /// Default area, or the full display when none has been set.
    pub async fn capture_area(&self) -> HandlerResult {
        let current = *self.capture_area.read().await;
        let area = match current {
            Some(area) => area,
            None => CaptureRegion::full(
                self.provider
                    .display_bounds()
                    .await
                    .context("Failed to get capture area")?,
            ),
        };
        Ok(Reply::Json(area_json(&area)))
    }

    pub async fn set_capture_area(&self, x: i64, y: i64, w: i64, h: i64) -> HandlerResult {
        if w <= 0 || h <= 0 {
            return Err(DispatchError::handler("Width and height must be positive"));
        }
        let to_u32 = |name: &str, value: i64| -> anyhow::Result<u32> {
            if value < 0 {
                bail!("Capture area {} must not be negative: {}", name, value);
            }
            u32::try_from(value).with_context(|| format!("Capture area {} is too large", name))
        };

        let area = CaptureRegion::new(to_u32("x", x)?, to_u32("y", y)?, to_u32("w", w)?, to_u32("h", h)?);
        *self.capture_area.write().await = Some(area);
        info!("Default capture area set to {}", area);

        Ok(Reply::Json(json!({ "success": true, "area": area_json(&area) })))
    }

    pub async fn mouse_position(&self) -> HandlerResult {
        let position = self
            .provider
            .pointer_position()
            .await
            .context("Failed to get mouse position")?;
        Ok(Reply::Json(json!({ "x": position.x, "y": position.y })))
    }

    pub async fn mouse_move(&self, x: i32, y: i32) -> HandlerResult {
        self.provider
            .move_pointer_to(x, y)
            .await
            .context("Failed to move mouse")?;
        Ok(Reply::Json(json!({ "success": true, "x": x, "y": y })))
    }

    pub async fn mouse_button(&self, button: MouseButton, action: ButtonAction) -> HandlerResult {
        let target = HoldTarget::Button(button);
        let result = match action {
            ButtonAction::Down => self.holds.on_down(target).await,
            ButtonAction::Up => self.holds.on_up(target).await,
        };
        result.with_context(|| format!("Failed to {} {} button", action, button))?;

        Ok(Reply::Json(json!({
            "success": true,
            "button": button.as_str(),
            "action": action.as_str(),
        })))
    }

    pub async fn scroll(&self, x: i32, y: i32) -> HandlerResult {
        self.provider.scroll(x, y).await.context("Failed to scroll")?;
        Ok(Reply::Json(json!({ "success": true, "x": x, "y": y })))
    }

    pub async fn key_press(&self, key: String) -> HandlerResult {
        self.provider
            .key_action(&key, KeyAction::Press)
            .await
            .with_context(|| format!("Failed to press key '{}'", key))?;
        Ok(Reply::Json(json!({ "success": true, "key": key })))
    }

    /// Hold or release `key`. Named keys share one hold whatever their
    /// spelling, so `Ctrl` down is ended by `ctrl` up.
    pub async fn key_action(&self, key: String, action: ButtonAction) -> HandlerResult {
        let target = HoldTarget::Key(normalize_key(&key));
        let result = match action {
            ButtonAction::Down => self.holds.on_down(target).await,
            ButtonAction::Up => self.holds.on_up(target).await,
        };
        result.with_context(|| format!("Failed to {} key '{}'", action, key))?;

        Ok(Reply::Json(json!({
            "success": true,
            "key": key,
            "action": action.as_str(),
        })))
    }

    pub async fn type_text(&self, text: String) -> HandlerResult {
        self.provider
            .type_text(&text)
            .await
            .context("Failed to type text")?;
        Ok(Reply::Json(json!({ "success": true, "text": text })))
    }

    pub async fn clipboard(&self) -> HandlerResult {
        let text = self
            .provider
            .clipboard_read()
            .await
            .context("Failed to get clipboard content")?;
        Ok(Reply::Json(json!({ "text": text })))
    }

    pub async fn set_clipboard(&self, text: String) -> HandlerResult {
        self.provider
            .clipboard_write(&text)
            .await
            .context("Failed to set clipboard content")?;
        Ok(Reply::Json(json!({ "success": true })))
    }

    /// Release every held input, then schedule the server to stop.
    ///
    /// The drain finishes before the acknowledgement is returned.
    pub async fn shutdown(&self) -> HandlerResult {
        let released = self.holds.release_all().await;
        info!("Shutdown requested; released {} held input(s)", released.len());

        self.shutdown.schedule(self.config.shutdown_grace);
        Ok(Reply::Json(json!({ "success": true, "message": "Server shutting down" })))
    }
}

fn area_json(area: &CaptureRegion) -> serde_json::Value {
    json!({ "x": area.left, "y": area.top, "w": area.width, "h": area.height })
}
