//! In-memory capability provider.
//!
//! Serves captures from a synthetic canvas and journals every injected input
//! instead of touching a real desktop.

use anyhow::{bail, Result};
use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use super::{
    ButtonAction, CapabilityProvider, DisplayBounds, KeyAction, MouseButton, PointerPosition,
};
use crate::capture::CaptureRegion;
use crate::video::{PixelFormat, RawFrame};

/// An input the provider was asked to inject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    PointerMove { x: i32, y: i32 },
    PointerButton { button: MouseButton, action: ButtonAction },
    Scroll { dx: i32, dy: i32 },
    Key { key: String, action: KeyAction },
    Text(String),
}

pub struct HeadlessProvider {
    canvas: RwLock<RawFrame>,
    pointer: Mutex<PointerPosition>,
    clipboard: Mutex<String>,
    journal: Mutex<Vec<InputEvent>>,
}

impl Default for HeadlessProvider {
    fn default() -> Self {
        Self::new(1920, 1080)
    }
}

impl HeadlessProvider {
    /// Create a provider whose display shows a static gradient.
    pub fn new(width: u32, height: u32) -> Self {
        let mut data = Vec::with_capacity(width as usize * height as usize * 4);
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&[(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8, 255]);
            }
        }

        Self {
            canvas: RwLock::new(RawFrame::new(data, width, height, PixelFormat::RGBA)),
            pointer: Mutex::new(PointerPosition { x: 0, y: 0 }),
            clipboard: Mutex::new(String::new()),
            journal: Mutex::new(Vec::new()),
        }
    }

    /// Fill a rectangle of the canvas with a solid colour, clipped to the display.
    pub async fn paint(&self, region: CaptureRegion, rgba: [u8; 4]) {
        let mut canvas = self.canvas.write().await;
        let right = region.left.saturating_add(region.width).min(canvas.width);
        let bottom = region.top.saturating_add(region.height).min(canvas.height);
        let stride = canvas.width as usize * 4;

        for y in region.top..bottom {
            for x in region.left..right {
                let idx = y as usize * stride + x as usize * 4;
                canvas.data[idx..idx + 4].copy_from_slice(&rgba);
            }
        }
    }

    /// Every input injected so far, oldest first.
    pub async fn journal(&self) -> Vec<InputEvent> {
        self.journal.lock().await.clone()
    }

    async fn record(&self, event: InputEvent) {
        debug!("Headless input: {:?}", event);
        self.journal.lock().await.push(event);
    }
}

#[async_trait]
impl CapabilityProvider for HeadlessProvider {
    async fn capture_region(&self, region: CaptureRegion) -> Result<RawFrame> {
        let canvas = self.canvas.read().await;
        canvas.crop(region.left, region.top, region.width, region.height)
    }

    async fn display_bounds(&self) -> Result<DisplayBounds> {
        let canvas = self.canvas.read().await;
        Ok(DisplayBounds {
            width: canvas.width,
            height: canvas.height,
        })
    }

    async fn pointer_position(&self) -> Result<PointerPosition> {
        Ok(*self.pointer.lock().await)
    }

    async fn move_pointer_to(&self, x: i32, y: i32) -> Result<()> {
        *self.pointer.lock().await = PointerPosition { x, y };
        self.record(InputEvent::PointerMove { x, y }).await;
        Ok(())
    }

    async fn pointer_button(&self, button: MouseButton, action: ButtonAction) -> Result<()> {
        self.record(InputEvent::PointerButton { button, action }).await;
        Ok(())
    }

    async fn scroll(&self, dx: i32, dy: i32) -> Result<()> {
        self.record(InputEvent::Scroll { dx, dy }).await;
        Ok(())
    }

    async fn key_action(&self, key: &str, action: KeyAction) -> Result<()> {
        if key.is_empty() {
            bail!("Key parameter is required");
        }
        self.record(InputEvent::Key {
            key: key.to_string(),
            action,
        })
        .await;
        Ok(())
    }

    async fn type_text(&self, text: &str) -> Result<()> {
        self.record(InputEvent::Text(text.to_string())).await;
        Ok(())
    }

    async fn clipboard_read(&self) -> Result<String> {
        Ok(self.clipboard.lock().await.clone())
    }

    async fn clipboard_write(&self, text: &str) -> Result<()> {
        *self.clipboard.lock().await = text.to_string();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_crop_of_canvas() {
        let provider = HeadlessProvider::new(64, 32);
        let frame = provider
            .capture_region(CaptureRegion::new(10, 5, 8, 4))
            .await
            .unwrap();
        assert_eq!((frame.width, frame.height), (8, 4));
        assert!(frame.is_valid());
        // First pixel is canvas (10, 5)
        assert_eq!(&frame.data[..3], &[10, 5, 15]);
    }

    #[tokio::test]
    async fn rejects_regions_outside_display() {
        let provider = HeadlessProvider::new(64, 32);
        let err = provider
            .capture_region(CaptureRegion::new(60, 0, 8, 8))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("outside"));
    }

    #[tokio::test]
    async fn paint_changes_captured_pixels() {
        let provider = HeadlessProvider::new(16, 16);
        let region = CaptureRegion::new(0, 0, 16, 16);
        let before = provider.capture_region(region).await.unwrap();

        provider.paint(CaptureRegion::new(4, 4, 2, 2), [255, 0, 0, 255]).await;
        let after = provider.capture_region(region).await.unwrap();
        assert_ne!(before.data, after.data);
    }

    #[tokio::test]
    async fn journals_inputs_in_order() {
        let provider = HeadlessProvider::new(16, 16);
        provider.move_pointer_to(3, 4).await.unwrap();
        provider.key_action("a", KeyAction::Down).await.unwrap();
        provider.type_text("hi").await.unwrap();

        assert_eq!(
            provider.journal().await,
            vec![
                InputEvent::PointerMove { x: 3, y: 4 },
                InputEvent::Key { key: "a".into(), action: KeyAction::Down },
                InputEvent::Text("hi".into()),
            ]
        );
        assert_eq!(provider.pointer_position().await.unwrap(), PointerPosition { x: 3, y: 4 });
    }

    #[tokio::test]
    async fn clipboard_round_trips() {
        let provider = HeadlessProvider::new(16, 16);
        provider.clipboard_write("copied").await.unwrap();
        assert_eq!(provider.clipboard_read().await.unwrap(), "copied");
    }
}
