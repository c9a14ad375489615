//! Capability providers.
//!
//! A provider performs the OS-level work: pixel capture, pointer and
//! keyboard injection, clipboard access. The server only talks to the
//! [`CapabilityProvider`] trait.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

use crate::capture::CaptureRegion;
use crate::video::RawFrame;

pub mod headless;
pub mod xdo;

pub use headless::{HeadlessProvider, InputEvent};
pub use xdo::XdoProvider;

/// Pointer buttons the server can hold down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

impl MouseButton {
    pub fn as_str(&self) -> &'static str {
        match self {
            MouseButton::Left => "left",
            MouseButton::Right => "right",
            MouseButton::Middle => "middle",
        }
    }
}

impl fmt::Display for MouseButton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MouseButton {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "left" => Ok(MouseButton::Left),
            "right" => Ok(MouseButton::Right),
            "middle" => Ok(MouseButton::Middle),
            other => bail!("Invalid button: {}. Use: left, right, or middle", other),
        }
    }
}

/// Direction of a button or held-key transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ButtonAction {
    Down,
    Up,
}

impl ButtonAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ButtonAction::Down => "down",
            ButtonAction::Up => "up",
        }
    }
}

impl fmt::Display for ButtonAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ButtonAction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "down" => Ok(ButtonAction::Down),
            "up" => Ok(ButtonAction::Up),
            other => bail!("Invalid action: {}. Use: up or down", other),
        }
    }
}

/// Keyboard transitions understood by providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyAction {
    /// Down immediately followed by up
    Press,
    Down,
    Up,
}

impl From<ButtonAction> for KeyAction {
    fn from(action: ButtonAction) -> Self {
        match action {
            ButtonAction::Down => KeyAction::Down,
            ButtonAction::Up => KeyAction::Up,
        }
    }
}

/// Canonical spelling of a key name.
///
/// Single characters are case-sensitive and kept as-is. Named keys are
/// lower-cased and aliases folded, so `Ctrl`, `control` and `ctrl` all name
/// the same physical key.
pub fn normalize_key(key: &str) -> String {
    if key.chars().count() == 1 {
        return key.to_string();
    }

    let lower = key.to_lowercase();
    let canonical = match lower.as_str() {
        "return" => "enter",
        "esc" => "escape",
        "del" => "delete",
        "control" => "ctrl",
        "option" => "alt",
        "cmd" | "command" | "super" | "win" => "meta",
        other => other,
    };
    canonical.to_string()
}

/// Size of the captured display in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DisplayBounds {
    pub width: u32,
    pub height: u32,
}

/// Pointer location in display coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PointerPosition {
    pub x: i32,
    pub y: i32,
}

/// OS capabilities consumed by the server.
///
/// Calls are treated as bounded and are never cancelled mid-flight.
#[async_trait]
pub trait CapabilityProvider: Send + Sync {
    /// Read the pixels of `region`.
    async fn capture_region(&self, region: CaptureRegion) -> Result<RawFrame>;

    async fn display_bounds(&self) -> Result<DisplayBounds>;

    async fn pointer_position(&self) -> Result<PointerPosition>;

    async fn move_pointer_to(&self, x: i32, y: i32) -> Result<()>;

    async fn pointer_button(&self, button: MouseButton, action: ButtonAction) -> Result<()>;

    /// Scroll by whole notches; positive `dy` scrolls down, positive `dx` right.
    async fn scroll(&self, dx: i32, dy: i32) -> Result<()>;

    async fn key_action(&self, key: &str, action: KeyAction) -> Result<()>;

    async fn type_text(&self, text: &str) -> Result<()>;

    async fn clipboard_read(&self) -> Result<String>;

    async fn clipboard_write(&self, text: &str) -> Result<()>;
}

/// Which provider backs the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ProviderKind {
    /// X11 desktop driven through xdotool, ImageMagick and xclip
    Xdotool,
    /// In-memory canvas; no display required
    Headless,
}

impl FromStr for ProviderKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "xdotool" | "x11" => Ok(ProviderKind::Xdotool),
            "headless" => Ok(ProviderKind::Headless),
            other => bail!("Unknown provider: {}", other),
        }
    }
}

/// Create the configured provider
pub fn create_provider(kind: ProviderKind) -> Result<Arc<dyn CapabilityProvider>> {
    match kind {
        ProviderKind::Xdotool => {
            info!("Initializing xdotool capability provider");
            Ok(Arc::new(XdoProvider::new()?))
        }
        ProviderKind::Headless => {
            info!("Initializing headless capability provider");
            Ok(Arc::new(HeadlessProvider::default()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_buttons_and_actions() {
        assert_eq!("left".parse::<MouseButton>().unwrap(), MouseButton::Left);
        assert_eq!("middle".parse::<MouseButton>().unwrap(), MouseButton::Middle);
        assert!("Left".parse::<MouseButton>().is_err());

        assert_eq!("down".parse::<ButtonAction>().unwrap(), ButtonAction::Down);
        let err = "sideways".parse::<ButtonAction>().unwrap_err();
        assert!(err.to_string().contains("sideways"));
    }

    #[test]
    fn named_keys_normalize_and_characters_do_not() {
        assert_eq!(normalize_key("Ctrl"), "ctrl");
        assert_eq!(normalize_key("CONTROL"), "ctrl");
        assert_eq!(normalize_key("Win"), "meta");
        assert_eq!(normalize_key("Return"), "enter");
        assert_eq!(normalize_key("F5"), "f5");
        assert_eq!(normalize_key("A"), "A");
        assert_eq!(normalize_key("a"), "a");
    }

    #[test]
    fn button_actions_map_to_key_transitions() {
        assert_eq!(KeyAction::from(ButtonAction::Down), KeyAction::Down);
        assert_eq!(KeyAction::from(ButtonAction::Up), KeyAction::Up);
    }

    #[test]
    fn parses_provider_kind() {
        assert_eq!("headless".parse::<ProviderKind>().unwrap(), ProviderKind::Headless);
        assert_eq!("X11".parse::<ProviderKind>().unwrap(), ProviderKind::Xdotool);
        assert!("wayland".parse::<ProviderKind>().is_err());
    }
}
