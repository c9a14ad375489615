/*!
 * X11 Capability Provider
 *
 * Drives an X11 desktop through command-line tools:
 * - xdotool for pointer and keyboard injection
 * - ImageMagick `import` for region capture
 * - xdpyinfo for display bounds
 * - xclip for the clipboard
 */

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::{
    ButtonAction, CapabilityProvider, DisplayBounds, KeyAction, MouseButton, PointerPosition,
};
use crate::capture::CaptureRegion;
use crate::video::{PixelFormat, RawFrame};

/// Delay between typed characters (milliseconds)
const TYPE_DELAY_MS: u32 = 12;

/// Map client key names to X keysyms
pub fn map_key_to_keysym(key: &str) -> String {
    if key.chars().count() == 1 {
        return key.to_string();
    }

    match key.to_lowercase().as_str() {
        "return" | "enter" => "Return".to_string(),
        "escape" | "esc" => "Escape".to_string(),
        "tab" => "Tab".to_string(),
        "space" => "space".to_string(),
        "backspace" => "BackSpace".to_string(),
        "delete" | "del" => "Delete".to_string(),

        "up" => "Up".to_string(),
        "down" => "Down".to_string(),
        "left" => "Left".to_string(),
        "right" => "Right".to_string(),
        "home" => "Home".to_string(),
        "end" => "End".to_string(),
        "pageup" => "Prior".to_string(),
        "pagedown" => "Next".to_string(),

        "cmd" | "command" | "super" | "meta" | "win" => "Super_L".to_string(),
        "ctrl" | "control" => "Control_L".to_string(),
        "alt" | "option" => "Alt_L".to_string(),
        "shift" => "Shift_L".to_string(),

        k if k.starts_with('f') && k.len() <= 3 => match k[1..].parse::<u32>() {
            Ok(num) if (1..=12).contains(&num) => format!("F{}", num),
            _ => key.to_string(),
        },

        _ => key.to_string(),
    }
}

fn button_number(button: MouseButton) -> &'static str {
    match button {
        MouseButton::Left => "1",
        MouseButton::Middle => "2",
        MouseButton::Right => "3",
    }
}

/// Parse `xdotool getmouselocation --shell` output
fn parse_mouse_location(stdout: &str) -> Result<PointerPosition> {
    let mut x = None;
    let mut y = None;

    for line in stdout.lines() {
        if let Some(value) = line.strip_prefix("X=") {
            x = value.trim().parse().ok();
        } else if let Some(value) = line.strip_prefix("Y=") {
            y = value.trim().parse().ok();
        }
    }

    match (x, y) {
        (Some(x), Some(y)) => Ok(PointerPosition { x, y }),
        _ => bail!("Could not parse pointer location from xdotool output"),
    }
}

/// Parse `xdpyinfo` output: "  dimensions:    1920x1080 pixels (508x286 millimeters)"
fn parse_dimensions(stdout: &str) -> Option<DisplayBounds> {
    stdout
        .lines()
        .find(|line| line.contains("dimensions:"))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|dims| dims.split_once('x'))
        .and_then(|(w, h)| {
            Some(DisplayBounds {
                width: w.parse().ok()?,
                height: h.parse().ok()?,
            })
        })
}

/// Capability provider backed by X11 command-line tools
pub struct XdoProvider {
    display: Option<String>,
}

impl XdoProvider {
    pub fn new() -> Result<Self> {
        let display = std::env::var("DISPLAY").ok();
        match &display {
            Some(name) => info!("Using X display {}", name),
            None => warn!("DISPLAY is not set; X11 tools will likely fail"),
        }
        Ok(Self { display })
    }

    fn command(&self, program: &str) -> Command {
        let mut cmd = Command::new(program);
        if let Some(display) = &self.display {
            cmd.env("DISPLAY", display);
        }
        cmd.kill_on_drop(true);
        cmd
    }

    async fn run(&self, program: &str, args: &[&str]) -> Result<Vec<u8>> {
        debug!("{} {}", program, args.join(" "));

        let output = self
            .command(program)
            .args(args)
            .output()
            .await
            .with_context(|| format!("Failed to execute {}", program))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("{} {} failed: {}", program, args.join(" "), stderr.trim());
        }

        Ok(output.stdout)
    }

    async fn xdotool(&self, args: &[&str]) -> Result<String> {
        let stdout = self.run("xdotool", args).await?;
        Ok(String::from_utf8_lossy(&stdout).into_owned())
    }
}

#[async_trait]
impl CapabilityProvider for XdoProvider {
    async fn capture_region(&self, region: CaptureRegion) -> Result<RawFrame> {
        let geometry = format!(
            "{}x{}+{}+{}",
            region.width, region.height, region.left, region.top
        );
        let png = self
            .run(
                "import",
                &["-silent", "-window", "root", "-crop", &geometry, "png:-"],
            )
            .await
            .context("Screen capture failed")?;

        if png.is_empty() {
            bail!("import returned an empty capture");
        }

        let frame = tokio::task::spawn_blocking(move || -> Result<RawFrame> {
            let image = image::load_from_memory_with_format(&png, image::ImageFormat::Png)
                .context("Failed to decode captured PNG")?
                .to_rgba8();
            let (width, height) = image.dimensions();
            Ok(RawFrame::new(image.into_raw(), width, height, PixelFormat::RGBA))
        })
        .await
        .context("Capture decode task failed")??;

        debug!("Captured {} ({} bytes)", geometry, frame.data.len());
        Ok(frame)
    }

    async fn display_bounds(&self) -> Result<DisplayBounds> {
        let stdout = self.run("xdpyinfo", &[]).await?;
        parse_dimensions(&String::from_utf8_lossy(&stdout))
            .context("Could not parse display dimensions from xdpyinfo")
    }

    async fn pointer_position(&self) -> Result<PointerPosition> {
        let stdout = self.xdotool(&["getmouselocation", "--shell"]).await?;
        parse_mouse_location(&stdout)
    }

    async fn move_pointer_to(&self, x: i32, y: i32) -> Result<()> {
        // --sync hangs for seconds under some window managers
        self.xdotool(&["mousemove", "--", &x.to_string(), &y.to_string()])
            .await?;
        Ok(())
    }

    async fn pointer_button(&self, button: MouseButton, action: ButtonAction) -> Result<()> {
        let verb = match action {
            ButtonAction::Down => "mousedown",
            ButtonAction::Up => "mouseup",
        };
        self.xdotool(&[verb, button_number(button)]).await?;
        Ok(())
    }

    async fn scroll(&self, dx: i32, dy: i32) -> Result<()> {
        // Buttons 4/5 scroll up/down, 6/7 scroll left/right
        if dy != 0 {
            let button = if dy > 0 { "5" } else { "4" };
            let repeats = dy.unsigned_abs().to_string();
            self.xdotool(&["click", "--repeat", &repeats, button]).await?;
        }
        if dx != 0 {
            let button = if dx > 0 { "7" } else { "6" };
            let repeats = dx.unsigned_abs().to_string();
            self.xdotool(&["click", "--repeat", &repeats, button]).await?;
        }
        Ok(())
    }

    async fn key_action(&self, key: &str, action: KeyAction) -> Result<()> {
        let keysym = map_key_to_keysym(key);
        let verb = match action {
            KeyAction::Press => "key",
            KeyAction::Down => "keydown",
            KeyAction::Up => "keyup",
        };
        self.xdotool(&[verb, "--", &keysym]).await?;
        Ok(())
    }

    async fn type_text(&self, text: &str) -> Result<()> {
        let delay = TYPE_DELAY_MS.to_string();
        self.xdotool(&["type", "--delay", &delay, "--", text]).await?;
        Ok(())
    }

    async fn clipboard_read(&self) -> Result<String> {
        let stdout = self
            .run("xclip", &["-selection", "clipboard", "-o"])
            .await
            .context("Failed to read clipboard")?;
        Ok(String::from_utf8_lossy(&stdout).into_owned())
    }

    async fn clipboard_write(&self, text: &str) -> Result<()> {
        // xclip forks to serve the selection; its stdout must not be captured
        let mut child = self
            .command("xclip")
            .args(["-selection", "clipboard", "-i"])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .context("Failed to execute xclip")?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(text.as_bytes())
                .await
                .context("Failed to write clipboard contents")?;
        }

        let status = child.wait().await.context("xclip did not exit")?;
        if !status.success() {
            bail!("xclip exited with {}", status);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_records_display() {
        // Construction only reads DISPLAY; no X server is contacted
        let provider = XdoProvider::new().unwrap();
        assert_eq!(provider.display, std::env::var("DISPLAY").ok());
    }

    #[test]
    fn test_normalized_names_map_to_keysyms() {
        for key in ["Ctrl", "control", "Win", "Return"] {
            assert_eq!(
                map_key_to_keysym(&crate::provider::normalize_key(key)),
                map_key_to_keysym(key)
            );
        }
    }

    #[test]
    fn test_key_mapping() {
        assert_eq!(map_key_to_keysym("enter"), "Return");
        assert_eq!(map_key_to_keysym("Escape"), "Escape");
        assert_eq!(map_key_to_keysym("pageup"), "Prior");
        assert_eq!(map_key_to_keysym("win"), "Super_L");
        assert_eq!(map_key_to_keysym("ctrl"), "Control_L");
        assert_eq!(map_key_to_keysym("f11"), "F11");
        assert_eq!(map_key_to_keysym("f13"), "f13");
    }

    #[test]
    fn test_single_characters_pass_through() {
        assert_eq!(map_key_to_keysym("a"), "a");
        assert_eq!(map_key_to_keysym("A"), "A");
        assert_eq!(map_key_to_keysym("."), ".");
    }

    #[test]
    fn test_parse_mouse_location() {
        let out = "X=640\nY=480\nSCREEN=0\nWINDOW=1234\n";
        assert_eq!(parse_mouse_location(out).unwrap(), PointerPosition { x: 640, y: 480 });
        assert!(parse_mouse_location("SCREEN=0\n").is_err());
    }

    #[test]
    fn test_parse_dimensions() {
        let out = "screen #0:\n  dimensions:    2560x1440 pixels (677x381 millimeters)\n";
        assert_eq!(
            parse_dimensions(out),
            Some(DisplayBounds { width: 2560, height: 1440 })
        );
        assert_eq!(parse_dimensions("no screens"), None);
    }

    #[tokio::test]
    #[ignore] // Only run manually on Linux with X11
    async fn test_display_bounds() {
        let provider = XdoProvider::new().unwrap();
        let bounds = provider.display_bounds().await.unwrap();
        assert!(bounds.width > 0 && bounds.height > 0);
    }
}
