//! Command dispatch.
//!
//! Commands name their operation with a `"VERB /path"` method string whose
//! path may embed arguments (`POST /key/a/down`). The string is parsed once
//! into a [`Request`]; from then on handlers only see typed values.

use serde::Serialize;
use serde_json::{json, Map, Value};
use std::fmt;

use crate::error::DispatchError;
use crate::provider::{ButtonAction, MouseButton};
use crate::streaming::{CaptureOutcome, CaptureRequest};

pub mod registry;
pub mod routes;

pub use registry::{CommandRegistry, Handler};
pub use routes::build_registry;

/// Stable tag identifying which handler serves a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    ScreenSize,
    Capture,
    CaptureFull,
    CaptureNewOnly,
    GetCaptureArea,
    SetCaptureArea,
    MousePosition,
    MouseMove,
    MouseButton,
    MouseScroll,
    KeyPress,
    KeyAction,
    TypeText,
    GetClipboard,
    SetClipboard,
    Shutdown,
}

impl Route {
    pub const ALL: [Route; 16] = [
        Route::ScreenSize,
        Route::Capture,
        Route::CaptureFull,
        Route::CaptureNewOnly,
        Route::GetCaptureArea,
        Route::SetCaptureArea,
        Route::MousePosition,
        Route::MouseMove,
        Route::MouseButton,
        Route::MouseScroll,
        Route::KeyPress,
        Route::KeyAction,
        Route::TypeText,
        Route::GetClipboard,
        Route::SetClipboard,
        Route::Shutdown,
    ];

    /// Method pattern served by this route
    pub fn pattern(&self) -> &'static str {
        match self {
            Route::ScreenSize => "GET /screen-size",
            Route::Capture => "GET /capture",
            Route::CaptureFull => "GET /capture/full",
            Route::CaptureNewOnly => "GET /capture/new-only",
            Route::GetCaptureArea => "GET /capture/area",
            Route::SetCaptureArea => "POST /capture/area",
            Route::MousePosition => "GET /mouse/position",
            Route::MouseMove => "POST /mouse/move",
            Route::MouseButton => "POST /mouse/{button}/{action}",
            Route::MouseScroll => "POST /mouse/scroll",
            Route::KeyPress => "POST /key/{key}",
            Route::KeyAction => "POST /key/{key}/{action}",
            Route::TypeText => "POST /text/{text}",
            Route::GetClipboard => "GET /clipboard",
            Route::SetClipboard => "POST /clipboard",
            Route::Shutdown => "POST /shutdown",
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.pattern())
    }
}

/// A fully parsed command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    ScreenSize,
    Capture(CaptureRequest),
    /// Whole display regardless of any area
    CaptureFull(CaptureRequest),
    /// Diffed against the last frame the server sent, not the client's hash
    CaptureNewOnly(CaptureRequest),
    GetCaptureArea,
    SetCaptureArea { x: i64, y: i64, w: i64, h: i64 },
    MousePosition,
    MouseMove { x: i32, y: i32 },
    MouseButton { button: MouseButton, action: ButtonAction },
    MouseScroll { x: i32, y: i32 },
    KeyPress { key: String },
    KeyAction { key: String, action: ButtonAction },
    TypeText { text: String },
    GetClipboard,
    SetClipboard { text: String },
    Shutdown,
}

impl Request {
    pub fn route(&self) -> Route {
        match self {
            Request::ScreenSize => Route::ScreenSize,
            Request::Capture(_) => Route::Capture,
            Request::CaptureFull(_) => Route::CaptureFull,
            Request::CaptureNewOnly(_) => Route::CaptureNewOnly,
            Request::GetCaptureArea => Route::GetCaptureArea,
            Request::SetCaptureArea { .. } => Route::SetCaptureArea,
            Request::MousePosition => Route::MousePosition,
            Request::MouseMove { .. } => Route::MouseMove,
            Request::MouseButton { .. } => Route::MouseButton,
            Request::MouseScroll { .. } => Route::MouseScroll,
            Request::KeyPress { .. } => Route::KeyPress,
            Request::KeyAction { .. } => Route::KeyAction,
            Request::TypeText { .. } => Route::TypeText,
            Request::GetClipboard => Route::GetClipboard,
            Request::SetClipboard { .. } => Route::SetClipboard,
            Request::Shutdown => Route::Shutdown,
        }
    }

    /// `POST /mouse/{button}/{action}` from its raw path segments.
    pub fn mouse_button(button: &str, action: &str) -> Result<Self, DispatchError> {
        Ok(Request::MouseButton {
            button: button.parse()?,
            action: action.parse()?,
        })
    }

    /// `POST /key/{key}/{action}` from its raw path segments.
    pub fn key_action(key: &str, action: &str) -> Result<Self, DispatchError> {
        Ok(Request::KeyAction {
            key: key.to_string(),
            action: action.parse()?,
        })
    }

    /// Parse a method string plus its params object.
    ///
    /// Methods that match no route yield [`DispatchError::UnknownMethod`]
    /// carrying `method` verbatim; malformed params are handler faults.
    pub fn parse(method: &str, params: &Map<String, Value>) -> Result<Self, DispatchError> {
        let unknown = || DispatchError::UnknownMethod(method.to_string());
        let (verb, path) = method.split_once(' ').ok_or_else(unknown)?;

        let request = match (verb, path) {
            ("GET", "/screen-size") => Request::ScreenSize,
            ("GET", "/capture") => Request::Capture(CaptureRequest::from_params(params)?),
            ("GET", "/capture/full") => Request::CaptureFull(CaptureRequest::from_params(params)?),
            ("GET", "/capture/new-only") => {
                Request::CaptureNewOnly(CaptureRequest::from_params(params)?)
            }
            ("GET", "/capture/area") => Request::GetCaptureArea,
            ("POST", "/capture/area") => Request::SetCaptureArea {
                x: int_param(params, "x")?,
                y: int_param(params, "y")?,
                w: int_param(params, "w")?,
                h: int_param(params, "h")?,
            },
            ("GET", "/mouse/position") => Request::MousePosition,
            ("POST", "/mouse/move") => Request::MouseMove {
                x: coordinate(params, "x", None)?,
                y: coordinate(params, "y", None)?,
            },
            ("POST", "/mouse/scroll") => Request::MouseScroll {
                x: coordinate(params, "x", Some(0))?,
                y: coordinate(params, "y", Some(0))?,
            },
            ("GET", "/clipboard") => Request::GetClipboard,
            ("POST", "/clipboard") => Request::SetClipboard {
                text: match params.get("text") {
                    None | Some(Value::Null) => String::new(),
                    Some(Value::String(text)) => text.clone(),
                    Some(other) => {
                        return Err(DispatchError::handler(format!(
                            "Parameter 'text' must be a string, got {}",
                            other
                        )))
                    }
                },
            },
            ("POST", "/shutdown") => Request::Shutdown,
            ("POST", path) => {
                if let Some(rest) = path.strip_prefix("/mouse/") {
                    match path_segments(rest).as_deref() {
                        Some([button, action]) => Request::mouse_button(button, action)?,
                        _ => return Err(unknown()),
                    }
                } else if let Some(rest) = path.strip_prefix("/key/") {
                    match path_segments(rest).as_deref() {
                        Some([key]) => Request::KeyPress {
                            key: key.to_string(),
                        },
                        Some([key, action]) => Request::key_action(key, action)?,
                        _ => return Err(unknown()),
                    }
                } else if let Some(text) = path.strip_prefix("/text/").filter(|t| !t.is_empty()) {
                    Request::TypeText {
                        text: text.to_string(),
                    }
                } else {
                    return Err(unknown());
                }
            }
            _ => return Err(unknown()),
        };

        Ok(request)
    }
}

/// Path-embedded arguments, one per `/`-separated segment.
///
/// An empty segment matches no route, the same as an HTTP path parameter.
fn path_segments(rest: &str) -> Option<Vec<&str>> {
    let segments: Vec<&str> = rest.split('/').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return None;
    }
    Some(segments)
}

fn int_param(params: &Map<String, Value>, name: &str) -> Result<i64, DispatchError> {
    match params.get(name) {
        Some(value) => value.as_i64().ok_or_else(|| {
            DispatchError::handler(format!("Parameter '{}' must be an integer, got {}", name, value))
        }),
        None => Err(DispatchError::handler(format!("Missing parameter '{}'", name))),
    }
}

fn coordinate(
    params: &Map<String, Value>,
    name: &str,
    default: Option<i32>,
) -> Result<i32, DispatchError> {
    let value = match (params.get(name), default) {
        (None | Some(Value::Null), Some(default)) => return Ok(default),
        _ => int_param(params, name)?,
    };
    i32::try_from(value)
        .map_err(|_| DispatchError::handler(format!("Parameter '{}' is out of range: {}", name, value)))
}

/// What a handler produced.
#[derive(Debug, Clone)]
pub enum Reply {
    /// JSON data for a 200 result
    Json(Value),
    /// Outcome of a capture: "unchanged" or a new frame
    Capture(CaptureOutcome),
}

/// Result envelope reported for every command.
///
/// Exactly one of `data` and `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandResult {
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CommandResult {
    pub fn success(status: u16, data: Value) -> Self {
        Self {
            status,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(err: &DispatchError) -> Self {
        Self {
            status: err.status(),
            data: None,
            error: Some(err.to_string()),
        }
    }

    /// Envelope for a dispatch outcome, plus the binary frame that must
    /// follow it when the outcome carries new image data.
    pub fn from_outcome(outcome: Result<Reply, DispatchError>) -> (Self, Option<Vec<u8>>) {
        match outcome {
            Ok(Reply::Json(data)) => (Self::success(200, data), None),
            Ok(Reply::Capture(CaptureOutcome::Unchanged { fingerprint })) => {
                (Self::success(204, json!({ "next_hash": fingerprint })), None)
            }
            Ok(Reply::Capture(CaptureOutcome::Changed { frame, date })) => (
                Self::success(200, json!({ "next_hash": frame.fingerprint, "date": date })),
                Some(frame.data),
            ),
            Err(err) => (Self::failure(&err), None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::CaptureRegion;

    fn parse(method: &str, params: Value) -> Result<Request, DispatchError> {
        let params = params.as_object().cloned().unwrap_or_default();
        Request::parse(method, &params)
    }

    #[test]
    fn parses_fixed_routes() {
        assert_eq!(parse("GET /screen-size", json!({})).unwrap(), Request::ScreenSize);
        assert_eq!(parse("POST /shutdown", json!({})).unwrap(), Request::Shutdown);
        assert_eq!(
            parse("POST /mouse/move", json!({"x": 10, "y": 20})).unwrap(),
            Request::MouseMove { x: 10, y: 20 }
        );
        assert_eq!(
            parse("POST /mouse/scroll", json!({"y": -3})).unwrap(),
            Request::MouseScroll { x: 0, y: -3 }
        );
        assert_eq!(
            parse("POST /capture/area", json!({"x": 0, "y": 0, "w": 800, "h": 600})).unwrap(),
            Request::SetCaptureArea { x: 0, y: 0, w: 800, h: 600 }
        );
    }

    #[test]
    fn parses_capture_params() {
        let request = parse("GET /capture", json!({"area": "0,0,800,600", "quality": 50})).unwrap();
        match request {
            Request::Capture(capture) => {
                assert_eq!(capture.area, Some(CaptureRegion::new(0, 0, 800, 600)));
                assert_eq!(capture.quality, Some(50));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn parses_path_embedded_arguments() {
        assert_eq!(
            parse("POST /mouse/left/down", json!({})).unwrap(),
            Request::MouseButton { button: MouseButton::Left, action: ButtonAction::Down }
        );
        assert_eq!(
            parse("POST /key/a", json!({})).unwrap(),
            Request::KeyPress { key: "a".into() }
        );
        assert_eq!(
            parse("POST /key/shift/up", json!({})).unwrap(),
            Request::KeyAction { key: "shift".into(), action: ButtonAction::Up }
        );
        assert_eq!(
            parse("POST /text/hello world/ok", json!({})).unwrap(),
            Request::TypeText { text: "hello world/ok".into() }
        );
    }

    #[test]
    fn mouse_move_and_scroll_take_precedence_over_button_routes() {
        assert!(matches!(
            parse("POST /mouse/move", json!({"x": 1, "y": 1})).unwrap(),
            Request::MouseMove { .. }
        ));
        assert!(matches!(
            parse("POST /mouse/scroll", json!({})).unwrap(),
            Request::MouseScroll { x: 0, y: 0 }
        ));
    }

    #[test]
    fn parses_extra_capture_routes() {
        let request = parse("GET /capture/full", json!({"quality": 80})).unwrap();
        assert!(matches!(request, Request::CaptureFull(ref c) if c.quality == Some(80)));
        assert_eq!(
            parse("GET /capture/new-only", json!({})).unwrap(),
            Request::CaptureNewOnly(CaptureRequest::default())
        );
    }

    #[test]
    fn empty_or_extra_path_segments_match_no_route() {
        for method in [
            "POST /key/",
            "POST /key//down",
            "POST /key/a/",
            "POST /key/a/b/down",
            "POST /text/",
            "POST /mouse//down",
            "POST /mouse/left/",
            "POST /mouse/left/down/x",
        ] {
            match parse(method, json!({})) {
                Err(DispatchError::UnknownMethod(m)) => assert_eq!(m, method),
                other => panic!("{}: unexpected {:?}", method, other),
            }
        }
    }

    #[test]
    fn unknown_methods_keep_the_method_verbatim() {
        for method in ["GET /nope", "DELETE /clipboard", "garbage", "POST /mouse/a/b/c", "GET /key/a"] {
            match parse(method, json!({})) {
                Err(DispatchError::UnknownMethod(m)) => assert_eq!(m, method),
                other => panic!("{}: unexpected {:?}", method, other),
            }
        }
    }

    #[test]
    fn malformed_params_are_handler_faults() {
        let err = parse("POST /mouse/move", json!({"x": 1})).unwrap_err();
        assert_eq!(err.status(), 500);
        let err = parse("POST /mouse/move", json!({"x": "one", "y": 2})).unwrap_err();
        assert_eq!(err.status(), 500);
        let err = parse("POST /mouse/sideways/down", json!({})).unwrap_err();
        assert_eq!(err.to_string(), "Invalid button: sideways. Use: left, right, or middle");
        let err = parse("POST /key/a/hold", json!({})).unwrap_err();
        assert_eq!(err.status(), 500);
    }

    #[test]
    fn command_result_serializes_one_of_data_or_error() {
        let ok = serde_json::to_value(CommandResult::success(200, json!({"x": 1}))).unwrap();
        assert_eq!(ok, json!({"status": 200, "data": {"x": 1}}));

        let err = CommandResult::failure(&DispatchError::UnknownMethod("GET /x".into()));
        let err = serde_json::to_value(err).unwrap();
        assert_eq!(err, json!({"status": 404, "error": "Unknown method: GET /x"}));
    }
}
