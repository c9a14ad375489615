use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::header::{HeaderName, CONTENT_TYPE};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use super::AppState;
use crate::dispatch::{Reply, Request};
use crate::error::DispatchError;
use crate::streaming::{CaptureOutcome, CaptureRequest};

const NEXT_HASH: HeaderName = HeaderName::from_static("next-hash");
const LAST_HASH: &str = "last-hash";

/// Render a dispatch outcome as an HTTP response.
pub fn respond(outcome: Result<Reply, DispatchError>) -> Response {
    match outcome {
        Ok(Reply::Json(data)) => Json(data).into_response(),
        Ok(Reply::Capture(CaptureOutcome::Unchanged { fingerprint })) => {
            (StatusCode::NO_CONTENT, [(NEXT_HASH, fingerprint)]).into_response()
        }
        Ok(Reply::Capture(CaptureOutcome::Changed { frame, .. })) => (
            StatusCode::OK,
            [
                (CONTENT_TYPE, "image/jpeg".to_string()),
                (NEXT_HASH, frame.fingerprint),
            ],
            frame.data,
        )
            .into_response(),
        Err(err) => {
            let status =
                StatusCode::from_u16(err.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, Json(json!({ "error": err.to_string() }))).into_response()
        }
    }
}

impl AppState {
    async fn run(&self, request: Request) -> Response {
        respond(self.registry.dispatch(request).await)
    }

    async fn run_parsed(&self, request: Result<Request, DispatchError>) -> Response {
        match request {
            Ok(request) => self.run(request).await,
            Err(err) => {
                self.metrics.record_failure(0);
                respond(Err(err))
            }
        }
    }
}

/// Empty path arguments match no route, on either transport.
fn all_present(segments: &[&str]) -> bool {
    segments.iter().all(|s| !s.is_empty())
}

fn body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, DispatchError> {
    body.map(|Json(value)| value)
        .map_err(|rejection| DispatchError::handler(rejection.body_text()))
}

#[derive(Debug, Deserialize)]
pub struct CaptureQuery {
    pub area: Option<String>,
    pub quality: Option<String>,
    pub resize: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Deserialize)]
pub struct ScrollDelta {
    #[serde(default)]
    pub x: i32,
    #[serde(default)]
    pub y: i32,
}

#[derive(Debug, Deserialize)]
pub struct AreaBody {
    pub x: i64,
    pub y: i64,
    pub w: i64,
    pub h: i64,
}

#[derive(Debug, Deserialize)]
pub struct ClipboardText {
    #[serde(default)]
    pub text: String,
}

pub async fn screen_size(State(state): State<AppState>) -> Response {
    state.run(Request::ScreenSize).await
}

fn capture_request(query: CaptureQuery, headers: &HeaderMap) -> Result<CaptureRequest, DispatchError> {
    let last_hash = headers.get(LAST_HASH).and_then(|v| v.to_str().ok());
    CaptureRequest::parse(
        query.area.as_deref(),
        query.quality.as_deref(),
        query.resize.as_deref(),
        last_hash,
    )
    .map_err(DispatchError::from)
}

pub async fn capture(
    State(state): State<AppState>,
    Query(query): Query<CaptureQuery>,
    headers: HeaderMap,
) -> Response {
    let request = capture_request(query, &headers).map(Request::Capture);
    state.run_parsed(request).await
}

pub async fn capture_full(
    State(state): State<AppState>,
    Query(query): Query<CaptureQuery>,
    headers: HeaderMap,
) -> Response {
    let request = capture_request(query, &headers).map(Request::CaptureFull);
    state.run_parsed(request).await
}

pub async fn capture_new_only(
    State(state): State<AppState>,
    Query(query): Query<CaptureQuery>,
    headers: HeaderMap,
) -> Response {
    let request = capture_request(query, &headers).map(Request::CaptureNewOnly);
    state.run_parsed(request).await
}

pub async fn capture_area(State(state): State<AppState>) -> Response {
    state.run(Request::GetCaptureArea).await
}

pub async fn set_capture_area(
    State(state): State<AppState>,
    area: Result<Json<AreaBody>, JsonRejection>,
) -> Response {
    let request = body(area).map(|AreaBody { x, y, w, h }| Request::SetCaptureArea { x, y, w, h });
    state.run_parsed(request).await
}

pub async fn mouse_position(State(state): State<AppState>) -> Response {
    state.run(Request::MousePosition).await
}

pub async fn mouse_move(
    State(state): State<AppState>,
    point: Result<Json<Point>, JsonRejection>,
) -> Response {
    let request = body(point).map(|Point { x, y }| Request::MouseMove { x, y });
    state.run_parsed(request).await
}

pub async fn mouse_button(
    State(state): State<AppState>,
    Path((button, action)): Path<(String, String)>,
    method: Method,
    uri: Uri,
) -> Response {
    if !all_present(&[button.as_str(), action.as_str()]) {
        return unknown_method(State(state), method, uri).await;
    }
    state.run_parsed(Request::mouse_button(&button, &action)).await
}

pub async fn mouse_scroll(
    State(state): State<AppState>,
    delta: Result<Json<ScrollDelta>, JsonRejection>,
) -> Response {
    let request = body(delta).map(|ScrollDelta { x, y }| Request::MouseScroll { x, y });
    state.run_parsed(request).await
}

pub async fn key_press(
    State(state): State<AppState>,
    Path(key): Path<String>,
    method: Method,
    uri: Uri,
) -> Response {
    if !all_present(&[key.as_str()]) {
        return unknown_method(State(state), method, uri).await;
    }
    state.run(Request::KeyPress { key }).await
}

pub async fn key_action(
    State(state): State<AppState>,
    Path((key, action)): Path<(String, String)>,
    method: Method,
    uri: Uri,
) -> Response {
    if !all_present(&[key.as_str(), action.as_str()]) {
        return unknown_method(State(state), method, uri).await;
    }
    state.run_parsed(Request::key_action(&key, &action)).await
}

pub async fn type_text(
    State(state): State<AppState>,
    Path(text): Path<String>,
    method: Method,
    uri: Uri,
) -> Response {
    if !all_present(&[text.as_str()]) {
        return unknown_method(State(state), method, uri).await;
    }
    state.run(Request::TypeText { text }).await
}

pub async fn clipboard(State(state): State<AppState>) -> Response {
    state.run(Request::GetClipboard).await
}

pub async fn set_clipboard(
    State(state): State<AppState>,
    text: Result<Json<ClipboardText>, JsonRejection>,
) -> Response {
    let request = body(text).map(|ClipboardText { text }| Request::SetClipboard { text });
    state.run_parsed(request).await
}

pub async fn shutdown(State(state): State<AppState>) -> Response {
    state.run(Request::Shutdown).await
}

/// Any verb/path pair without a route.
pub async fn unknown_method(State(state): State<AppState>, method: Method, uri: Uri) -> Response {
    state.metrics.record_failure(0);
    respond(Err(DispatchError::UnknownMethod(format!(
        "{} {}",
        method,
        uri.path()
    ))))
}
