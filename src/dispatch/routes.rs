use futures_util::FutureExt;
use std::sync::Arc;

use super::{CommandRegistry, Request, Route};
use crate::agent::DeskAgent;
use crate::error::DispatchError;
use crate::metrics::DispatchMetrics;

fn misrouted(route: Route, request: &Request) -> DispatchError {
    DispatchError::handler(format!("{} cannot serve {}", route, request.route()))
}

/// Register a handler that destructures its request with `$pattern` and
/// runs `$body` against a shared agent.
macro_rules! handle {
    ($registry:ident, $agent:ident, $route:expr, $pattern:pat => $body:expr) => {{
        let $agent = $agent.clone();
        $registry.register($route, move |request: Request| {
            let $agent = $agent.clone();
            async move {
                match request {
                    $pattern => $body,
                    other => Err(misrouted($route, &other)),
                }
            }
            .boxed()
        });
    }};
}

/// Registry with every route bound to `agent`.
pub fn build_registry(agent: Arc<DeskAgent>, metrics: DispatchMetrics) -> CommandRegistry {
    let mut registry = CommandRegistry::new(metrics);

    handle!(registry, agent, Route::ScreenSize, Request::ScreenSize => agent.screen_size().await);
    handle!(registry, agent, Route::Capture, Request::Capture(capture) => agent.capture(capture).await);
    handle!(registry, agent, Route::CaptureFull,
        Request::CaptureFull(capture) => agent.capture_full(capture).await);
    handle!(registry, agent, Route::CaptureNewOnly,
        Request::CaptureNewOnly(capture) => agent.capture_new_only(capture).await);
    handle!(registry, agent, Route::GetCaptureArea, Request::GetCaptureArea => agent.capture_area().await);
    handle!(registry, agent, Route::SetCaptureArea,
        Request::SetCaptureArea { x, y, w, h } => agent.set_capture_area(x, y, w, h).await);
    handle!(registry, agent, Route::MousePosition, Request::MousePosition => agent.mouse_position().await);
    handle!(registry, agent, Route::MouseMove, Request::MouseMove { x, y } => agent.mouse_move(x, y).await);
    handle!(registry, agent, Route::MouseButton,
        Request::MouseButton { button, action } => agent.mouse_button(button, action).await);
    handle!(registry, agent, Route::MouseScroll, Request::MouseScroll { x, y } => agent.scroll(x, y).await);
    handle!(registry, agent, Route::KeyPress, Request::KeyPress { key } => agent.key_press(key).await);
    handle!(registry, agent, Route::KeyAction,
        Request::KeyAction { key, action } => agent.key_action(key, action).await);
    handle!(registry, agent, Route::TypeText, Request::TypeText { text } => agent.type_text(text).await);
    handle!(registry, agent, Route::GetClipboard, Request::GetClipboard => agent.clipboard().await);
    handle!(registry, agent, Route::SetClipboard,
        Request::SetClipboard { text } => agent.set_clipboard(text).await);
    handle!(registry, agent, Route::Shutdown, Request::Shutdown => agent.shutdown().await);

    registry
}
