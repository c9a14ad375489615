/*!
 * HTTP + WebSocket Server
 *
 * Exposes the command registry over two transports:
 * - one HTTP request per command, with typed path/query/body arguments
 * - a persistent WebSocket carrying `{id, method, params}` envelopes
 */

use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::agent::DeskAgent;
use crate::config::ServerConfig;
use crate::dispatch::{build_registry, CommandRegistry};
use crate::metrics::DispatchMetrics;
use crate::provider::CapabilityProvider;
use crate::shutdown::ShutdownHandle;

pub mod http;
pub mod ws;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<CommandRegistry>,
    pub agent: Arc<DeskAgent>,
    pub shutdown: ShutdownHandle,
    pub metrics: DispatchMetrics,
}

impl AppState {
    pub fn new(provider: Arc<dyn CapabilityProvider>, config: ServerConfig) -> Self {
        let shutdown = ShutdownHandle::new();
        let metrics = DispatchMetrics::new();
        let agent = Arc::new(DeskAgent::new(provider, shutdown.clone(), config));
        let registry = Arc::new(build_registry(agent.clone(), metrics.clone()));

        Self {
            registry,
            agent,
            shutdown,
            metrics,
        }
    }
}

/// Build the router for both transports.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/screen-size", get(http::screen_size).fallback(http::unknown_method))
        .route("/capture", get(http::capture).fallback(http::unknown_method))
        .route("/capture/full", get(http::capture_full).fallback(http::unknown_method))
        .route(
            "/capture/new-only",
            get(http::capture_new_only).fallback(http::unknown_method),
        )
        .route(
            "/capture/area",
            get(http::capture_area)
                .post(http::set_capture_area)
                .fallback(http::unknown_method),
        )
        .route("/mouse/position", get(http::mouse_position).fallback(http::unknown_method))
        .route("/mouse/move", post(http::mouse_move).fallback(http::unknown_method))
        .route("/mouse/scroll", post(http::mouse_scroll).fallback(http::unknown_method))
        .route(
            "/mouse/:button/:action",
            post(http::mouse_button).fallback(http::unknown_method),
        )
        .route("/key/:key", post(http::key_press).fallback(http::unknown_method))
        .route("/key/:key/:action", post(http::key_action).fallback(http::unknown_method))
        .route("/text/*text", post(http::type_text).fallback(http::unknown_method))
        .route(
            "/clipboard",
            get(http::clipboard)
                .post(http::set_clipboard)
                .fallback(http::unknown_method),
        )
        .route("/shutdown", post(http::shutdown).fallback(http::unknown_method))
        .route("/ws", get(ws::ws_handler).fallback(http::unknown_method))
        .fallback(http::unknown_method)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
