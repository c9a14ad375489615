use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde_json::{Map, Value};
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, info_span, Instrument};

use super::{Reply, Request, Route};
use crate::error::DispatchError;
use crate::metrics::{DispatchMetrics, RequestMetrics};
use crate::streaming::CaptureOutcome;

/// Async handler for one route.
pub type Handler =
    Arc<dyn Fn(Request) -> BoxFuture<'static, Result<Reply, DispatchError>> + Send + Sync>;

/// Maps routes to handlers and runs them behind a uniform fault boundary.
///
/// Both transports dispatch through the same registry, so a command behaves
/// identically over HTTP and WebSocket.
pub struct CommandRegistry {
    handlers: HashMap<Route, Handler>,
    metrics: DispatchMetrics,
}

impl CommandRegistry {
    pub fn new(metrics: DispatchMetrics) -> Self {
        Self {
            handlers: HashMap::new(),
            metrics,
        }
    }

    /// Register `handler` for `route`, replacing any previous one.
    pub fn register<F>(&mut self, route: Route, handler: F)
    where
        F: Fn(Request) -> BoxFuture<'static, Result<Reply, DispatchError>> + Send + Sync + 'static,
    {
        if self.handlers.insert(route, Arc::new(handler)).is_some() {
            debug!("Replaced handler for {}", route);
        }
    }

    pub fn is_registered(&self, route: Route) -> bool {
        self.handlers.contains_key(&route)
    }

    pub fn metrics(&self) -> &DispatchMetrics {
        &self.metrics
    }

    /// Run the handler for an already parsed request.
    ///
    /// Handler errors and panics both come back as [`DispatchError`].
    pub async fn dispatch(&self, request: Request) -> Result<Reply, DispatchError> {
        let route = request.route();
        let Some(handler) = self.handlers.get(&route).cloned() else {
            self.metrics.record_failure(0);
            return Err(DispatchError::UnknownMethod(route.to_string()));
        };

        let request_metrics = RequestMetrics::new();
        let span = info_span!("dispatch", request_id = %request_metrics.request_id, route = %route);

        let result = AssertUnwindSafe(handler(request))
            .catch_unwind()
            .instrument(span)
            .await
            .unwrap_or_else(|panic| {
                let message = panic_message(panic.as_ref());
                error!("Handler for {} panicked: {}", route, message);
                Err(DispatchError::handler(message))
            });

        let elapsed = request_metrics.elapsed_ms();
        match &result {
            Ok(reply) => {
                if let Reply::Capture(CaptureOutcome::Unchanged { .. }) = reply {
                    self.metrics.record_unchanged();
                }
                self.metrics.record_success(elapsed);
            }
            Err(e) => {
                debug!("{} failed after {}ms: {}", route, elapsed, e);
                self.metrics.record_failure(elapsed);
            }
        }

        result
    }

    /// Parse `method` and `params`, then dispatch.
    pub async fn dispatch_method(
        &self,
        method: &str,
        params: &Map<String, Value>,
    ) -> Result<Reply, DispatchError> {
        match Request::parse(method, params) {
            Ok(request) => self.dispatch(request).await,
            Err(e) => {
                self.metrics.record_failure(0);
                Err(e)
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("Handler panicked: {}", message)
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("Handler panicked: {}", message)
    } else {
        "Handler panicked".to_string()
    }
}
