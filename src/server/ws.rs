//! WebSocket entrypoint and connection loop.
//!
//! Each text frame carries one `{id, method, params}` command. Commands on a
//! connection are handled one at a time, in arrival order; every reply
//! echoes the command's `id`. A capture that produced a new frame is
//! answered with its JSON metadata followed by one binary message.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::response::IntoResponse;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::{Map, Value};
use std::net::SocketAddr;
use tracing::{debug, info, warn};

use super::AppState;
use crate::dispatch::CommandResult;
use crate::error::DispatchError;
use crate::metrics::{DispatchMetrics, RequestMetrics};

type Sender = SplitSink<WebSocket, Message>;

/// Reply envelope: the command result tagged with the command's id.
#[derive(Debug, Serialize)]
struct Outbound {
    id: Value,
    #[serde(flatten)]
    result: CommandResult,
}

/// A decoded inbound command.
#[derive(Debug, PartialEq)]
struct Inbound {
    id: Value,
    method: String,
    params: Map<String, Value>,
}

impl Inbound {
    /// Decode a text frame. Anything but a JSON object is a protocol error.
    fn decode(text: &str) -> Result<Self, DispatchError> {
        let Ok(Value::Object(mut message)) = serde_json::from_str::<Value>(text) else {
            return Err(DispatchError::invalid_json());
        };

        Ok(Self {
            id: message.remove("id").unwrap_or(Value::Null),
            method: match message.remove("method") {
                Some(Value::String(method)) => method,
                _ => String::new(),
            },
            params: match message.remove("params") {
                Some(Value::Object(params)) => params,
                _ => Map::new(),
            },
        })
    }
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
) -> impl IntoResponse {
    let client = connect_info
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    ws.on_upgrade(move |socket| handle_connection(socket, state, client))
}

async fn handle_connection(socket: WebSocket, state: AppState, client: String) {
    let (mut sender, mut receiver) = socket.split();
    let metrics = DispatchMetrics::new();
    let shutdown = state.shutdown.clone();

    info!("WebSocket connected: {}", client);

    loop {
        let next = tokio::select! {
            _ = shutdown.cancelled() => {
                debug!("Closing WebSocket {} for shutdown", client);
                let _ = sender.send(Message::Close(None)).await;
                break;
            }
            next = receiver.next() => next,
        };

        let message = match next {
            Some(Ok(message)) => message,
            Some(Err(e)) => {
                warn!("WebSocket error from {}: {}", client, e);
                break;
            }
            None => break,
        };

        match message {
            Message::Text(text) => {
                if let Err(e) = handle_text(&state, &client, &metrics, &text, &mut sender).await {
                    warn!("Failed to reply to {}: {}", client, e);
                    break;
                }
            }
            Message::Close(_) => break,
            Message::Binary(data) => {
                debug!("Ignoring {} byte binary frame from {}", data.len(), client);
            }
            // Pings are answered by axum
            Message::Ping(_) | Message::Pong(_) => {}
        }
    }

    metrics.log_summary(&format!("WebSocket {} closed", client));
}

async fn handle_text(
    state: &AppState,
    client: &str,
    metrics: &DispatchMetrics,
    text: &str,
    sender: &mut Sender,
) -> Result<(), axum::Error> {
    let inbound = match Inbound::decode(text) {
        Ok(inbound) => inbound,
        Err(err) => {
            debug!("Undecodable frame from {}", client);
            metrics.record_failure(0);
            state.metrics.record_failure(0);
            let result = CommandResult::failure(&err);
            return send_json(sender, Value::Null, result).await;
        }
    };

    let request_metrics = RequestMetrics::new();
    let outcome = state
        .registry
        .dispatch_method(&inbound.method, &inbound.params)
        .await;
    let (result, frame) = CommandResult::from_outcome(outcome);

    let elapsed = request_metrics.elapsed_ms();
    if result.error.is_some() {
        metrics.record_failure(elapsed);
    } else {
        if result.status == 204 {
            metrics.record_unchanged();
        }
        metrics.record_success(elapsed);
    }

    info!("{} - \"{} WS\" {}", client, inbound.method, result.status);

    send_json(sender, inbound.id, result).await?;
    if let Some(frame) = frame {
        sender.send(Message::Binary(frame)).await?;
    }
    Ok(())
}

async fn send_json(sender: &mut Sender, id: Value, result: CommandResult) -> Result<(), axum::Error> {
    let outbound = Outbound { id, result };
    let text = serde_json::to_string(&outbound).map_err(axum::Error::new)?;
    sender.send(Message::Text(text)).await
}
