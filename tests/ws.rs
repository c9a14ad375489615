use axum::body::{to_bytes, Body};
use axum::http::Request;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tower::ServiceExt;

use remote_desk::config::ServerConfig;
use remote_desk::provider::{HeadlessProvider, InputEvent, KeyAction};
use remote_desk::server::{router, AppState};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn start() -> (Arc<HeadlessProvider>, AppState, Client) {
    let provider = Arc::new(HeadlessProvider::new(320, 240));
    let config = ServerConfig {
        shutdown_grace: Duration::from_millis(50),
        ..ServerConfig::default()
    };
    let state = AppState::new(provider.clone(), config);
    let app = router(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    let (client, _) = connect_async(format!("ws://{}/ws", addr)).await.unwrap();
    (provider, state, client)
}

async fn call(client: &mut Client, command: Value) -> Value {
    client.send(Message::Text(command.to_string())).await.unwrap();
    recv_json(client).await
}

async fn next_message(client: &mut Client) -> Message {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .expect("timed out waiting for a message")
            .expect("connection closed")
            .unwrap();
        if !matches!(message, Message::Ping(_) | Message::Pong(_)) {
            return message;
        }
    }
}

async fn recv_json(client: &mut Client) -> Value {
    match next_message(client).await {
        Message::Text(text) => serde_json::from_str(&text).unwrap(),
        other => panic!("expected a text message, got {:?}", other),
    }
}

#[tokio::test]
async fn replies_echo_the_correlation_id() {
    let (_, _, mut client) = start().await;
    let reply = call(&mut client, json!({"id": 1, "method": "GET /screen-size"})).await;
    assert_eq!(reply, json!({"id": 1, "status": 200, "data": {"width": 320, "height": 240}}));

    let reply = call(&mut client, json!({"id": "abc", "method": "GET /mouse/position"})).await;
    assert_eq!(reply, json!({"id": "abc", "status": 200, "data": {"x": 0, "y": 0}}));
}

#[tokio::test]
async fn invalid_json_keeps_the_connection_open() {
    let (_, _, mut client) = start().await;

    client.send(Message::Text("{not json".into())).await.unwrap();
    let reply = recv_json(&mut client).await;
    assert_eq!(reply, json!({"id": null, "status": 400, "error": "Invalid JSON"}));

    let reply = call(&mut client, json!({"id": 2, "method": "GET /screen-size"})).await;
    assert_eq!(reply["status"], 200);
}

#[tokio::test]
async fn unknown_method_is_404() {
    let (_, _, mut client) = start().await;
    let reply = call(&mut client, json!({"id": 3, "method": "DELETE /Key/A"})).await;
    assert_eq!(
        reply,
        json!({"id": 3, "status": 404, "error": "Unknown method: DELETE /Key/A"})
    );
}

#[tokio::test]
async fn capture_sends_metadata_then_binary_and_204_when_unchanged() {
    let (_, _, mut client) = start().await;
    let params = json!({"area": "0,0,200,100", "quality": 50});

    let meta = call(&mut client, json!({"id": 10, "method": "GET /capture", "params": params})).await;
    assert_eq!(meta["id"], 10);
    assert_eq!(meta["status"], 200);
    assert!(meta["data"]["date"].as_str().unwrap().ends_with(" GMT"));
    let hash = meta["data"]["next_hash"].as_str().unwrap().to_string();

    match next_message(&mut client).await {
        Message::Binary(bytes) => assert_eq!(&bytes[..2], &[0xFF, 0xD8]),
        other => panic!("expected the frame, got {:?}", other),
    }

    let mut params = params;
    params["last_hash"] = json!(hash);
    let reply = call(&mut client, json!({"id": 11, "method": "GET /capture", "params": params})).await;
    assert_eq!(reply, json!({"id": 11, "status": 204, "data": {"next_hash": hash}}));

    // No binary follows an unchanged reply
    let reply = call(&mut client, json!({"id": 12, "method": "GET /screen-size"})).await;
    assert_eq!(reply["id"], 12);
}

#[tokio::test]
async fn handler_faults_are_500() {
    let (_, _, mut client) = start().await;
    let reply = call(&mut client, json!({"id": 4, "method": "POST /mouse/left/sideways"})).await;
    assert_eq!(
        reply,
        json!({"id": 4, "status": 500, "error": "Invalid action: sideways. Use: up or down"})
    );

    let reply = call(&mut client, json!({"id": 5, "method": "POST /key/"})).await;
    assert_eq!(
        reply,
        json!({"id": 5, "status": 404, "error": "Unknown method: POST /key/"})
    );
}

/// POST `path` over HTTP and shape the response like a WebSocket reply.
async fn http_post(state: &AppState, path: &str) -> Value {
    let request = Request::post(path).body(Body::empty()).unwrap();
    let response = router(state.clone()).oneshot(request).await.unwrap();
    let status = response.status().as_u16();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&body).unwrap();
    if status == 200 {
        json!({"status": status, "data": body})
    } else {
        json!({"status": status, "error": body["error"]})
    }
}

#[tokio::test]
async fn path_arguments_behave_the_same_on_both_transports() {
    let (_, state, mut client) = start().await;
    let paths = [
        "/key/",
        "/key//down",
        "/key/a/",
        "/key/a/b/down",
        "/key/a/down",
        "/key/a/up",
        "/key/enter",
        "/text/",
        "/text/a/b",
        "/mouse//down",
        "/mouse/left/",
        "/mouse/left/down/x",
        "/mouse/left/sideways",
    ];

    for (id, path) in paths.into_iter().enumerate() {
        let mut over_ws =
            call(&mut client, json!({"id": id, "method": format!("POST {}", path)})).await;
        over_ws.as_object_mut().unwrap().remove("id");
        let over_http = http_post(&state, path).await;
        assert_eq!(over_ws, over_http, "{} differs between transports", path);
    }
}

#[tokio::test]
async fn input_commands_reach_the_provider() {
    let (provider, _, mut client) = start().await;

    call(&mut client, json!({"id": 1, "method": "POST /mouse/move", "params": {"x": 5, "y": 6}})).await;
    call(&mut client, json!({"id": 2, "method": "POST /key/ctrl/down"})).await;
    call(&mut client, json!({"id": 3, "method": "POST /key/ctrl/up"})).await;
    let reply = call(&mut client, json!({"id": 4, "method": "POST /text/hi there"})).await;
    assert_eq!(reply["data"], json!({"success": true, "text": "hi there"}));

    assert_eq!(
        provider.journal().await,
        vec![
            InputEvent::PointerMove { x: 5, y: 6 },
            InputEvent::Key { key: "ctrl".into(), action: KeyAction::Down },
            InputEvent::Key { key: "ctrl".into(), action: KeyAction::Up },
            InputEvent::Text("hi there".into()),
        ]
    );
}

#[tokio::test]
async fn shutdown_drains_holds_and_closes_the_channel() {
    let (provider, state, mut client) = start().await;
    call(&mut client, json!({"id": 1, "method": "POST /key/a/down"})).await;
    call(&mut client, json!({"id": 2, "method": "POST /key/b/down"})).await;

    let reply = call(&mut client, json!({"id": 3, "method": "POST /shutdown"})).await;
    assert_eq!(
        reply,
        json!({"id": 3, "status": 200, "data": {"success": true, "message": "Server shutting down"}})
    );

    let journal = provider.journal().await;
    for key in ["a", "b"] {
        assert!(journal.contains(&InputEvent::Key { key: key.into(), action: KeyAction::Up }));
    }

    tokio::time::timeout(Duration::from_secs(2), state.shutdown.cancelled())
        .await
        .unwrap();

    let closed = tokio::time::timeout(Duration::from_secs(2), async {
        while let Some(Ok(message)) = client.next().await {
            if let Message::Close(_) = message {
                return;
            }
        }
    })
    .await;
    assert!(closed.is_ok(), "connection was not closed after shutdown");
}
