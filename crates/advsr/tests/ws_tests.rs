//! WebSocket subscription integration tests.
//!
//! These run the router on a real listener and connect with a WebSocket
//! client, so the full handshake path is exercised: token from the query
//! parameter, ownership check, snapshot-first frame, hub fan-out.

use std::net::SocketAddr;
use std::time::Duration;

use axum::http::Method;
use futures::StreamExt;
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite};

use advsr::chat::testing::ScriptedProvider;

mod common;
use common::{TestApp, body_json, register_user, send_json, test_app_with};

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Serve the app on an ephemeral port and return its address.
async fn serve(app: &TestApp) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = app.router.clone();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// Next event frame from the socket, skipping keepalive frames.
async fn next_event(socket: &mut WsClient) -> Value {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("timed out waiting for an event frame")
            .expect("socket closed before an event arrived")
            .expect("websocket error");

        match frame {
            Message::Text(text) => return serde_json::from_str(text.as_str()).unwrap(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

/// Collect event frames until `stream_end`, inclusive.
async fn collect_until_stream_end(socket: &mut WsClient) -> Vec<Value> {
    let mut events = Vec::new();
    loop {
        let event = next_event(socket).await;
        let done = event["type"] == "stream_end";
        events.push(event);
        if done {
            break;
        }
    }
    events
}

/// The connection must be refused before the upgrade completes.
fn assert_rejected(err: tungstenite::Error, expected_status: u16) {
    match err {
        tungstenite::Error::Http(response) => {
            assert_eq!(response.status().as_u16(), expected_status);
        }
        other => panic!("expected an HTTP rejection, got {other:?}"),
    }
}

async fn create_chat(app: &TestApp, token: &str, message: &str) -> String {
    let response = send_json(
        &app.router,
        Method::POST,
        "/v1/chats",
        Some(token),
        json!({ "message": message }),
    )
    .await;
    let chat_id = body_json(response).await["id"].as_str().unwrap().to_string();
    app.wait_until_idle(&chat_id).await;
    chat_id
}

/// Unauthenticated, foreign, and missing subscriptions are all closed
/// before a single event is sent.
#[tokio::test]
async fn test_ws_rejects_unauthorized_and_foreign_subscribers() {
    let app = test_app_with(ScriptedProvider::new(["reply"])).await;
    let owner = register_user(&app.router, "owner@example.com").await;
    let intruder = register_user(&app.router, "intruder@example.com").await;

    let chat_id = create_chat(&app, &owner, "private question").await;
    let addr = serve(&app).await;

    let err = connect_async(format!("ws://{addr}/chat?id={chat_id}"))
        .await
        .unwrap_err();
    assert_rejected(err, 401);

    // A foreign conversation answers exactly like a missing one
    let err = connect_async(format!("ws://{addr}/chat?id={chat_id}&token={intruder}"))
        .await
        .unwrap_err();
    assert_rejected(err, 404);

    let err = connect_async(format!("ws://{addr}/chat?id=missing&token={owner}"))
        .await
        .unwrap_err();
    assert_rejected(err, 404);

    // None of the rejected connections was ever registered
    assert_eq!(app.hub.subscriber_count(&chat_id), 0);
    assert_eq!(app.hub.tracked_conversations(), 0);
}

/// Two subscribers of one conversation: both handshakes start with a
/// snapshot, and both see the same ordered delta sequence for a turn.
#[tokio::test]
async fn test_ws_two_subscribers_see_identical_ordered_stream() {
    // 25 one-char chunks at the default batch size of 10 produce
    // cumulative emissions at 10, 20 and the final flush at 25
    let deltas: Vec<String> = (0..25u8)
        .map(|i| char::from(b'a' + i).to_string())
        .collect();
    let full_text: String = deltas.concat();

    let app = test_app_with(ScriptedProvider::new(deltas)).await;
    let token = register_user(&app.router, "alice@example.com").await;
    let chat_id = create_chat(&app, &token, "What is SEO?").await;
    let addr = serve(&app).await;

    let url = format!("ws://{addr}/chat?id={chat_id}&token={token}");
    let (mut first, _) = connect_async(&url).await.unwrap();
    let (mut second, _) = connect_async(&url).await.unwrap();

    // The handshake frame is always a fresh snapshot, system rows excluded
    for socket in [&mut first, &mut second] {
        let event = next_event(socket).await;
        assert_eq!(event["type"], "conversation_snapshot");
        assert_eq!(event["data"]["conversation"]["status"], "idle");
        let messages = event["data"]["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert!(messages.iter().all(|m| m["role"] != "system"));
    }
    assert_eq!(app.hub.subscriber_count(&chat_id), 2);

    let response = send_json(
        &app.router,
        Method::POST,
        &format!("/v1/chats/{chat_id}/message"),
        Some(&token),
        json!({ "message": "tell me more" }),
    )
    .await;
    assert_eq!(body_json(response).await["status"], "running");

    let events_a = collect_until_stream_end(&mut first).await;
    let events_b = collect_until_stream_end(&mut second).await;
    assert_eq!(events_a, events_b);

    // Turn start is announced with a running snapshot
    assert_eq!(events_a[0]["type"], "conversation_snapshot");
    assert_eq!(events_a[0]["data"]["conversation"]["status"], "running");

    // Cumulative deltas in production order, ending with the full text
    let cumulative: Vec<&str> = events_a[1..events_a.len() - 1]
        .iter()
        .map(|event| {
            assert_eq!(event["type"], "content_delta");
            event["data"].as_str().unwrap()
        })
        .collect();
    assert_eq!(cumulative.len(), 3);
    for pair in cumulative.windows(2) {
        assert!(pair[1].starts_with(pair[0]));
    }
    assert_eq!(*cumulative.last().unwrap(), full_text);

    assert_eq!(events_a.last().unwrap()["type"], "stream_end");

    app.wait_until_idle(&chat_id).await;
}
