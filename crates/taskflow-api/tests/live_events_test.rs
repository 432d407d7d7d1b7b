//! Live delivery over a real socket: the router is served on an ephemeral
//! port and clients connect with tokio-tungstenite.

use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tower::ServiceExt;
use uuid::Uuid;

use taskflow_api::{router, AppState};
use taskflow_core::{EventChannel, InMemoryStore, TaskEvent, TASKS_ROOM};

const SECRET: &str = "live-test-secret";

async fn spawn_test_server() -> (String, AppState, InMemoryStore) {
    let store = InMemoryStore::new();
    let state = AppState::in_memory(&store, EventChannel::new(64), SECRET);
    let app = router(state.clone(), &[]);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    (format!("http://{}", addr), state, store)
}

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

async fn connect(base_url: &str, token: Option<&str>) -> WsStream {
    let ws_url = base_url.replace("http://", "ws://") + "/api/v1/ws";
    let mut request = ws_url.into_client_request().unwrap();
    if let Some(token) = token {
        request.headers_mut().insert(
            "authorization",
            format!("Bearer {}", token).parse().unwrap(),
        );
    }
    let (ws, response) = tokio_tungstenite::connect_async(request).await.unwrap();
    assert_eq!(response.status(), 101);
    ws
}

/// Next text frame as JSON, skipping pings.
async fn next_event(ws: &mut WsStream) -> Value {
    let deadline = Duration::from_secs(5);
    let start = tokio::time::Instant::now();
    loop {
        let remaining = deadline.saturating_sub(start.elapsed());
        if remaining.is_zero() {
            panic!("timeout waiting for WS text message");
        }
        let msg = tokio::time::timeout(remaining, ws.next())
            .await
            .expect("timeout waiting for WS message")
            .expect("stream ended")
            .expect("WS error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

/// Wait until the server has registered `n` subscribers.
async fn wait_for_subscribers(state: &AppState, n: usize) {
    for _ in 0..100 {
        if state.events.subscriber_count() == n {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("expected {} subscribers", n);
}

#[tokio::test]
async fn test_assignee_receives_targeted_then_global_event() {
    let (base_url, state, store) = spawn_test_server().await;
    let alice = store.seed_user("alice@example.com", "Alice").await;
    let bob = store.seed_user("bob@example.com", "Bob").await;
    let alice_token = state.auth.issue_token(alice.id).unwrap();
    let bob_token = state.auth.issue_token(bob.id).unwrap();

    let mut bob_ws = connect(&base_url, Some(&bob_token)).await;
    let mut anon_ws = connect(&base_url, None).await;
    wait_for_subscribers(&state, 2).await;

    let created = create_task(
        &state,
        &alice_token,
        json!({
            "title": "Pair on review",
            "description": "Bring coffee",
            "dueDate": "2030-03-01T15:00",
            "assignedToId": bob.id,
        }),
    )
    .await;
    let task_id = created["task"]["id"].as_str().unwrap().to_string();

    let first = next_event(&mut bob_ws).await;
    assert_eq!(first["event"], "taskAssigned");
    assert_eq!(first["data"]["taskId"], task_id);
    let second = next_event(&mut bob_ws).await;
    assert_eq!(second["event"], "taskCreated");
    assert_eq!(second["data"]["id"], task_id);

    let only = next_event(&mut anon_ws).await;
    assert_eq!(only["event"], "taskCreated");
    assert_eq!(only["data"]["id"], task_id);
}

#[tokio::test]
async fn test_join_tasks_message_adds_room() {
    let (base_url, state, _store) = spawn_test_server().await;
    let mut ws = connect(&base_url, None).await;
    wait_for_subscribers(&state, 1).await;

    ws.send(Message::Text(r#"{"event":"joinTasks"}"#.to_string()))
        .await
        .unwrap();
    for _ in 0..100 {
        if state.events.room_size(TASKS_ROOM) == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(state.events.room_size(TASKS_ROOM), 1);

    let id = Uuid::now_v7();
    state.events.emit_to(TASKS_ROOM, TaskEvent::Updated { id });
    let event = next_event(&mut ws).await;
    assert_eq!(event["event"], "taskUpdated");
    assert_eq!(event["data"]["id"], id.to_string());
}

#[tokio::test]
async fn test_disconnect_unregisters_subscriber() {
    let (base_url, state, _store) = spawn_test_server().await;
    let mut ws = connect(&base_url, None).await;
    wait_for_subscribers(&state, 1).await;
    assert_eq!(
        state.ws_connections.load(std::sync::atomic::Ordering::Relaxed),
        1
    );

    ws.close(None).await.unwrap();
    drop(ws);
    wait_for_subscribers(&state, 0).await;
    assert_eq!(state.events.emit(TaskEvent::Created { id: Uuid::nil() }), 0);
}

/// Create a task through a second router sharing the server's state.
async fn create_task(state: &AppState, token: &str, body: Value) -> Value {
    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/tasks")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = router(state.clone(), &[]).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_sse_stream_delivers_named_events() {
    let store = InMemoryStore::new();
    let state = AppState::in_memory(&store, EventChannel::new(64), SECRET);
    let user = store.seed_user("carol@example.com", "Carol").await;
    let token = state.auth.issue_token(user.id).unwrap();

    let request = Request::builder()
        .uri("/api/v1/events")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();
    let response = router(state.clone(), &[]).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "text/event-stream"
    );
    assert_eq!(state.events.subscriber_count(), 1);

    let task_id = Uuid::now_v7();
    state
        .events
        .emit_to(&taskflow_core::user_room(user.id), TaskEvent::Assigned { task_id });

    let mut body = response.into_body().into_data_stream();
    let mut frame = String::new();
    while !frame.contains("\n\n") {
        let chunk = tokio::time::timeout(Duration::from_secs(5), body.next())
            .await
            .expect("timeout waiting for SSE frame")
            .expect("stream ended")
            .unwrap();
        frame.push_str(std::str::from_utf8(&chunk).unwrap());
    }
    assert!(frame.contains("event: taskAssigned\n"), "{}", frame);
    assert!(
        frame.contains(&format!("data: {{\"taskId\":\"{}\"}}\n", task_id)),
        "{}",
        frame
    );

    drop(body);
    assert_eq!(state.events.subscriber_count(), 0);
}
