//! Live transports: WebSocket, Server-Sent Events and the health check.
//!
//! Both transports register one [`Subscription`] per connection. A
//! connection with a valid session joins the room named after its user, so
//! targeted `taskAssigned` events reach it; every connection receives global
//! events. Dropping the subscription when the connection ends removes it
//! from all rooms.

use std::convert::Infallible;
use std::sync::atomic::Ordering;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive};
use axum::response::{IntoResponse, Sse};
use axum::Json;
use futures::{SinkExt, Stream, StreamExt};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use taskflow_core::{logging, user_room, EventChannel, SubscriberId, Subscription, TASKS_ROOM};

use crate::auth::MaybeAuth;
use crate::AppState;

const WS_PING_INTERVAL: Duration = Duration::from_secs(30);
const SSE_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Messages a client may send over the socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientCommand {
    JoinTasks,
}

#[derive(Deserialize)]
struct ClientFrame {
    event: String,
}

impl ClientCommand {
    /// Accepts `{"event":"joinTasks"}` or the bare text `joinTasks`.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let name = match serde_json::from_str::<ClientFrame>(text) {
            Ok(frame) => frame.event,
            Err(_) => text.to_string(),
        };
        match name.as_str() {
            "joinTasks" => Some(ClientCommand::JoinTasks),
            _ => None,
        }
    }
}

/// Register a subscription and put it in the caller's user room.
fn open_subscription(events: &EventChannel, user_id: Option<Uuid>) -> Subscription {
    let sub = events.subscribe();
    if let Some(user_id) = user_id {
        sub.join(&user_room(user_id));
    }
    sub
}

/// `GET /api/v1/ws`
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    auth: MaybeAuth,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state, auth.0))
}

async fn handle_ws_connection(socket: WebSocket, state: AppState, user_id: Option<Uuid>) {
    let mut subscription = open_subscription(&state.events, user_id);
    let subscriber = subscription.id();

    let count = state.ws_connections.fetch_add(1, Ordering::Relaxed) + 1;
    tracing::info!(
        subsystem = logging::SUBSYSTEM_API,
        component = logging::COMPONENT_WS,
        subscriber,
        user_id = ?user_id,
        active = count,
        "WebSocket connection opened"
    );

    let (mut sender, mut receiver) = socket.split();

    let mut send_task = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(WS_PING_INTERVAL);
        ping_interval.tick().await;
        loop {
            tokio::select! {
                envelope = subscription.recv() => {
                    let Some(envelope) = envelope else { break };
                    match serde_json::to_string(&envelope) {
                        Ok(text) => {
                            if sender.send(Message::Text(text)).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => tracing::warn!(
                            subsystem = logging::SUBSYSTEM_API,
                            component = logging::COMPONENT_WS,
                            error = %e,
                            "Failed to encode event"
                        ),
                    }
                }
                _ = ping_interval.tick() => {
                    if sender.send(Message::Ping(Vec::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    let events = state.events.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => handle_client_text(&events, subscriber, &text),
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Whichever side ends first takes the other down with it.
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    let count = state.ws_connections.fetch_sub(1, Ordering::Relaxed) - 1;
    tracing::info!(
        subsystem = logging::SUBSYSTEM_API,
        component = logging::COMPONENT_WS,
        subscriber,
        active = count,
        "WebSocket connection closed"
    );
}

fn handle_client_text(events: &EventChannel, subscriber: SubscriberId, text: &str) {
    match ClientCommand::parse(text) {
        Some(ClientCommand::JoinTasks) => {
            events.join(subscriber, TASKS_ROOM);
        }
        None => tracing::debug!(
            subsystem = logging::SUBSYSTEM_API,
            component = logging::COMPONENT_WS,
            subscriber,
            "Ignoring unknown client message"
        ),
    }
}

/// `GET /api/v1/events`
///
/// Each event is sent with the event name as the SSE `event:` field and
/// the payload JSON as `data:`.
pub async fn sse_events(
    State(state): State<AppState>,
    auth: MaybeAuth,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let subscription = open_subscription(&state.events, auth.0);
    tracing::debug!(
        subsystem = logging::SUBSYSTEM_API,
        component = logging::COMPONENT_SSE,
        subscriber = subscription.id(),
        user_id = ?auth.0,
        "SSE stream opened"
    );

    let stream = futures::stream::unfold(subscription, |mut sub| async move {
        loop {
            let envelope = sub.recv().await?;
            match serde_json::to_string(&envelope.data) {
                Ok(data) => {
                    let event = Event::default()
                        .event(envelope.event)
                        .id(envelope.event_id.to_string())
                        .data(data);
                    return Some((Ok(event), sub));
                }
                Err(e) => tracing::warn!(
                    subsystem = logging::SUBSYSTEM_API,
                    component = logging::COMPONENT_SSE,
                    error = %e,
                    "Failed to encode event"
                ),
            }
        }
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(SSE_KEEPALIVE_INTERVAL)
            .text("keepalive"),
    )
}

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "ok": true,
        "subscribers": state.events.subscriber_count(),
    }))
}
