//! Live task events and the in-process publish/subscribe channel.
//!
//! Every event is a "re-fetch your state" hint: payloads carry only an id,
//! and clients always reload authoritative data over HTTP. Delivery is
//! at-most-once and best-effort. Nothing is persisted or replayed, and a
//! subscriber that is not connected at emit time never sees the event.
//!
//! ## Addressing
//!
//! - [`EventChannel::emit`] delivers to every connected subscriber.
//! - [`EventChannel::emit_to`] delivers to the members of one room.
//!
//! Rooms are named sets of subscribers. Each authenticated connection sits
//! in the room named after its user id (see [`user_room`]); clients may also
//! join [`TASKS_ROOM`]. Dropping a [`Subscription`] removes the subscriber
//! from every room it joined.
//!
//! ## Wire Format
//!
//! ```text
//! {"event":"taskAssigned","eventId":"019508a0-...","occurredAt":"...","data":{"taskId":"..."}}
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock, Weak};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Shared room clients join with the `joinTasks` message.
pub const TASKS_ROOM: &str = "tasks";

/// Default per-subscriber queue bound.
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 256;

/// Room that receives targeted events for one user.
pub fn user_room(user_id: Uuid) -> String {
    user_id.to_string()
}

// ============================================================================
// Task events
// ============================================================================

/// Task lifecycle events pushed to live clients.
///
/// Serializes to the bare payload (`{"id":...}` or `{"taskId":...}`); the
/// event name travels separately in the envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum TaskEvent {
    /// A task was created.
    Created { id: Uuid },
    /// A task was updated.
    Updated { id: Uuid },
    /// A task's assignee became the receiving user.
    Assigned {
        #[serde(rename = "taskId")]
        task_id: Uuid,
    },
    /// A task was deleted. Only emitted when enabled in configuration.
    Deleted { id: Uuid },
}

impl TaskEvent {
    /// Wire-level event name.
    pub fn name(&self) -> &'static str {
        match self {
            TaskEvent::Created { .. } => "taskCreated",
            TaskEvent::Updated { .. } => "taskUpdated",
            TaskEvent::Assigned { .. } => "taskAssigned",
            TaskEvent::Deleted { .. } => "taskDeleted",
        }
    }

    /// The task this event refers to.
    pub fn task_id(&self) -> Uuid {
        match self {
            TaskEvent::Created { id } | TaskEvent::Updated { id } | TaskEvent::Deleted { id } => {
                *id
            }
            TaskEvent::Assigned { task_id } => *task_id,
        }
    }
}

/// What a subscriber actually receives.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    /// Event name, e.g. `"taskCreated"`.
    pub event: &'static str,
    /// UUIDv7, useful for client-side dedupe and log correlation.
    pub event_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub data: TaskEvent,
}

impl EventEnvelope {
    pub fn new(event: TaskEvent) -> Self {
        Self {
            event: event.name(),
            event_id: crate::uuid_utils::new_v7(),
            occurred_at: Utc::now(),
            data: event,
        }
    }
}

// ============================================================================
// Event channel
// ============================================================================

/// Opaque handle identifying one connected subscriber.
pub type SubscriberId = u64;

struct SubscriberEntry {
    tx: mpsc::Sender<EventEnvelope>,
    rooms: HashSet<String>,
}

#[derive(Default)]
struct Registry {
    next_id: SubscriberId,
    subscribers: HashMap<SubscriberId, SubscriberEntry>,
    rooms: HashMap<String, HashSet<SubscriberId>>,
}

impl Registry {
    fn remove(&mut self, id: SubscriberId) -> Option<SubscriberEntry> {
        let entry = self.subscribers.remove(&id)?;
        for room in &entry.rooms {
            if let Some(members) = self.rooms.get_mut(room) {
                members.remove(&id);
                if members.is_empty() {
                    self.rooms.remove(room);
                }
            }
        }
        Some(entry)
    }
}

struct ChannelInner {
    registry: RwLock<Registry>,
    buffer: usize,
}

impl ChannelInner {
    fn read(&self) -> std::sync::RwLockReadGuard<'_, Registry> {
        self.registry.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Registry> {
        self.registry.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Room-aware publish/subscribe hub for live task events.
///
/// Cheap to clone; all clones share one registry. Each subscriber owns a
/// bounded queue of [`EventEnvelope`]s. A subscriber whose queue is full
/// misses the event rather than slowing the emitter down.
#[derive(Clone)]
pub struct EventChannel {
    inner: Arc<ChannelInner>,
}

impl Default for EventChannel {
    fn default() -> Self {
        Self::new(DEFAULT_SUBSCRIBER_BUFFER)
    }
}

impl EventChannel {
    /// Create a channel whose subscribers each buffer up to `buffer` events.
    ///
    /// Recommended: 256 for production, 32 for tests.
    pub fn new(buffer: usize) -> Self {
        Self {
            inner: Arc::new(ChannelInner {
                registry: RwLock::new(Registry::default()),
                buffer: buffer.max(1),
            }),
        }
    }

    /// Register a connected subscriber.
    ///
    /// The subscriber is in no room until it joins one, but receives every
    /// global event from now on.
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel(self.inner.buffer);
        let id = {
            let mut registry = self.inner.write();
            registry.next_id += 1;
            let id = registry.next_id;
            registry.subscribers.insert(
                id,
                SubscriberEntry {
                    tx,
                    rooms: HashSet::new(),
                },
            );
            id
        };
        tracing::debug!(subscriber = id, "EventChannel subscribe");
        Subscription {
            id,
            rx,
            channel: Arc::downgrade(&self.inner),
        }
    }

    /// Add a subscriber to a room. Joining twice has no further effect.
    ///
    /// Returns false if the subscriber is no longer connected.
    pub fn join(&self, subscriber: SubscriberId, room: &str) -> bool {
        let mut registry = self.inner.write();
        let Some(entry) = registry.subscribers.get_mut(&subscriber) else {
            return false;
        };
        if !entry.rooms.insert(room.to_string()) {
            return true;
        }
        registry
            .rooms
            .entry(room.to_string())
            .or_default()
            .insert(subscriber);
        tracing::debug!(subscriber, room, "EventChannel join");
        true
    }

    /// Deliver an event to every connected subscriber.
    ///
    /// Returns how many subscribers had it queued.
    pub fn emit(&self, event: TaskEvent) -> usize {
        let envelope = EventEnvelope::new(event);
        let registry = self.inner.read();
        let delivered = registry
            .subscribers
            .iter()
            .filter(|(id, entry)| deliver(**id, &entry.tx, &envelope))
            .count();
        tracing::debug!(
            event = envelope.event,
            event_id = %envelope.event_id,
            task_id = %event.task_id(),
            subscriber_count = registry.subscribers.len(),
            delivered,
            "EventChannel emit"
        );
        delivered
    }

    /// Deliver an event to the current members of `room` only.
    pub fn emit_to(&self, room: &str, event: TaskEvent) -> usize {
        let envelope = EventEnvelope::new(event);
        let registry = self.inner.read();
        let delivered = match registry.rooms.get(room) {
            Some(members) => members
                .iter()
                .filter_map(|id| registry.subscribers.get(id).map(|entry| (id, entry)))
                .filter(|(id, entry)| deliver(**id, &entry.tx, &envelope))
                .count(),
            None => 0,
        };
        tracing::debug!(
            event = envelope.event,
            event_id = %envelope.event_id,
            task_id = %event.task_id(),
            room,
            delivered,
            "EventChannel emit_to"
        );
        delivered
    }

    /// Number of connected subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.read().subscribers.len()
    }

    /// Number of subscribers currently in `room`.
    pub fn room_size(&self, room: &str) -> usize {
        self.inner.read().rooms.get(room).map_or(0, HashSet::len)
    }

    /// Rooms a subscriber belongs to, sorted.
    pub fn rooms_of(&self, subscriber: SubscriberId) -> Vec<String> {
        let registry = self.inner.read();
        let mut rooms: Vec<String> = registry
            .subscribers
            .get(&subscriber)
            .map(|entry| entry.rooms.iter().cloned().collect())
            .unwrap_or_default();
        rooms.sort();
        rooms
    }
}

fn deliver(id: SubscriberId, tx: &mpsc::Sender<EventEnvelope>, envelope: &EventEnvelope) -> bool {
    match tx.try_send(envelope.clone()) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(_)) => {
            tracing::warn!(
                subscriber = id,
                event = envelope.event,
                "Subscriber lagged, event dropped"
            );
            false
        }
        // Receiver already gone; its Drop is removing it from the registry.
        Err(mpsc::error::TrySendError::Closed(_)) => false,
    }
}

/// A connected subscriber's end of the channel.
///
/// Dropping it disconnects the subscriber and leaves every room.
pub struct Subscription {
    id: SubscriberId,
    rx: mpsc::Receiver<EventEnvelope>,
    channel: Weak<ChannelInner>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Join a room on behalf of this subscriber.
    pub fn join(&self, room: &str) -> bool {
        match self.channel.upgrade() {
            Some(inner) => EventChannel { inner }.join(self.id, room),
            None => false,
        }
    }

    /// Wait for the next event. `None` once the channel itself is gone.
    pub async fn recv(&mut self) -> Option<EventEnvelope> {
        self.rx.recv().await
    }

    /// Take an already-queued event without waiting.
    pub fn try_recv(&mut self) -> Option<EventEnvelope> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.channel.upgrade() {
            let removed = inner.write().remove(self.id);
            if let Some(entry) = removed {
                tracing::debug!(
                    subscriber = self.id,
                    rooms_left = entry.rooms.len(),
                    "EventChannel unsubscribe"
                );
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(sub: &mut Subscription) -> Vec<EventEnvelope> {
        let mut out = Vec::new();
        while let Some(e) = sub.try_recv() {
            out.push(e);
        }
        out
    }

    #[tokio::test]
    async fn test_emit_reaches_every_subscriber() {
        let channel = EventChannel::new(32);
        let mut a = channel.subscribe();
        let mut b = channel.subscribe();
        b.join("some-room");

        let id = Uuid::from_u128(7);
        assert_eq!(channel.emit(TaskEvent::Created { id }), 2);

        let ea = a.recv().await.unwrap();
        let eb = b.recv().await.unwrap();
        assert_eq!(ea.event, "taskCreated");
        assert_eq!(ea.data, TaskEvent::Created { id });
        assert_eq!(eb.data, TaskEvent::Created { id });
    }

    #[tokio::test]
    async fn test_emit_to_only_reaches_room_members() {
        let channel = EventChannel::new(32);
        let user = Uuid::from_u128(2);
        let mut member = channel.subscribe();
        let mut outsider = channel.subscribe();
        member.join(&user_room(user));

        let task_id = Uuid::from_u128(9);
        let delivered = channel.emit_to(&user_room(user), TaskEvent::Assigned { task_id });
        assert_eq!(delivered, 1);

        let got = drain(&mut member);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].event, "taskAssigned");
        assert!(drain(&mut outsider).is_empty());
    }

    #[test]
    fn test_emit_to_unknown_room_is_noop() {
        let channel = EventChannel::new(32);
        let _sub = channel.subscribe();
        assert_eq!(
            channel.emit_to("nobody", TaskEvent::Assigned { task_id: Uuid::nil() }),
            0
        );
    }

    #[test]
    fn test_emit_without_subscribers_is_dropped() {
        let channel = EventChannel::new(32);
        assert_eq!(channel.emit(TaskEvent::Updated { id: Uuid::nil() }), 0);
    }

    #[test]
    fn test_join_is_idempotent() {
        let channel = EventChannel::new(32);
        let sub = channel.subscribe();
        assert!(sub.join(TASKS_ROOM));
        assert!(sub.join(TASKS_ROOM));
        assert_eq!(channel.room_size(TASKS_ROOM), 1);
        assert_eq!(channel.rooms_of(sub.id()), vec![TASKS_ROOM.to_string()]);
    }

    #[test]
    fn test_drop_leaves_all_rooms() {
        let channel = EventChannel::new(32);
        let sub = channel.subscribe();
        let other = channel.subscribe();
        sub.join(TASKS_ROOM);
        sub.join("u1");
        other.join(TASKS_ROOM);
        assert_eq!(channel.subscriber_count(), 2);

        let id = sub.id();
        drop(sub);

        assert_eq!(channel.subscriber_count(), 1);
        assert_eq!(channel.room_size(TASKS_ROOM), 1);
        assert_eq!(channel.room_size("u1"), 0);
        assert!(channel.rooms_of(id).is_empty());
        assert!(!channel.join(id, TASKS_ROOM));
    }

    #[tokio::test]
    async fn test_late_subscriber_misses_past_events() {
        let channel = EventChannel::new(32);
        channel.emit(TaskEvent::Created { id: Uuid::nil() });
        let mut late = channel.subscribe();
        assert!(late.try_recv().is_none());
    }

    #[test]
    fn test_full_queue_drops_instead_of_blocking() {
        let channel = EventChannel::new(2);
        let mut sub = channel.subscribe();
        for i in 0..5u128 {
            channel.emit(TaskEvent::Updated { id: Uuid::from_u128(i) });
        }
        let got = drain(&mut sub);
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].data, TaskEvent::Updated { id: Uuid::from_u128(0) });
    }

    #[test]
    fn test_subscription_outliving_channel() {
        let channel = EventChannel::new(4);
        let sub = channel.subscribe();
        drop(channel);
        assert!(!sub.join(TASKS_ROOM));
        drop(sub);
    }

    #[test]
    fn test_event_names() {
        let id = Uuid::nil();
        assert_eq!(TaskEvent::Created { id }.name(), "taskCreated");
        assert_eq!(TaskEvent::Updated { id }.name(), "taskUpdated");
        assert_eq!(TaskEvent::Assigned { task_id: id }.name(), "taskAssigned");
        assert_eq!(TaskEvent::Deleted { id }.name(), "taskDeleted");
    }

    #[test]
    fn test_envelope_json() {
        let id = Uuid::parse_str("01234567-89ab-cdef-0123-456789abcdef").unwrap();
        let json = serde_json::to_value(EventEnvelope::new(TaskEvent::Created { id })).unwrap();
        assert_eq!(json["event"], "taskCreated");
        assert_eq!(json["data"]["id"], "01234567-89ab-cdef-0123-456789abcdef");
        assert!(json["eventId"].is_string());
        assert!(json["occurredAt"].is_string());

        let json =
            serde_json::to_value(EventEnvelope::new(TaskEvent::Assigned { task_id: id })).unwrap();
        assert_eq!(json["data"]["taskId"], "01234567-89ab-cdef-0123-456789abcdef");
        assert!(json["data"].get("id").is_none());
    }

    #[test]
    fn test_user_room_is_user_id() {
        let id = Uuid::from_u128(42);
        assert_eq!(user_room(id), id.to_string());
    }
}
