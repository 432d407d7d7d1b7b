//! Shared application state handed to every handler.

use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

use taskflow_core::{
    EventChannel, InMemoryStore, NotificationRepository, TaskRepository, UserRepository,
};
use taskflow_db::Database;

use crate::auth::AuthSettings;
use crate::config::ApiConfig;
use crate::services::TaskService;

#[derive(Clone)]
pub struct AppState {
    pub tasks: Arc<dyn TaskRepository>,
    pub notifications: Arc<dyn NotificationRepository>,
    pub users: Arc<dyn UserRepository>,
    pub events: EventChannel,
    pub task_service: TaskService,
    pub auth: AuthSettings,
    /// Open WebSocket connections.
    pub ws_connections: Arc<AtomicUsize>,
}

impl AppState {
    pub fn new(
        tasks: Arc<dyn TaskRepository>,
        notifications: Arc<dyn NotificationRepository>,
        users: Arc<dyn UserRepository>,
        events: EventChannel,
        auth: AuthSettings,
    ) -> Self {
        let task_service = TaskService::new(tasks.clone(), notifications.clone(), events.clone());
        Self {
            tasks,
            notifications,
            users,
            events,
            task_service,
            auth,
            ws_connections: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Emit `taskDeleted` after deletes.
    pub fn with_delete_events(mut self, enabled: bool) -> Self {
        self.task_service = self.task_service.with_delete_events(enabled);
        self
    }

    /// State backed by Postgres, configured from `config`.
    pub fn from_database(db: &Database, events: EventChannel, config: &ApiConfig) -> Self {
        let auth = AuthSettings::new(&config.jwt_secret)
            .with_cookie(config.cookie_secure, config.cookie_same_site);
        Self::new(
            Arc::new(db.tasks.clone()),
            Arc::new(db.notifications.clone()),
            Arc::new(db.users.clone()),
            events,
            auth,
        )
        .with_delete_events(config.task_deleted_events)
    }

    /// State backed by an in-memory store.
    pub fn in_memory(store: &InMemoryStore, events: EventChannel, jwt_secret: &str) -> Self {
        Self::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            events,
            AuthSettings::new(jwt_secret),
        )
    }
}
