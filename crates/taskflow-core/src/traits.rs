//! Core traits for taskflow's record store.
//!
//! These traits define the interfaces that concrete implementations
//! must satisfy, enabling pluggable backends and testability.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;

// =============================================================================
// TASK REPOSITORY
// =============================================================================

/// Repository for task CRUD operations.
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Insert a new task and return the stored row.
    async fn insert(&self, req: NewTask) -> Result<Task>;

    /// Fetch a task by ID. `Ok(None)` when it does not exist.
    async fn fetch(&self, id: Uuid) -> Result<Option<Task>>;

    /// Fetch a task with creator and assignee resolved.
    async fn fetch_with_relations(&self, id: Uuid) -> Result<Option<TaskWithRelations>>;

    /// Apply the present fields of `patch` and bump the version.
    ///
    /// Fails with `TaskNotFound` if the row is gone and with `Conflict` if
    /// `patch.expected_version` no longer matches.
    async fn update(&self, id: Uuid, patch: &TaskPatch) -> Result<Task>;

    /// Permanently delete a task. Fails with `TaskNotFound` if absent.
    async fn delete(&self, id: Uuid) -> Result<()>;

    /// List tasks matching `filter`, with relations resolved.
    async fn list(&self, filter: &TaskListFilter) -> Result<Vec<TaskWithRelations>>;
}

// =============================================================================
// NOTIFICATION REPOSITORY
// =============================================================================

/// Repository for per-user notifications.
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    /// Persist a notification (unread, timestamped now).
    async fn insert(&self, req: NewNotification) -> Result<Notification>;

    /// All notifications for a recipient, newest first.
    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Notification>>;

    /// Set `read = true`. Idempotent. Fails with `NotificationNotFound` when
    /// the notification does not exist or belongs to someone else.
    async fn mark_read(&self, id: Uuid, user_id: Uuid) -> Result<Notification>;
}

// =============================================================================
// USER REPOSITORY
// =============================================================================

/// Repository for user accounts.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a user. Fails with `Conflict` if the email is taken.
    async fn insert(&self, req: NewUser) -> Result<User>;

    /// Fetch a user by ID.
    async fn fetch(&self, id: Uuid) -> Result<Option<User>>;

    /// Fetch a user by email (case-insensitive).
    async fn fetch_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Change the display name.
    async fn update_name(&self, id: Uuid, name: &str) -> Result<User>;

    /// All users, ordered by name.
    async fn list(&self) -> Result<Vec<UserSummary>>;
}
