//! Domain models for taskflow.
//!
//! All entities serialize as camelCase JSON; enum values use the
//! SCREAMING_SNAKE_CASE names the browser client expects.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Maximum task title length in characters.
pub const MAX_TITLE_LEN: usize = 100;

/// Maximum display name length accepted at registration.
pub const MAX_USER_NAME_LEN: usize = 100;

// =============================================================================
// TASK ENUMS
// =============================================================================

/// Task priority.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "LOW"),
            Self::Medium => write!(f, "MEDIUM"),
            Self::High => write!(f, "HIGH"),
            Self::Urgent => write!(f, "URGENT"),
        }
    }
}

impl std::str::FromStr for Priority {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "LOW" => Ok(Self::Low),
            "MEDIUM" => Ok(Self::Medium),
            "HIGH" => Ok(Self::High),
            "URGENT" => Ok(Self::Urgent),
            _ => Err(format!("Invalid priority: {}", s)),
        }
    }
}

/// Task workflow status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    #[default]
    Todo,
    InProgress,
    Review,
    Completed,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Todo => write!(f, "TODO"),
            Self::InProgress => write!(f, "IN_PROGRESS"),
            Self::Review => write!(f, "REVIEW"),
            Self::Completed => write!(f, "COMPLETED"),
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "TODO" => Ok(Self::Todo),
            "IN_PROGRESS" => Ok(Self::InProgress),
            "REVIEW" => Ok(Self::Review),
            "COMPLETED" => Ok(Self::Completed),
            _ => Err(format!("Invalid status: {}", s)),
        }
    }
}

// =============================================================================
// USERS
// =============================================================================

/// A registered user.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    /// Argon2id PHC string. Never leaves the server.
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Public view of a user, attached to tasks for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: Uuid,
    pub email: String,
    pub name: String,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            name: user.name.clone(),
        }
    }
}

impl From<User> for UserSummary {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            name: user.name,
        }
    }
}

/// Input for creating a user. The password is already hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub name: String,
    pub password_hash: String,
}

// =============================================================================
// TASKS
// =============================================================================

/// A task record as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub due_date: DateTime<Utc>,
    pub priority: Priority,
    pub status: TaskStatus,
    /// Set once at creation, never reassigned.
    pub creator_id: Uuid,
    /// At most one assignee at a time.
    pub assigned_to_id: Option<Uuid>,
    /// Optimistic concurrency counter, incremented on every update.
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A task with its creator and assignee resolved for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskWithRelations {
    #[serde(flatten)]
    pub task: Task,
    pub creator: Option<UserSummary>,
    pub assignee: Option<UserSummary>,
}

/// Validated fields for a task about to be created.
///
/// The creator is supplied separately by the caller (the authenticated actor).
#[derive(Debug, Clone)]
pub struct TaskDraft {
    pub title: String,
    pub description: String,
    pub due_date: DateTime<Utc>,
    pub priority: Priority,
    pub status: TaskStatus,
    pub assigned_to_id: Option<Uuid>,
}

impl TaskDraft {
    /// Check field constraints. Runs at the HTTP boundary, before any mutation.
    pub fn validate(&self) -> Result<()> {
        validate_title(&self.title)?;
        validate_description(&self.description)
    }
}

/// Row-level insert request for the record store.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub title: String,
    pub description: String,
    pub due_date: DateTime<Utc>,
    pub priority: Priority,
    pub status: TaskStatus,
    pub creator_id: Uuid,
    pub assigned_to_id: Option<Uuid>,
}

impl NewTask {
    pub fn from_draft(creator_id: Uuid, draft: TaskDraft) -> Self {
        Self {
            title: draft.title,
            description: draft.description,
            due_date: draft.due_date,
            priority: draft.priority,
            status: draft.status,
            creator_id,
            assigned_to_id: draft.assigned_to_id,
        }
    }
}

/// Error message for a task write whose assignee is not a user.
pub const UNKNOWN_ASSIGNEE: &str = "Assigned user does not exist";

/// Partial update of a task's mutable fields.
///
/// `None` on any field means "leave untouched". `assigned_to_id` is doubly
/// optional: `None` leaves the assignee alone, `Some(None)` unassigns and
/// `Some(Some(id))` assigns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub priority: Option<Priority>,
    pub status: Option<TaskStatus>,
    pub assigned_to_id: Option<Option<Uuid>>,
    /// When set, the write only succeeds if the stored version still matches.
    pub expected_version: Option<i32>,
}

impl TaskPatch {
    /// Check constraints on the fields that are present.
    pub fn validate(&self) -> Result<()> {
        if let Some(title) = &self.title {
            validate_title(title)?;
        }
        if let Some(description) = &self.description {
            validate_description(description)?;
        }
        Ok(())
    }

    /// Whether applying this patch to `before` moves the task to a different assignee.
    ///
    /// An absent `assigned_to_id` is never a change, whatever the stored value.
    pub fn assignee_changed(&self, before: &Task) -> bool {
        match self.assigned_to_id {
            Some(next) => next != before.assigned_to_id,
            None => false,
        }
    }

    /// Merge present fields into `task`. Absent fields keep their value.
    pub fn apply_to(&self, task: &mut Task) {
        if let Some(title) = &self.title {
            task.title = title.clone();
        }
        if let Some(description) = &self.description {
            task.description = description.clone();
        }
        if let Some(due_date) = self.due_date {
            task.due_date = due_date;
        }
        if let Some(priority) = self.priority {
            task.priority = priority;
        }
        if let Some(status) = self.status {
            task.status = status;
        }
        if let Some(assigned_to_id) = self.assigned_to_id {
            task.assigned_to_id = assigned_to_id;
        }
    }
}

fn validate_title(title: &str) -> Result<()> {
    let len = title.chars().count();
    if title.trim().is_empty() {
        return Err(Error::InvalidInput("title is required".to_string()));
    }
    if len > MAX_TITLE_LEN {
        return Err(Error::InvalidInput(format!(
            "title must be at most {} characters (got {})",
            MAX_TITLE_LEN, len
        )));
    }
    Ok(())
}

fn validate_description(description: &str) -> Result<()> {
    if description.trim().is_empty() {
        return Err(Error::InvalidInput("description is required".to_string()));
    }
    Ok(())
}

/// Sort order for task listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TaskSort {
    #[default]
    DueDateAsc,
    DueDateDesc,
}

/// Filter predicates for listing tasks. All present predicates must match.
#[derive(Debug, Clone, Default)]
pub struct TaskListFilter {
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    /// Only tasks assigned to this user.
    pub assigned_to: Option<Uuid>,
    /// Only tasks created by this user.
    pub created_by: Option<Uuid>,
    /// Only tasks due strictly before this instant.
    pub due_before: Option<DateTime<Utc>>,
    pub sort: TaskSort,
}

impl TaskListFilter {
    /// Whether `task` satisfies every present predicate.
    pub fn matches(&self, task: &Task) -> bool {
        self.status.map_or(true, |s| task.status == s)
            && self.priority.map_or(true, |p| task.priority == p)
            && self
                .assigned_to
                .map_or(true, |u| task.assigned_to_id == Some(u))
            && self.created_by.map_or(true, |u| task.creator_id == u)
            && self.due_before.map_or(true, |t| task.due_date < t)
    }
}

// =============================================================================
// NOTIFICATIONS
// =============================================================================

/// Notification kind tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationType {
    TaskAssigned,
}

impl std::fmt::Display for NotificationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TaskAssigned => write!(f, "TASK_ASSIGNED"),
        }
    }
}

impl std::str::FromStr for NotificationType {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "TASK_ASSIGNED" => Ok(Self::TaskAssigned),
            _ => Err(format!("Invalid notification type: {}", s)),
        }
    }
}

/// A persisted notice for one recipient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    /// Recipient, not the actor.
    pub user_id: Uuid,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub data: JsonValue,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

/// Insert request for a notification.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: Uuid,
    pub kind: NotificationType,
    pub data: JsonValue,
}

impl NewNotification {
    /// Notification telling `user_id` they now own `task`.
    pub fn task_assigned(user_id: Uuid, task: &Task) -> Self {
        Self {
            user_id,
            kind: NotificationType::TaskAssigned,
            data: serde_json::json!({
                "taskId": task.id,
                "title": task.title,
            }),
        }
    }
}
