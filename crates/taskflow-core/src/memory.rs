//! In-memory record store for tests.
//!
//! Implements every repository trait over plain maps, with switches for
//! injecting store failures and counters for asserting that writes did or
//! did not happen.
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use taskflow_core::memory::InMemoryStore;
//! use taskflow_core::TaskRepository;
//!
//! # async fn demo() {
//! let store = InMemoryStore::new();
//! let alice = store.seed_user("alice@example.com", "Alice").await;
//! let tasks: Arc<dyn TaskRepository> = Arc::new(store.clone());
//! # let _ = (alice, tasks);
//! # }
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::*;
use crate::traits::{NotificationRepository, TaskRepository, UserRepository};
use crate::uuid_utils::new_v7;

/// Shared in-memory store. Clones see the same data.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<StoreInner>,
}

#[derive(Default)]
struct StoreInner {
    tasks: RwLock<HashMap<Uuid, Task>>,
    notifications: RwLock<Vec<Notification>>,
    users: RwLock<HashMap<Uuid, User>>,
    task_writes: AtomicUsize,
    fail_task_writes: AtomicBool,
    fail_notifications: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a user with a throwaway password hash.
    pub async fn seed_user(&self, email: &str, name: &str) -> User {
        let now = Utc::now();
        let user = User {
            id: new_v7(),
            email: email.to_string(),
            name: name.to_string(),
            password_hash: String::new(),
            created_at: now,
            updated_at: now,
        };
        self.inner
            .users
            .write()
            .await
            .insert(user.id, user.clone());
        user
    }

    /// Number of successful task inserts, updates and deletes so far.
    pub fn task_write_count(&self) -> usize {
        self.inner.task_writes.load(Ordering::SeqCst)
    }

    /// Make every task write fail with an internal error.
    pub fn set_fail_task_writes(&self, fail: bool) {
        self.inner.fail_task_writes.store(fail, Ordering::SeqCst);
    }

    /// Make notification inserts fail with an internal error.
    pub fn set_fail_notifications(&self, fail: bool) {
        self.inner.fail_notifications.store(fail, Ordering::SeqCst);
    }

    /// Every stored notification, oldest first.
    pub async fn all_notifications(&self) -> Vec<Notification> {
        self.inner.notifications.read().await.clone()
    }

    fn check_task_write(&self) -> Result<()> {
        if self.inner.fail_task_writes.load(Ordering::SeqCst) {
            return Err(Error::Internal("injected task store failure".to_string()));
        }
        Ok(())
    }

    /// Reject an assignee that is not a known user.
    async fn check_assignee(&self, assignee: Option<Uuid>) -> Result<()> {
        match assignee {
            Some(id) if !self.inner.users.read().await.contains_key(&id) => Err(
                Error::InvalidInput(UNKNOWN_ASSIGNEE.to_string()),
            ),
            _ => Ok(()),
        }
    }

    async fn resolve(&self, task: Task) -> TaskWithRelations {
        let users = self.inner.users.read().await;
        let creator = users.get(&task.creator_id).map(UserSummary::from);
        let assignee = task
            .assigned_to_id
            .and_then(|id| users.get(&id))
            .map(UserSummary::from);
        TaskWithRelations {
            task,
            creator,
            assignee,
        }
    }
}

#[async_trait]
impl TaskRepository for InMemoryStore {
    async fn insert(&self, req: NewTask) -> Result<Task> {
        self.check_task_write()?;
        self.check_assignee(req.assigned_to_id).await?;
        let now = Utc::now();
        let task = Task {
            id: new_v7(),
            title: req.title,
            description: req.description,
            due_date: req.due_date,
            priority: req.priority,
            status: req.status,
            creator_id: req.creator_id,
            assigned_to_id: req.assigned_to_id,
            version: 1,
            created_at: now,
            updated_at: now,
        };
        self.inner
            .tasks
            .write()
            .await
            .insert(task.id, task.clone());
        self.inner.task_writes.fetch_add(1, Ordering::SeqCst);
        Ok(task)
    }

    async fn fetch(&self, id: Uuid) -> Result<Option<Task>> {
        Ok(self.inner.tasks.read().await.get(&id).cloned())
    }

    async fn fetch_with_relations(&self, id: Uuid) -> Result<Option<TaskWithRelations>> {
        match TaskRepository::fetch(self, id).await? {
            Some(task) => Ok(Some(self.resolve(task).await)),
            None => Ok(None),
        }
    }

    async fn update(&self, id: Uuid, patch: &TaskPatch) -> Result<Task> {
        self.check_task_write()?;
        self.check_assignee(patch.assigned_to_id.flatten()).await?;
        let mut tasks = self.inner.tasks.write().await;
        let task = tasks.get_mut(&id).ok_or(Error::TaskNotFound(id))?;
        if let Some(expected) = patch.expected_version {
            if task.version != expected {
                return Err(Error::Conflict(format!(
                    "task {} is at version {}, not {}",
                    id, task.version, expected
                )));
            }
        }
        patch.apply_to(task);
        task.version += 1;
        task.updated_at = Utc::now();
        let updated = task.clone();
        drop(tasks);
        self.inner.task_writes.fetch_add(1, Ordering::SeqCst);
        Ok(updated)
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        self.check_task_write()?;
        self.inner
            .tasks
            .write()
            .await
            .remove(&id)
            .ok_or(Error::TaskNotFound(id))?;
        self.inner.task_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn list(&self, filter: &TaskListFilter) -> Result<Vec<TaskWithRelations>> {
        let mut tasks: Vec<Task> = self
            .inner
            .tasks
            .read()
            .await
            .values()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect();
        tasks.sort_by(|a, b| match filter.sort {
            TaskSort::DueDateAsc => a.due_date.cmp(&b.due_date).then(a.id.cmp(&b.id)),
            TaskSort::DueDateDesc => b.due_date.cmp(&a.due_date).then(b.id.cmp(&a.id)),
        });
        let mut out = Vec::with_capacity(tasks.len());
        for task in tasks {
            out.push(self.resolve(task).await);
        }
        Ok(out)
    }
}

#[async_trait]
impl NotificationRepository for InMemoryStore {
    async fn insert(&self, req: NewNotification) -> Result<Notification> {
        if self.inner.fail_notifications.load(Ordering::SeqCst) {
            return Err(Error::Internal(
                "injected notification store failure".to_string(),
            ));
        }
        let notification = Notification {
            id: new_v7(),
            user_id: req.user_id,
            kind: req.kind,
            data: req.data,
            read: false,
            created_at: Utc::now(),
        };
        self.inner
            .notifications
            .write()
            .await
            .push(notification.clone());
        Ok(notification)
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Notification>> {
        let mut list: Vec<Notification> = self
            .inner
            .notifications
            .read()
            .await
            .iter()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(list)
    }

    async fn mark_read(&self, id: Uuid, user_id: Uuid) -> Result<Notification> {
        let mut notifications = self.inner.notifications.write().await;
        let notification = notifications
            .iter_mut()
            .find(|n| n.id == id && n.user_id == user_id)
            .ok_or(Error::NotificationNotFound(id))?;
        notification.read = true;
        Ok(notification.clone())
    }
}

#[async_trait]
impl UserRepository for InMemoryStore {
    async fn insert(&self, req: NewUser) -> Result<User> {
        let mut users = self.inner.users.write().await;
        if users
            .values()
            .any(|u| u.email.eq_ignore_ascii_case(&req.email))
        {
            return Err(Error::Conflict("Email already in use".to_string()));
        }
        let now = Utc::now();
        let user = User {
            id: new_v7(),
            email: req.email,
            name: req.name,
            password_hash: req.password_hash,
            created_at: now,
            updated_at: now,
        };
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn fetch(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.inner.users.read().await.get(&id).cloned())
    }

    async fn fetch_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self
            .inner
            .users
            .read()
            .await
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn update_name(&self, id: Uuid, name: &str) -> Result<User> {
        let mut users = self.inner.users.write().await;
        let user = users
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("user {}", id)))?;
        user.name = name.to_string();
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn list(&self) -> Result<Vec<UserSummary>> {
        let mut users: Vec<UserSummary> = self
            .inner
            .users
            .read()
            .await
            .values()
            .map(UserSummary::from)
            .collect();
        users.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(users)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn new_task(creator: Uuid, due_in_days: i64) -> NewTask {
        NewTask {
            title: format!("due in {}", due_in_days),
            description: "d".to_string(),
            due_date: Utc::now() + Duration::days(due_in_days),
            priority: Priority::Medium,
            status: TaskStatus::Todo,
            creator_id: creator,
            assigned_to_id: None,
        }
    }

    #[tokio::test]
    async fn test_insert_and_fetch_with_relations() {
        let store = InMemoryStore::new();
        let alice = store.seed_user("alice@example.com", "Alice").await;
        let bob = store.seed_user("bob@example.com", "Bob").await;

        let mut req = new_task(alice.id, 1);
        req.assigned_to_id = Some(bob.id);
        let task = TaskRepository::insert(&store, req).await.unwrap();
        assert_eq!(task.version, 1);

        let with = store.fetch_with_relations(task.id).await.unwrap().unwrap();
        assert_eq!(with.creator.unwrap().name, "Alice");
        assert_eq!(with.assignee.unwrap().name, "Bob");
        assert_eq!(store.task_write_count(), 1);
    }

    #[tokio::test]
    async fn test_update_checks_version() {
        let store = InMemoryStore::new();
        let task = TaskRepository::insert(&store, new_task(Uuid::nil(), 1))
            .await
            .unwrap();

        let patch = TaskPatch {
            title: Some("renamed".to_string()),
            expected_version: Some(1),
            ..Default::default()
        };
        let updated = store.update(task.id, &patch).await.unwrap();
        assert_eq!(updated.version, 2);

        let err = store.update(task.id, &patch).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[tokio::test]
    async fn test_update_and_delete_missing() {
        let store = InMemoryStore::new();
        let id = Uuid::from_u128(5);
        assert!(matches!(
            store.update(id, &TaskPatch::default()).await,
            Err(Error::TaskNotFound(_))
        ));
        assert!(matches!(
            store.delete(id).await,
            Err(Error::TaskNotFound(_))
        ));
        assert_eq!(store.task_write_count(), 0);
    }

    #[tokio::test]
    async fn test_list_sorts_by_due_date() {
        let store = InMemoryStore::new();
        for days in [3, 1, 2] {
            TaskRepository::insert(&store, new_task(Uuid::nil(), days))
                .await
                .unwrap();
        }
        let asc = TaskRepository::list(&store, &TaskListFilter::default())
            .await
            .unwrap();
        let titles: Vec<_> = asc.iter().map(|t| t.task.title.as_str()).collect();
        assert_eq!(titles, vec!["due in 1", "due in 2", "due in 3"]);

        let desc = TaskRepository::list(
            &store,
            &TaskListFilter {
                sort: TaskSort::DueDateDesc,
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(desc[0].task.title, "due in 3");
    }

    #[tokio::test]
    async fn test_list_overdue() {
        let store = InMemoryStore::new();
        TaskRepository::insert(&store, new_task(Uuid::nil(), -1))
            .await
            .unwrap();
        TaskRepository::insert(&store, new_task(Uuid::nil(), 1))
            .await
            .unwrap();
        let overdue = TaskRepository::list(
            &store,
            &TaskListFilter {
                due_before: Some(Utc::now()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(overdue.len(), 1);
        assert_eq!(overdue[0].task.title, "due in -1");
    }

    #[tokio::test]
    async fn test_mark_read_idempotent_and_scoped() {
        let store = InMemoryStore::new();
        let owner = Uuid::from_u128(1);
        let n = NotificationRepository::insert(
            &store,
            NewNotification {
                user_id: owner,
                kind: NotificationType::TaskAssigned,
                data: serde_json::json!({}),
            },
        )
        .await
        .unwrap();
        assert!(!n.read);

        assert!(store.mark_read(n.id, owner).await.unwrap().read);
        assert!(store.mark_read(n.id, owner).await.unwrap().read);

        let err = store.mark_read(n.id, Uuid::from_u128(2)).await.unwrap_err();
        assert!(matches!(err, Error::NotificationNotFound(_)));
    }

    #[tokio::test]
    async fn test_duplicate_email_conflicts() {
        let store = InMemoryStore::new();
        let req = NewUser {
            email: "a@example.com".to_string(),
            name: "A".to_string(),
            password_hash: "h".to_string(),
        };
        UserRepository::insert(&store, req.clone()).await.unwrap();
        let mut upper = req;
        upper.email = "A@Example.com".to_string();
        assert!(matches!(
            UserRepository::insert(&store, upper).await,
            Err(Error::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let store = InMemoryStore::new();
        store.set_fail_task_writes(true);
        assert!(TaskRepository::insert(&store, new_task(Uuid::nil(), 1))
            .await
            .is_err());

        store.set_fail_notifications(true);
        let res = NotificationRepository::insert(
            &store,
            NewNotification {
                user_id: Uuid::nil(),
                kind: NotificationType::TaskAssigned,
                data: serde_json::json!({}),
            },
        )
        .await;
        assert!(res.is_err());
        assert!(store.all_notifications().await.is_empty());
    }

    #[tokio::test]
    async fn test_list_breaks_due_date_ties_by_id() {
        let store = InMemoryStore::new();
        let due = Utc.with_ymd_and_hms(2030, 1, 1, 10, 0, 0).unwrap();
        let mut ids = Vec::new();
        for _ in 0..4 {
            let mut req = new_task(Uuid::nil(), 0);
            req.due_date = due;
            ids.push(TaskRepository::insert(&store, req).await.unwrap().id);
        }
        ids.sort();

        let asc: Vec<Uuid> = TaskRepository::list(&store, &TaskListFilter::default())
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.task.id)
            .collect();
        assert_eq!(asc, ids);

        let desc: Vec<Uuid> = TaskRepository::list(
            &store,
            &TaskListFilter {
                sort: TaskSort::DueDateDesc,
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.task.id)
        .collect();
        ids.reverse();
        assert_eq!(desc, ids);
    }

    #[tokio::test]
    async fn test_unknown_assignee_is_rejected_without_write() {
        let store = InMemoryStore::new();
        let alice = store.seed_user("alice@example.com", "Alice").await;

        let mut req = new_task(alice.id, 1);
        req.assigned_to_id = Some(Uuid::now_v7());
        assert!(matches!(
            TaskRepository::insert(&store, req).await,
            Err(Error::InvalidInput(msg)) if msg == UNKNOWN_ASSIGNEE
        ));
        assert_eq!(store.task_write_count(), 0);

        let task = TaskRepository::insert(&store, new_task(alice.id, 1))
            .await
            .unwrap();
        let patch = TaskPatch {
            assigned_to_id: Some(Some(Uuid::now_v7())),
            ..Default::default()
        };
        assert!(matches!(
            TaskRepository::update(&store, task.id, &patch).await,
            Err(Error::InvalidInput(_))
        ));
        let stored = TaskRepository::fetch(&store, task.id).await.unwrap().unwrap();
        assert_eq!(stored.version, 1);
        assert!(stored.assigned_to_id.is_none());
    }
}
