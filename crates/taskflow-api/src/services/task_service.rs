//! Task mutation service.
//!
//! Every task create/update/delete from the HTTP layer goes through here so
//! that the persisted write, the assignee notification and the live events
//! always happen in the same order:
//!
//! 1. task store write (failure aborts everything after it)
//! 2. notification write for a new assignee (failure is logged, not fatal)
//! 3. targeted `taskAssigned` to the assignee's room
//! 4. global `taskCreated` / `taskUpdated`
//!
//! Event emission never fails a request.

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use taskflow_core::{
    logging, user_room, Error, EventChannel, NewNotification, NewTask, NotificationRepository,
    Result, Task, TaskDraft, TaskEvent, TaskPatch, TaskRepository, TaskWithRelations,
};

/// Applies task mutations and their side effects.
#[derive(Clone)]
pub struct TaskService {
    tasks: Arc<dyn TaskRepository>,
    notifications: Arc<dyn NotificationRepository>,
    events: EventChannel,
    emit_deleted: bool,
}

impl TaskService {
    pub fn new(
        tasks: Arc<dyn TaskRepository>,
        notifications: Arc<dyn NotificationRepository>,
        events: EventChannel,
    ) -> Self {
        Self {
            tasks,
            notifications,
            events,
            emit_deleted: false,
        }
    }

    /// Also emit a global `taskDeleted` after a successful delete.
    pub fn with_delete_events(mut self, enabled: bool) -> Self {
        self.emit_deleted = enabled;
        self
    }

    /// Create a task owned by `actor_id`.
    pub async fn create(&self, actor_id: Uuid, draft: TaskDraft) -> Result<TaskWithRelations> {
        let task = self.tasks.insert(NewTask::from_draft(actor_id, draft)).await?;
        info!(
            subsystem = logging::SUBSYSTEM_TASKS,
            component = logging::COMPONENT_MUTATION,
            op = "create",
            task_id = %task.id,
            user_id = %actor_id,
            assignee = ?task.assigned_to_id,
            "Task created"
        );

        if let Some(assignee) = task.assigned_to_id {
            self.notify_assignee(assignee, &task).await;
        }
        self.events.emit(TaskEvent::Created { id: task.id });

        Ok(self.with_relations(task).await)
    }

    /// Apply `patch` to an existing task.
    ///
    /// Fails with `TaskNotFound` before any write when the task is missing.
    /// The assignee is notified only when the patch names a different,
    /// non-null assignee than the one stored before the write.
    pub async fn update(
        &self,
        actor_id: Uuid,
        task_id: Uuid,
        patch: TaskPatch,
    ) -> Result<TaskWithRelations> {
        let before = self
            .tasks
            .fetch(task_id)
            .await?
            .ok_or(Error::TaskNotFound(task_id))?;
        let assignee_changed = patch.assignee_changed(&before);

        let task = self.tasks.update(task_id, &patch).await?;
        info!(
            subsystem = logging::SUBSYSTEM_TASKS,
            component = logging::COMPONENT_MUTATION,
            op = "update",
            task_id = %task.id,
            user_id = %actor_id,
            version = task.version,
            assignee_changed,
            "Task updated"
        );

        if assignee_changed {
            if let Some(assignee) = task.assigned_to_id {
                self.notify_assignee(assignee, &task).await;
            }
        }
        self.events.emit(TaskEvent::Updated { id: task.id });

        Ok(self.with_relations(task).await)
    }

    /// Permanently delete a task.
    pub async fn delete(&self, actor_id: Uuid, task_id: Uuid) -> Result<()> {
        self.tasks.delete(task_id).await?;
        info!(
            subsystem = logging::SUBSYSTEM_TASKS,
            component = logging::COMPONENT_MUTATION,
            op = "delete",
            task_id = %task_id,
            user_id = %actor_id,
            "Task deleted"
        );
        if self.emit_deleted {
            self.events.emit(TaskEvent::Deleted { id: task_id });
        }
        Ok(())
    }

    async fn notify_assignee(&self, assignee: Uuid, task: &Task) {
        match self
            .notifications
            .insert(NewNotification::task_assigned(assignee, task))
            .await
        {
            Ok(n) => info!(
                subsystem = logging::SUBSYSTEM_TASKS,
                component = logging::COMPONENT_NOTIFIER,
                task_id = %task.id,
                user_id = %assignee,
                notification_id = %n.id,
                "Assignment notification stored"
            ),
            Err(e) => warn!(
                subsystem = logging::SUBSYSTEM_TASKS,
                component = logging::COMPONENT_NOTIFIER,
                task_id = %task.id,
                user_id = %assignee,
                error = %e,
                "Assignment notification not stored"
            ),
        }
        self.events
            .emit_to(&user_room(assignee), TaskEvent::Assigned { task_id: task.id });
    }

    /// Resolve creator/assignee for the response. The write has already
    /// happened, so a failed lookup degrades to the bare task.
    async fn with_relations(&self, task: Task) -> TaskWithRelations {
        match self.tasks.fetch_with_relations(task.id).await {
            Ok(Some(resolved)) => resolved,
            Ok(None) => TaskWithRelations {
                task,
                creator: None,
                assignee: None,
            },
            Err(e) => {
                warn!(
                    subsystem = logging::SUBSYSTEM_TASKS,
                    task_id = %task.id,
                    error = %e,
                    "Relation lookup failed after write"
                );
                TaskWithRelations {
                    task,
                    creator: None,
                    assignee: None,
                }
            }
        }
    }
}
