//! Task repository.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use tracing::debug;
use uuid::Uuid;

use taskflow_core::{
    logging, new_v7, Error, NewTask, Priority, Result, Task, TaskListFilter, TaskPatch,
    TaskRepository, TaskSort, TaskStatus, TaskWithRelations, UserSummary, UNKNOWN_ASSIGNEE,
};

const TASK_COLUMNS: &str = "t.id, t.title, t.description, t.due_date, t.priority, t.status,
    t.creator_id, t.assigned_to_id, t.version, t.created_at, t.updated_at";

const RELATION_COLUMNS: &str = "c.email AS creator_email, c.name AS creator_name,
    a.email AS assignee_email, a.name AS assignee_name";

const RELATION_JOINS: &str = "LEFT JOIN app_user c ON c.id = t.creator_id
    LEFT JOIN app_user a ON a.id = t.assigned_to_id";

/// Postgres foreign_key_violation.
const FOREIGN_KEY_VIOLATION: &str = "23503";

/// Map a task write failure; a dangling user reference is the caller's fault.
fn write_error(e: sqlx::Error) -> Error {
    match e {
        sqlx::Error::Database(db) if db.code().as_deref() == Some(FOREIGN_KEY_VIOLATION) => {
            Error::InvalidInput(UNKNOWN_ASSIGNEE.to_string())
        }
        other => Error::Database(other),
    }
}

/// PostgreSQL task repository.
#[derive(Clone)]
pub struct PgTaskRepository {
    pool: Pool<Postgres>,
}

impl PgTaskRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_task(row: &PgRow) -> Result<Task> {
        let priority: String = row.get("priority");
        let status: String = row.get("status");
        Ok(Task {
            id: row.get("id"),
            title: row.get("title"),
            description: row.get("description"),
            due_date: row.get("due_date"),
            priority: priority.parse::<Priority>().map_err(Error::Serialization)?,
            status: status.parse::<TaskStatus>().map_err(Error::Serialization)?,
            creator_id: row.get("creator_id"),
            assigned_to_id: row.get("assigned_to_id"),
            version: row.get("version"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }

    fn parse_with_relations(row: &PgRow) -> Result<TaskWithRelations> {
        let task = Self::parse_task(row)?;
        let creator = summary(
            Some(task.creator_id),
            row.get("creator_email"),
            row.get("creator_name"),
        );
        let assignee = summary(
            task.assigned_to_id,
            row.get("assignee_email"),
            row.get("assignee_name"),
        );
        Ok(TaskWithRelations {
            task,
            creator,
            assignee,
        })
    }

    async fn exists(&self, id: Uuid) -> Result<bool> {
        let row = sqlx::query("SELECT 1 AS one FROM task WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(row.is_some())
    }
}

fn summary(id: Option<Uuid>, email: Option<String>, name: Option<String>) -> Option<UserSummary> {
    match (id, email, name) {
        (Some(id), Some(email), Some(name)) => Some(UserSummary { id, email, name }),
        _ => None,
    }
}

#[async_trait]
impl TaskRepository for PgTaskRepository {
    async fn insert(&self, req: NewTask) -> Result<Task> {
        let id = new_v7();
        let now = Utc::now();
        let row = sqlx::query(&format!(
            "INSERT INTO task AS t (id, title, description, due_date, priority, status,
                                    creator_id, assigned_to_id, version, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 1, $9, $9)
             RETURNING {}",
            TASK_COLUMNS
        ))
        .bind(id)
        .bind(&req.title)
        .bind(&req.description)
        .bind(req.due_date)
        .bind(req.priority.to_string())
        .bind(req.status.to_string())
        .bind(req.creator_id)
        .bind(req.assigned_to_id)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(write_error)?;

        debug!(
            subsystem = logging::SUBSYSTEM_DB,
            task_id = %id,
            "Inserted task"
        );
        Self::parse_task(&row)
    }

    async fn fetch(&self, id: Uuid) -> Result<Option<Task>> {
        let row = sqlx::query(&format!("SELECT {} FROM task t WHERE t.id = $1", TASK_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;
        row.as_ref().map(Self::parse_task).transpose()
    }

    async fn fetch_with_relations(&self, id: Uuid) -> Result<Option<TaskWithRelations>> {
        let row = sqlx::query(&format!(
            "SELECT {}, {} FROM task t {} WHERE t.id = $1",
            TASK_COLUMNS, RELATION_COLUMNS, RELATION_JOINS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;
        row.as_ref().map(Self::parse_with_relations).transpose()
    }

    async fn update(&self, id: Uuid, patch: &TaskPatch) -> Result<Task> {
        let now = Utc::now();
        let set_assignee = patch.assigned_to_id.is_some();
        let assignee = patch.assigned_to_id.flatten();

        let row = sqlx::query(&format!(
            "UPDATE task AS t SET
                title = COALESCE($2, t.title),
                description = COALESCE($3, t.description),
                due_date = COALESCE($4, t.due_date),
                priority = COALESCE($5, t.priority),
                status = COALESCE($6, t.status),
                assigned_to_id = CASE WHEN $7::boolean THEN $8::uuid ELSE t.assigned_to_id END,
                version = t.version + 1,
                updated_at = $9
             WHERE t.id = $1 AND ($10::integer IS NULL OR t.version = $10)
             RETURNING {}",
            TASK_COLUMNS
        ))
        .bind(id)
        .bind(patch.title.as_deref())
        .bind(patch.description.as_deref())
        .bind(patch.due_date)
        .bind(patch.priority.map(|p| p.to_string()))
        .bind(patch.status.map(|s| s.to_string()))
        .bind(set_assignee)
        .bind(assignee)
        .bind(now)
        .bind(patch.expected_version)
        .fetch_optional(&self.pool)
        .await
        .map_err(write_error)?;

        match row {
            Some(row) => Self::parse_task(&row),
            None if self.exists(id).await? => Err(Error::Conflict(format!(
                "task {} changed since version {}",
                id,
                patch.expected_version.unwrap_or_default()
            ))),
            None => Err(Error::TaskNotFound(id)),
        }
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM task WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        if result.rows_affected() == 0 {
            return Err(Error::TaskNotFound(id));
        }
        Ok(())
    }

    async fn list(&self, filter: &TaskListFilter) -> Result<Vec<TaskWithRelations>> {
        let order = match filter.sort {
            TaskSort::DueDateAsc => "t.due_date ASC, t.id ASC",
            TaskSort::DueDateDesc => "t.due_date DESC, t.id DESC",
        };
        let rows = sqlx::query(&format!(
            "SELECT {}, {} FROM task t {}
             WHERE ($1::text IS NULL OR t.status = $1)
               AND ($2::text IS NULL OR t.priority = $2)
               AND ($3::uuid IS NULL OR t.assigned_to_id = $3)
               AND ($4::uuid IS NULL OR t.creator_id = $4)
               AND ($5::timestamptz IS NULL OR t.due_date < $5)
             ORDER BY {}",
            TASK_COLUMNS, RELATION_COLUMNS, RELATION_JOINS, order
        ))
        .bind(filter.status.map(|s| s.to_string()))
        .bind(filter.priority.map(|p| p.to_string()))
        .bind(filter.assigned_to)
        .bind(filter.created_by)
        .bind(filter.due_before)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(Self::parse_with_relations).collect()
    }
}
