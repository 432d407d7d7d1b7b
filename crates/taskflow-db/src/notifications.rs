//! Notification repository.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use taskflow_core::{
    new_v7, Error, NewNotification, Notification, NotificationRepository, NotificationType,
    Result,
};

const NOTIFICATION_COLUMNS: &str = "id, user_id, type, data, read, created_at";

/// PostgreSQL notification repository.
#[derive(Clone)]
pub struct PgNotificationRepository {
    pool: Pool<Postgres>,
}

impl PgNotificationRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_row(row: &PgRow) -> Result<Notification> {
        let kind: String = row.get("type");
        Ok(Notification {
            id: row.get("id"),
            user_id: row.get("user_id"),
            kind: kind
                .parse::<NotificationType>()
                .map_err(Error::Serialization)?,
            data: row.get("data"),
            read: row.get("read"),
            created_at: row.get("created_at"),
        })
    }
}

#[async_trait]
impl NotificationRepository for PgNotificationRepository {
    async fn insert(&self, req: NewNotification) -> Result<Notification> {
        let row = sqlx::query(&format!(
            "INSERT INTO notification (id, user_id, type, data, read, created_at)
             VALUES ($1, $2, $3, $4, false, $5)
             RETURNING {}",
            NOTIFICATION_COLUMNS
        ))
        .bind(new_v7())
        .bind(req.user_id)
        .bind(req.kind.to_string())
        .bind(&req.data)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;
        Self::parse_row(&row)
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Notification>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM notification WHERE user_id = $1
             ORDER BY created_at DESC, id DESC",
            NOTIFICATION_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;
        rows.iter().map(Self::parse_row).collect()
    }

    async fn mark_read(&self, id: Uuid, user_id: Uuid) -> Result<Notification> {
        let row = sqlx::query(&format!(
            "UPDATE notification SET read = true
             WHERE id = $1 AND user_id = $2
             RETURNING {}",
            NOTIFICATION_COLUMNS
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;
        match row {
            Some(row) => Self::parse_row(&row),
            None => Err(Error::NotificationNotFound(id)),
        }
    }
}
