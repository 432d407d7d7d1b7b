//! User repository.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use taskflow_core::{new_v7, Error, NewUser, Result, User, UserRepository, UserSummary};

const USER_COLUMNS: &str = "id, email, name, password_hash, created_at, updated_at";

/// Postgres unique_violation.
const UNIQUE_VIOLATION: &str = "23505";

/// PostgreSQL user repository.
#[derive(Clone)]
pub struct PgUserRepository {
    pool: Pool<Postgres>,
}

impl PgUserRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_row(row: &PgRow) -> User {
        User {
            id: row.get("id"),
            email: row.get("email"),
            name: row.get("name"),
            password_hash: row.get("password_hash"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn insert(&self, req: NewUser) -> Result<User> {
        let now = Utc::now();
        let result = sqlx::query(&format!(
            "INSERT INTO app_user (id, email, name, password_hash, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $5)
             RETURNING {}",
            USER_COLUMNS
        ))
        .bind(new_v7())
        .bind(&req.email)
        .bind(&req.name)
        .bind(&req.password_hash)
        .bind(now)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(row) => Ok(Self::parse_row(&row)),
            Err(sqlx::Error::Database(e)) if e.code().as_deref() == Some(UNIQUE_VIOLATION) => {
                Err(Error::Conflict("Email already in use".to_string()))
            }
            Err(e) => Err(Error::Database(e)),
        }
    }

    async fn fetch(&self, id: Uuid) -> Result<Option<User>> {
        let row = sqlx::query(&format!("SELECT {} FROM app_user WHERE id = $1", USER_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(row.as_ref().map(Self::parse_row))
    }

    async fn fetch_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM app_user WHERE LOWER(email) = LOWER($1)",
            USER_COLUMNS
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(row.as_ref().map(Self::parse_row))
    }

    async fn update_name(&self, id: Uuid, name: &str) -> Result<User> {
        let row = sqlx::query(&format!(
            "UPDATE app_user SET name = $2, updated_at = $3 WHERE id = $1 RETURNING {}",
            USER_COLUMNS
        ))
        .bind(id)
        .bind(name)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;
        row.as_ref()
            .map(Self::parse_row)
            .ok_or_else(|| Error::NotFound(format!("user {}", id)))
    }

    async fn list(&self) -> Result<Vec<UserSummary>> {
        let rows = sqlx::query("SELECT id, email, name FROM app_user ORDER BY name, id")
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(rows
            .iter()
            .map(|r| UserSummary {
                id: r.get("id"),
                email: r.get("email"),
                name: r.get("name"),
            })
            .collect())
    }
}
