//! # taskflow-db
//!
//! PostgreSQL record store for taskflow.
//!
//! This crate provides:
//! - Connection pool management
//! - Task, notification and user repositories implementing the
//!   `taskflow-core` traits
//! - Embedded migrations (behind the `migrations` feature)
//!
//! ## Example
//!
//! ```rust,ignore
//! use taskflow_db::Database;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/taskflow").await?;
//!     db.migrate().await?;
//!     let users = db.users.list().await?;
//!     println!("{} users", users.len());
//!     Ok(())
//! }
//! ```

pub mod notifications;
pub mod pool;
pub mod tasks;
pub mod users;

// Always compiled so integration tests in tests/ can reach it.
pub mod test_fixtures;

// Re-export core types
pub use taskflow_core::*;

pub use notifications::PgNotificationRepository;
pub use pool::{create_pool, create_pool_with_config, log_pool_metrics, PoolConfig};
pub use tasks::PgTaskRepository;
pub use users::PgUserRepository;

/// Combined database context with all repositories.
#[derive(Clone)]
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    pub tasks: PgTaskRepository,
    pub notifications: PgNotificationRepository,
    pub users: PgUserRepository,
}

impl Database {
    /// Build repositories over an existing pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            tasks: PgTaskRepository::new(pool.clone()),
            notifications: PgNotificationRepository::new(pool.clone()),
            users: PgUserRepository::new(pool.clone()),
            pool,
        }
    }

    /// Connect with the default pool configuration.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool))
    }

    /// Connect with a custom pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }
}
