//! Server configuration read from the environment.
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | `HOST` | `0.0.0.0` | Bind address |
//! | `PORT` | `8080` | Bind port |
//! | `DATABASE_URL` | `postgres://localhost/taskflow` | Postgres connection string |
//! | `JWT_SECRET` | required | HS256 signing secret |
//! | `CORS_ORIGINS` / `CLIENT_ORIGIN` | `http://localhost:5173` | Comma-separated allowed origins |
//! | `COOKIE_SECURE` | `false` | Set `Secure` on the auth cookie |
//! | `COOKIE_SAMESITE` | `lax` | `lax`, `strict` or `none` |
//! | `EVENT_BUFFER` | `256` | Per-subscriber live event queue bound |
//! | `TASK_DELETED_EVENTS` | `false` | Emit `taskDeleted` on delete |
//! | `DB_MAX_CONNECTIONS` | `10` | Pool size |

use taskflow_core::events::DEFAULT_SUBSCRIBER_BUFFER;
use taskflow_core::{Error, Result};

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_ORIGIN: &str = "http://localhost:5173";

/// `SameSite` attribute for the auth cookie.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SameSite {
    #[default]
    Lax,
    Strict,
    None,
}

impl SameSite {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lax => "Lax",
            Self::Strict => "Strict",
            Self::None => "None",
        }
    }
}

impl std::str::FromStr for SameSite {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "lax" => Ok(Self::Lax),
            "strict" => Ok(Self::Strict),
            "none" => Ok(Self::None),
            _ => Err(format!("Invalid SameSite value: {}", s)),
        }
    }
}

/// Runtime configuration for the API server.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub jwt_secret: String,
    pub cors_origins: Vec<String>,
    pub cookie_secure: bool,
    pub cookie_same_site: SameSite,
    pub event_buffer: usize,
    pub task_deleted_events: bool,
    pub db_max_connections: u32,
}

impl ApiConfig {
    /// Read configuration from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let jwt_secret = get("JWT_SECRET")
            .ok_or_else(|| Error::Config("JWT_SECRET must be set".to_string()))?;

        let port = match get("PORT") {
            Some(v) => v
                .trim()
                .parse()
                .map_err(|_| Error::Config(format!("PORT is not a valid port: {}", v)))?,
            None => DEFAULT_PORT,
        };

        let cookie_same_site = match get("COOKIE_SAMESITE") {
            Some(v) => v.parse().map_err(Error::Config)?,
            None => SameSite::default(),
        };

        let event_buffer = match get("EVENT_BUFFER") {
            Some(v) => v
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| Error::Config(format!("EVENT_BUFFER must be > 0: {}", v)))?,
            None => DEFAULT_SUBSCRIBER_BUFFER,
        };

        let db_max_connections = match get("DB_MAX_CONNECTIONS") {
            Some(v) => v
                .trim()
                .parse()
                .map_err(|_| Error::Config(format!("DB_MAX_CONNECTIONS is invalid: {}", v)))?,
            None => taskflow_db::pool::DEFAULT_MAX_CONNECTIONS,
        };

        let origins = get("CORS_ORIGINS")
            .or_else(|| get("CLIENT_ORIGIN"))
            .unwrap_or_else(|| DEFAULT_ORIGIN.to_string());

        Ok(Self {
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port,
            database_url: get("DATABASE_URL")
                .unwrap_or_else(|| "postgres://localhost/taskflow".to_string()),
            jwt_secret,
            cors_origins: parse_origins(&origins),
            cookie_secure: get("COOKIE_SECURE").map(|v| parse_bool(&v)).unwrap_or(false),
            cookie_same_site,
            event_buffer,
            task_deleted_events: get("TASK_DELETED_EVENTS")
                .map(|v| parse_bool(&v))
                .unwrap_or(false),
            db_max_connections,
        })
    }
}

fn parse_bool(v: &str) -> bool {
    matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

fn parse_origins(s: &str) -> Vec<String> {
    s.split(',')
        .map(|o| o.trim().trim_end_matches('/'))
        .filter(|o| !o.is_empty())
        .map(str::to_string)
        .collect()
}
