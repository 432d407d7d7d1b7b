//! HTTP handlers for taskflow-api.

pub mod auth;
pub mod live;
pub mod notifications;
pub mod tasks;
pub mod users;
