//! Structured logging conventions for taskflow.
//!
//! Every crate tags its log events with the same `subsystem` / `component`
//! / `op` values so log aggregation can slice by area. Entity fields use
//! `task_id`, `user_id`, `notification_id`, `event` and `room`.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue, side effect skipped (e.g. notification write failed) |
//! | INFO  | Lifecycle events (startup, shutdown, connections), mutations |
//! | DEBUG | Event emission, room membership, config choices |
//! | TRACE | Per-row iteration |

// ─── Subsystems ────────────────────────────────────────────────────────────

/// HTTP handlers and live transports.
pub const SUBSYSTEM_API: &str = "api";

/// Record store.
pub const SUBSYSTEM_DB: &str = "db";

/// Task mutation and side effects.
pub const SUBSYSTEM_TASKS: &str = "tasks";

// ─── Components ────────────────────────────────────────────────────────────

/// Connection pool.
pub const COMPONENT_POOL: &str = "pool";

/// Mutation service.
pub const COMPONENT_MUTATION: &str = "mutation";

/// Notification writer.
pub const COMPONENT_NOTIFIER: &str = "notifier";

/// WebSocket transport.
pub const COMPONENT_WS: &str = "ws";

/// Server-sent events transport.
pub const COMPONENT_SSE: &str = "sse";

/// Authentication.
pub const COMPONENT_AUTH: &str = "auth";
