//! # taskflow-core
//!
//! Core types, traits, and the live event channel for taskflow.
//!
//! This crate provides the data model, the record-store traits that the
//! database and in-memory backends implement, and the room-aware event
//! channel that the API fans task changes out through.

pub mod error;
pub mod events;
pub mod logging;
pub mod memory;
pub mod models;
pub mod traits;
pub mod uuid_utils;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use events::{
    user_room, EventChannel, EventEnvelope, SubscriberId, Subscription, TaskEvent, TASKS_ROOM,
};
pub use memory::InMemoryStore;
pub use models::*;
pub use traits::*;
pub use uuid_utils::new_v7;
