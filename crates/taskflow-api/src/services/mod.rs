//! Service layer for business logic.

pub mod task_service;

pub use task_service::TaskService;
