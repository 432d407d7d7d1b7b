//! Task HTTP handlers.
//!
//! Reads go straight to the task store; every mutation goes through
//! [`TaskService`](crate::services::TaskService) so notifications and live
//! events follow the write.

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::request_types::{CreateTaskRequest, TaskListQuery, UpdateTaskRequest};
use crate::{ApiError, AppState};

/// List tasks visible through the requested view.
///
/// # Query Parameters
/// - `view`: `assigned` (to me), `created` (by me) or `overdue`
/// - `status`, `priority`: exact-match filters
/// - `sort`: `dueDateAsc` (default) or `dueDateDesc`
pub async fn list_tasks(
    State(state): State<AppState>,
    auth: AuthUser,
    query: Result<Query<TaskListQuery>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let Query(query) = query?;
    let filter = query.to_filter(auth.id, Utc::now());
    let tasks = state.tasks.list(&filter).await?;
    Ok(Json(json!({ "tasks": tasks })))
}

/// Create a task owned by the caller.
///
/// # Returns
/// - 201 Created with `{ "task": ... }`
/// - 400 Bad Request on validation failure
pub async fn create_task(
    State(state): State<AppState>,
    auth: AuthUser,
    body: Result<Json<CreateTaskRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let Json(req) = body?;
    let draft = req.into_draft()?;
    let task = state.task_service.create(auth.id, draft).await?;
    Ok((StatusCode::CREATED, Json(json!({ "task": task }))))
}

pub async fn get_task(
    State(state): State<AppState>,
    _auth: AuthUser,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Value>, ApiError> {
    let Path(id) = id?;
    let task = state
        .tasks
        .fetch_with_relations(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Task not found".to_string()))?;
    Ok(Json(json!({ "task": task })))
}

/// Apply a partial update.
///
/// A `version` field in the body makes the write conditional on the task
/// still being at that version (409 otherwise).
pub async fn update_task(
    State(state): State<AppState>,
    auth: AuthUser,
    id: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<UpdateTaskRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Path(id) = id?;
    let Json(req) = body?;
    let patch = req.into_patch()?;
    let task = state.task_service.update(auth.id, id, patch).await?;
    Ok(Json(json!({ "task": task })))
}

pub async fn delete_task(
    State(state): State<AppState>,
    auth: AuthUser,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    let Path(id) = id?;
    state.task_service.delete(auth.id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
