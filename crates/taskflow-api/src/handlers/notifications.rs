//! Notification HTTP handlers. Callers only ever see their own notifications.

use axum::extract::rejection::PathRejection;
use axum::extract::{Path, State};
use axum::Json;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::{ApiError, AppState};

pub async fn list_notifications(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Value>, ApiError> {
    let notifications = state.notifications.list_for_user(auth.id).await?;
    Ok(Json(json!({ "notifications": notifications })))
}

/// Mark one of the caller's notifications read. Repeating the call is a no-op;
/// another user's notification is reported as not found.
pub async fn mark_notification_read(
    State(state): State<AppState>,
    auth: AuthUser,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Value>, ApiError> {
    let Path(id) = id?;
    let notification = state.notifications.mark_read(id, auth.id).await?;
    Ok(Json(json!({ "notification": notification })))
}
