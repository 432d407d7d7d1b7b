//! User directory handlers.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use taskflow_core::UserSummary;

use crate::auth::AuthUser;
use crate::request_types::{UpdateNameRequest, MAX_PROFILE_NAME_LEN};
use crate::{ApiError, AppState};

/// Everyone who can be picked as an assignee.
pub async fn list_users(
    State(state): State<AppState>,
    _auth: AuthUser,
) -> Result<Json<Value>, ApiError> {
    let users = state.users.list().await?;
    Ok(Json(json!({ "users": users })))
}

/// Change the caller's display name (1-50 characters).
pub async fn update_me(
    State(state): State<AppState>,
    auth: AuthUser,
    body: Result<Json<UpdateNameRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(req) = body?;
    req.validate(MAX_PROFILE_NAME_LEN)?;
    let user = state.users.update_name(auth.id, req.name.trim()).await?;
    Ok(Json(json!({ "user": UserSummary::from(user) })))
}
