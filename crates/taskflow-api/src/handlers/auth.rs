//! Account and session handlers.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{AppendHeaders, IntoResponse};
use axum::Json;
use serde_json::json;

use taskflow_core::{logging, NewUser, UserSummary, MAX_USER_NAME_LEN};

use crate::auth::{hash_password, verify_password, AuthUser, MaybeAuth};
use crate::request_types::{LoginRequest, RegisterRequest, UpdateNameRequest};
use crate::{ApiError, AppState};

const INVALID_CREDENTIALS: &str = "Invalid credentials";

/// Create an account.
///
/// # Returns
/// - 201 Created with `{ id, email, name }`
/// - 400 Bad Request on validation failure
/// - 409 Conflict if the email is taken
pub async fn register(
    State(state): State<AppState>,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<UserSummary>), ApiError> {
    let Json(req) = body?;
    req.validate()?;

    let email = req.email.trim().to_string();
    if state.users.fetch_by_email(&email).await?.is_some() {
        return Err(ApiError::Conflict("Email already in use".to_string()));
    }
    let user = state
        .users
        .insert(NewUser {
            email,
            name: req.name.trim().to_string(),
            password_hash: hash_password(&req.password)?,
        })
        .await?;

    tracing::info!(
        subsystem = logging::SUBSYSTEM_API,
        component = logging::COMPONENT_AUTH,
        user_id = %user.id,
        "User registered"
    );
    Ok((StatusCode::CREATED, Json(UserSummary::from(user))))
}

/// Check credentials and start a session.
///
/// The token is set as an HttpOnly cookie and also returned in the body for
/// clients that send `Authorization: Bearer`.
pub async fn login(
    State(state): State<AppState>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = body?;
    let user = state
        .users
        .fetch_by_email(req.email.trim())
        .await?
        .filter(|u| verify_password(&req.password, &u.password_hash))
        .ok_or_else(|| {
            tracing::info!(
                subsystem = logging::SUBSYSTEM_API,
                component = logging::COMPONENT_AUTH,
                "Login rejected"
            );
            ApiError::Unauthorized(INVALID_CREDENTIALS.to_string())
        })?;

    let token = state.auth.issue_token(user.id)?;
    let cookie = state.auth.session_cookie(&token);
    tracing::info!(
        subsystem = logging::SUBSYSTEM_API,
        component = logging::COMPONENT_AUTH,
        user_id = %user.id,
        "User logged in"
    );
    Ok((
        AppendHeaders([(header::SET_COOKIE, cookie)]),
        Json(json!({ "user": UserSummary::from(user), "token": token })),
    ))
}

pub async fn logout(State(state): State<AppState>) -> impl IntoResponse {
    (
        AppendHeaders([(header::SET_COOKIE, state.auth.clear_cookie())]),
        Json(json!({ "ok": true })),
    )
}

/// The caller's account, or 401 when the session is missing or stale.
pub async fn me(
    State(state): State<AppState>,
    auth: MaybeAuth,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Some(user_id) = auth.0 else {
        return Err(ApiError::Unauthorized("Not authenticated".to_string()));
    };
    let user = state
        .users
        .fetch(user_id)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Session invalid".to_string()))?;
    Ok(Json(json!({ "user": user })))
}

pub async fn update_profile(
    State(state): State<AppState>,
    auth: AuthUser,
    body: Result<Json<UpdateNameRequest>, JsonRejection>,
) -> Result<Json<UserSummary>, ApiError> {
    let Json(req) = body?;
    req.validate(MAX_USER_NAME_LEN)?;
    let user = state.users.update_name(auth.id, req.name.trim()).await?;
    Ok(Json(UserSummary::from(user)))
}
