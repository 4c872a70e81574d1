use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use tracing::info;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::identity::{self, AuthUser};
use crate::models::UserDto;
use crate::state::AppState;

fn validation_error(e: validator::ValidationErrors) -> AppError {
    AppError::InvalidInput(
        e.field_errors()
            .values()
            .flat_map(|v| v.iter())
            .filter_map(|e| e.message.as_ref())
            .map(|m| m.to_string())
            .collect::<Vec<_>>()
            .join(", "),
    )
}

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 3, max = 32))]
    pub handle: String,
    #[validate(email)]
    pub email: Option<String>,
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    pub handle: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserDto,
}

/// Registers a new account. The password policy (length + digit +
/// punctuation) is enforced in `identity::check_password_strength` since it
/// crosses fields `validator`'s derive macros don't express directly.
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    req.validate().map_err(validation_error)?;
    identity::check_password_strength(&req.password)?;

    if state.store.find_user_by_handle(&req.handle).await?.is_some() {
        return Err(AppError::Conflict("Handle already taken".into()));
    }

    let password_hash = identity::hash_password(&req.password)?;
    let user = state
        .store
        .create_user(&req.handle, req.email.as_deref(), &password_hash)
        .await?;

    info!(user_id = %user.id, handle = %user.handle, "user registered");

    let token = identity::mint_token(
        user.id,
        &user.handle,
        user.role(),
        &state.config.jwt_secret,
        state.config.token_ttl,
    )?;

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            token,
            user: user.into(),
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    req.validate().map_err(validation_error)?;

    let user = state
        .store
        .find_user_by_handle(&req.handle)
        .await?
        .ok_or(AppError::InvalidCredentials)?;

    if !identity::verify_password(&req.password, &user.password_hash)? {
        return Err(AppError::InvalidCredentials);
    }

    info!(user_id = %user.id, "login succeeded");

    let token = identity::mint_token(
        user.id,
        &user.handle,
        user.role(),
        &state.config.jwt_secret,
        state.config.token_ttl,
    )?;

    Ok(Json(AuthResponse {
        token,
        user: user.into(),
    }))
}

/// Logs in as the shared guest identity, gated on both the
/// `guest-mode-enabled` and `auto-login-enabled` Settings. All guest
/// sessions share one account row rather than minting one per session;
/// see DESIGN.md for the rationale.
pub async fn guest_login(State(state): State<AppState>) -> AppResult<Json<AuthResponse>> {
    let is_enabled = |v: Option<String>| v.map(|v| v == "true").unwrap_or(false);

    let guest_mode = is_enabled(state.store.get_setting("guest-mode-enabled").await?);
    let auto_login = is_enabled(state.store.get_setting("auto-login-enabled").await?);

    if !guest_mode || !auto_login {
        return Err(AppError::NotAuthorized("Guest access is disabled".into()));
    }

    let default_handle = state
        .store
        .get_setting("default-handle")
        .await?
        .unwrap_or_else(|| "guest".to_string());

    let user = state
        .store
        .find_user_by_handle(&default_handle)
        .await?
        .ok_or(AppError::Internal)?;

    let token = identity::mint_token(
        user.id,
        &user.handle,
        user.role(),
        &state.config.jwt_secret,
        state.config.token_ttl,
    )?;

    Ok(Json(AuthResponse {
        token,
        user: user.into(),
    }))
}

pub async fn me(State(state): State<AppState>, auth_user: AuthUser) -> AppResult<Json<UserDto>> {
    let user = state.store.require_user(auth_user.user_id).await?;
    Ok(Json(user.into()))
}
