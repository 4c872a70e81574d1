use axum::extract::State;
use axum::{http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::identity;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct FirstTimeResponse {
    pub first_time: bool,
}

/// Whether this Store has ever had an account created. Callers use this to
/// decide whether to show a bootstrap flow instead of a login form.
pub async fn first_time(State(state): State<AppState>) -> AppResult<Json<FirstTimeResponse>> {
    let first_time = !state.store.any_user_exists().await?;
    Ok(Json(FirstTimeResponse { first_time }))
}

#[derive(Debug, Deserialize, Validate)]
pub struct ConfigureRequest {
    #[validate(length(min = 3, max = 32))]
    pub handle: String,
    #[validate(email)]
    pub email: Option<String>,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct ConfigureResponse {
    pub token: String,
}

/// Bootstraps the first super-admin account on an empty Store. Reuses the
/// registration flow with the role forced to `super_admin`; rejected once
/// any account already exists.
pub async fn configure(
    State(state): State<AppState>,
    Json(req): Json<ConfigureRequest>,
) -> AppResult<(StatusCode, Json<ConfigureResponse>)> {
    req.validate()
        .map_err(|e| AppError::InvalidInput(e.to_string()))?;
    identity::check_password_strength(&req.password)?;

    if state.store.any_user_exists().await? {
        return Err(AppError::Conflict(
            "An account already exists; setup is only available once".into(),
        ));
    }

    let password_hash = identity::hash_password(&req.password)?;
    let user = state
        .store
        .create_user(&req.handle, req.email.as_deref(), &password_hash)
        .await?;
    let user = state
        .store
        .set_user_role(user.id, "super_admin")
        .await?;

    let token = identity::mint_token(
        user.id,
        &user.handle,
        user.role(),
        &state.config.jwt_secret,
        state.config.token_ttl,
    )?;

    Ok((StatusCode::CREATED, Json(ConfigureResponse { token })))
}
