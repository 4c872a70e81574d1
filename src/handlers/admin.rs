use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::authorization;
use crate::error::{AppError, AppResult};
use crate::identity::AuthUser;
use crate::models::UserDto;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SetRoleRequest {
    pub role: String,
}

#[derive(Debug, Deserialize)]
pub struct SetSettingRequest {
    pub value: String,
}

#[derive(Debug, Serialize)]
pub struct SettingResponse {
    pub key: String,
    pub value: Option<String>,
}

/// Grants or revokes global `admin`/`super_admin` roles.
pub async fn set_user_role(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(user_id): Path<uuid::Uuid>,
    Json(req): Json<SetRoleRequest>,
) -> AppResult<Json<UserDto>> {
    authorization::require_super_admin(auth_user.role)?;

    if !["user", "admin", "super_admin"].contains(&req.role.as_str()) {
        return Err(AppError::InvalidInput("Invalid role".into()));
    }

    let user = state.store.set_user_role(user_id, &req.role).await?;
    Ok(Json(user.into()))
}

pub async fn get_setting(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(key): Path<String>,
) -> AppResult<Json<SettingResponse>> {
    authorization::require_super_admin(auth_user.role)?;
    let value = state.store.get_setting(&key).await?;
    Ok(Json(SettingResponse { key, value }))
}

pub async fn put_setting(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(key): Path<String>,
    Json(req): Json<SetSettingRequest>,
) -> AppResult<Json<SettingResponse>> {
    authorization::require_super_admin(auth_user.role)?;
    state.store.set_setting(&key, &req.value).await?;
    Ok(Json(SettingResponse {
        key,
        value: Some(req.value),
    }))
}
