use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::identity::AuthUser;
use crate::models::UserDto;
use crate::state::AppState;

pub async fn get_user(
    State(state): State<AppState>,
    _auth_user: AuthUser,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<UserDto>> {
    let user = state.store.require_user(user_id).await?;
    Ok(Json(user.into()))
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateEmailRequest {
    #[validate(email)]
    pub email: Option<String>,
}

pub async fn update_current_user(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(req): Json<UpdateEmailRequest>,
) -> AppResult<Json<UserDto>> {
    req.validate()
        .map_err(|e| AppError::InvalidInput(e.to_string()))?;

    let user = state
        .store
        .update_email(auth_user.user_id, req.email.as_deref())
        .await?;

    Ok(Json(user.into()))
}
