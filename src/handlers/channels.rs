use axum::extract::{Path, State};
use axum::{http::StatusCode, Json};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::authorization;
use crate::error::AppError;
use crate::error::AppResult;
use crate::identity::AuthUser;
use crate::models::Channel;
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
pub struct CreateChannelRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    pub kind: String,
    #[validate(length(max = 1024))]
    pub description: Option<String>,
}

pub async fn create_channel(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(server_id): Path<Uuid>,
    Json(req): Json<CreateChannelRequest>,
) -> AppResult<(StatusCode, Json<Channel>)> {
    req.validate().map_err(validation_error)?;
    if req.kind != "text" && req.kind != "voice" {
        return Err(AppError::InvalidInput(
            "kind must be \"text\" or \"voice\"".into(),
        ));
    }

    authorization::require_server_manager(
        &state.store,
        auth_user.user_id,
        auth_user.role,
        server_id,
    )
    .await?;

    let channel = state
        .store
        .create_channel(server_id, &req.name, &req.kind, req.description.as_deref())
        .await?;

    Ok((StatusCode::CREATED, Json(channel)))
}

pub async fn list_channels(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(server_id): Path<Uuid>,
) -> AppResult<Json<Vec<Channel>>> {
    authorization::require_member(&state.store, auth_user.user_id, auth_user.role, server_id)
        .await?;
    let channels = state.store.list_channels(server_id).await?;
    Ok(Json(channels))
}

pub async fn get_channel(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(channel_id): Path<Uuid>,
) -> AppResult<Json<Channel>> {
    let channel = state.store.require_channel(channel_id).await?;
    authorization::require_member(
        &state.store,
        auth_user.user_id,
        auth_user.role,
        channel.server_id,
    )
    .await?;
    Ok(Json(channel))
}

pub async fn delete_channel(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(channel_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let channel = state.store.require_channel(channel_id).await?;
    authorization::require_server_manager(
        &state.store,
        auth_user.user_id,
        auth_user.role,
        channel.server_id,
    )
    .await?;

    state.store.delete_channel(channel_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
