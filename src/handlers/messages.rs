use axum::extract::{Path, Query, State};
use axum::{http::StatusCode, Json};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::authorization;
use crate::error::{AppError, AppResult};
use crate::hub::{ChatPayload, TextEnvelope};
use crate::identity::AuthUser;
use crate::models::Message;
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
pub struct CreateMessageRequest {
    #[validate(length(min = 1, max = 4096))]
    pub content: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateMessageRequest {
    #[validate(length(min = 1, max = 4096))]
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct ListMessagesParams {
    pub before: Option<i64>,
    pub after: Option<i64>,
    pub limit: Option<i64>,
}

/// Posts a message and fans it out over the text hub after the store
/// append commits, so REST-posted messages reach live WS subscribers the
/// same way chat sent over the socket itself does.
pub async fn create_message(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(channel_id): Path<Uuid>,
    Json(req): Json<CreateMessageRequest>,
) -> AppResult<(StatusCode, Json<Message>)> {
    req.validate().map_err(validation_error)?;

    let channel = state.store.require_channel(channel_id).await?;
    authorization::require_member(
        &state.store,
        auth_user.user_id,
        auth_user.role,
        channel.server_id,
    )
    .await?;
    authorization::require_text_channel(channel.kind())?;

    let message = state
        .store
        .append_message(channel_id, auth_user.user_id, &req.content)
        .await?;

    state
        .text_hub
        .publish(
            channel_id,
            &TextEnvelope::Chat {
                channel_id,
                user_id: Some(auth_user.user_id),
                handle: Some(auth_user.handle.clone()),
                data: ChatPayload {
                    message_id: message.id,
                    content: message.content.clone(),
                },
                timestamp: Some(message.created_at),
            },
        )
        .await;

    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn list_messages(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(channel_id): Path<Uuid>,
    Query(params): Query<ListMessagesParams>,
) -> AppResult<Json<Vec<Message>>> {
    let channel = state.store.require_channel(channel_id).await?;
    authorization::require_member(
        &state.store,
        auth_user.user_id,
        auth_user.role,
        channel.server_id,
    )
    .await?;

    let messages = state
        .store
        .list_messages(channel_id, params.before, params.after, params.limit)
        .await?;

    Ok(Json(messages))
}

pub async fn update_message(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(message_id): Path<i64>,
    Json(req): Json<UpdateMessageRequest>,
) -> AppResult<Json<Message>> {
    req.validate().map_err(validation_error)?;

    let existing = state.store.require_message(message_id).await?;
    authorization::require_message_editable(auth_user.user_id, existing.user_id)?;

    let message = state.store.edit_message(message_id, &req.content).await?;

    state
        .text_hub
        .publish(
            message.channel_id,
            &TextEnvelope::Chat {
                channel_id: message.channel_id,
                user_id: Some(auth_user.user_id),
                handle: Some(auth_user.handle.clone()),
                data: ChatPayload {
                    message_id: message.id,
                    content: message.content.clone(),
                },
                timestamp: message.edited_at,
            },
        )
        .await;

    Ok(Json(message))
}

pub async fn delete_message(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(message_id): Path<i64>,
) -> AppResult<StatusCode> {
    let existing = state.store.require_message(message_id).await?;
    let channel = state.store.require_channel(existing.channel_id).await?;

    authorization::require_message_deletable(
        &state.store,
        auth_user.user_id,
        auth_user.role,
        channel.server_id,
        existing.user_id,
    )
    .await?;

    state.store.delete_message(message_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
