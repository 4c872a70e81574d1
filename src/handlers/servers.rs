use axum::{extract::State, http::StatusCode, Json};
use axum::extract::Path;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::authorization;
use crate::error::{AppError, AppResult};
use crate::identity::AuthUser;
use crate::models::{MemberDto, Server};
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
pub struct CreateServerRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(length(max = 1024))]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateServerRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    #[validate(length(max = 1024))]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddMemberRequest {
    pub handle: String,
}

pub async fn create_server(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(req): Json<CreateServerRequest>,
) -> AppResult<(StatusCode, Json<Server>)> {
    req.validate().map_err(validation_error)?;

    let server = state
        .store
        .create_server(auth_user.user_id, &req.name, req.description.as_deref())
        .await?;

    Ok((StatusCode::CREATED, Json(server)))
}

pub async fn list_servers(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> AppResult<Json<Vec<Server>>> {
    let servers = state.store.list_servers_for_user(auth_user.user_id).await?;
    Ok(Json(servers))
}

pub async fn get_server(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(server_id): Path<Uuid>,
) -> AppResult<Json<Server>> {
    authorization::require_member(&state.store, auth_user.user_id, auth_user.role, server_id)
        .await?;
    let server = state.store.require_server(server_id).await?;
    Ok(Json(server))
}

pub async fn update_server(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(server_id): Path<Uuid>,
    Json(req): Json<UpdateServerRequest>,
) -> AppResult<Json<Server>> {
    req.validate().map_err(validation_error)?;
    authorization::require_server_manager(
        &state.store,
        auth_user.user_id,
        auth_user.role,
        server_id,
    )
    .await?;

    let server = state
        .store
        .update_server(server_id, req.name.as_deref(), req.description.as_deref())
        .await?;

    Ok(Json(server))
}

pub async fn delete_server(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(server_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    authorization::require_server_owner(&state.store, auth_user.user_id, auth_user.role, server_id)
        .await?;

    state.store.delete_server(server_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_members(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(server_id): Path<Uuid>,
) -> AppResult<Json<Vec<MemberDto>>> {
    authorization::require_member(&state.store, auth_user.user_id, auth_user.role, server_id)
        .await?;
    let members = state.store.list_members(server_id).await?;
    Ok(Json(members))
}

pub async fn add_member(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(server_id): Path<Uuid>,
    Json(req): Json<AddMemberRequest>,
) -> AppResult<(StatusCode, Json<MemberDto>)> {
    authorization::require_server_manager(
        &state.store,
        auth_user.user_id,
        auth_user.role,
        server_id,
    )
    .await?;

    let target = state
        .store
        .find_user_by_handle(&req.handle)
        .await?
        .ok_or_else(|| AppError::NotFound("user".into()))?;

    let membership = state.store.add_member(target.id, server_id, "member").await?;

    Ok((
        StatusCode::CREATED,
        Json(MemberDto {
            user_id: membership.user_id,
            handle: target.handle,
            role: membership.role,
            joined_at: membership.joined_at,
        }),
    ))
}

pub async fn leave_server(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(server_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let server = state.store.require_server(server_id).await?;
    if server.owner_id == auth_user.user_id {
        return Err(AppError::InvalidInput(
            "Owner cannot leave; transfer ownership or delete the server".into(),
        ));
    }

    state.store.remove_member(auth_user.user_id, server_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn remove_member(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path((server_id, user_id)): Path<(Uuid, Uuid)>,
) -> AppResult<StatusCode> {
    authorization::require_server_manager(
        &state.store,
        auth_user.user_id,
        auth_user.role,
        server_id,
    )
    .await?;

    let server = state.store.require_server(server_id).await?;
    if server.owner_id == user_id {
        return Err(AppError::InvalidInput("Cannot remove the server owner".into()));
    }

    state.store.remove_member(user_id, server_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
