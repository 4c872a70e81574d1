use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::response::Response;
use serde::Deserialize;

use crate::error::AppError;
use crate::identity;
use crate::models::Role;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct WsAuthParams {
    pub token: String,
}

/// Upgrades to the text hub. Browsers cannot set an `Authorization` header
/// on a WebSocket handshake, so the bearer token travels as a query
/// parameter here instead of through the `AuthUser` extractor used by the
/// REST surface.
pub async fn text_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<WsAuthParams>,
) -> Result<Response, AppError> {
    let claims = identity::parse_token(&params.token, &state.config.jwt_secret)?;
    let role: Role = claims.role.parse().unwrap_or(Role::User);

    // Staff bypass per-server membership, so their eager subscription set
    // is every text channel rather than only the servers they hold a
    // Membership row for.
    let channels = if role.is_staff() {
        state.store.list_all_channels().await?
    } else {
        let servers = state.store.list_servers_for_user(claims.sub).await?;
        let mut channels = Vec::new();
        for server in servers {
            channels.extend(state.store.list_channels(server.id).await?);
        }
        channels
    };
    let initial_channels: Vec<uuid::Uuid> = channels
        .into_iter()
        .filter(|c| c.kind() == crate::models::ChannelKind::Text)
        .map(|c| c.id)
        .collect();

    let hub = state.text_hub.clone();
    Ok(ws.on_upgrade(move |socket| {
        hub.handle_socket(socket, claims.sub, claims.handle, claims.exp, initial_channels)
    }))
}

/// Upgrades to the voice signaling hub. The client joins a specific channel
/// afterward via a `join-channel` envelope rather than at upgrade time,
/// since a connection may move between voice channels without reconnecting.
pub async fn voice_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<WsAuthParams>,
) -> Result<Response, AppError> {
    let claims = identity::parse_token(&params.token, &state.config.jwt_secret)?;
    let role: Role = claims.role.parse().unwrap_or(Role::User);

    let hub = state.voice_hub.clone();
    Ok(ws.on_upgrade(move |socket| {
        hub.handle_socket(socket, claims.sub, claims.handle, claims.exp, role)
    }))
}
