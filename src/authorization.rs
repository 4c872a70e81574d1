use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{ChannelKind, Role};
use crate::store::Store;

/// Centralizes the membership/role checks so both the REST surface and the
/// two hubs share one predicate set instead of duplicating them per
/// handler. Every check here returns not-found, not forbidden, when the
/// caller has no visibility into the resource at all, so a response never
/// leaks whether a server or channel exists to someone outside it.

/// A caller may read/post into a server's channels once they hold any
/// membership row, unless they are global staff — staff bypass membership
/// so they can moderate servers they don't belong to.
pub async fn require_member(
    store: &Store,
    caller_id: Uuid,
    caller_role: Role,
    server_id: Uuid,
) -> AppResult<()> {
    if caller_role.is_staff() {
        return Ok(());
    }
    store.require_membership(caller_id, server_id).await?;
    Ok(())
}

/// Server management (rename, delete, channel CRUD, member role changes)
/// requires an `owner` or `admin` membership role, or global staff.
pub async fn require_server_manager(
    store: &Store,
    caller_id: Uuid,
    caller_role: Role,
    server_id: Uuid,
) -> AppResult<()> {
    if caller_role.is_staff() {
        return Ok(());
    }
    let membership = store.require_membership(caller_id, server_id).await?;
    if !membership.role().may_manage() {
        return Err(AppError::NotAuthorized(
            "Requires owner or admin membership".into(),
        ));
    }
    Ok(())
}

/// Only the owner (or global staff) may delete a server or transfer
/// ownership.
pub async fn require_server_owner(
    store: &Store,
    caller_id: Uuid,
    caller_role: Role,
    server_id: Uuid,
) -> AppResult<()> {
    if caller_role.is_staff() {
        return Ok(());
    }
    let server = store.require_server(server_id).await?;
    if server.owner_id != caller_id {
        return Err(AppError::NotAuthorized("Requires server ownership".into()));
    }
    Ok(())
}

/// A message may be edited only by its author; deleted by its author, a
/// server manager, or global staff.
pub fn require_message_editable(caller_id: Uuid, message_author_id: Uuid) -> AppResult<()> {
    if caller_id != message_author_id {
        return Err(AppError::NotAuthorized("Not the message author".into()));
    }
    Ok(())
}

pub async fn require_message_deletable(
    store: &Store,
    caller_id: Uuid,
    caller_role: Role,
    server_id: Uuid,
    message_author_id: Uuid,
) -> AppResult<()> {
    if caller_id == message_author_id || caller_role.is_staff() {
        return Ok(());
    }
    require_server_manager(store, caller_id, caller_role, server_id).await
}

/// Messages may only be posted into `text` channels; voice channels only
/// carry the signaling protocol over `/voice`.
pub fn require_text_channel(kind: ChannelKind) -> AppResult<()> {
    match kind {
        ChannelKind::Text => Ok(()),
        ChannelKind::Voice => Err(AppError::InvalidInput(
            "Channel does not accept messages".into(),
        )),
    }
}

pub fn require_voice_channel(kind: ChannelKind) -> AppResult<()> {
    match kind {
        ChannelKind::Voice => Ok(()),
        ChannelKind::Text => Err(AppError::InvalidInput(
            "Channel is not a voice channel".into(),
        )),
    }
}

/// Only a super-admin may grant or revoke the global `admin`/`super_admin`
/// role.
pub fn require_super_admin(caller_role: Role) -> AppResult<()> {
    if caller_role != Role::SuperAdmin {
        return Err(AppError::NotAuthorized("Requires super_admin role".into()));
    }
    Ok(())
}
