use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::authorization;
use crate::error::{AppError, CloseReason};
use crate::hub::connection::{outbound_channel, ConnectionHandle, ConnectionId};
use crate::models::Role;
use crate::store::Store;

type ChannelId = Uuid;

/// Client→server voice signaling envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum VoiceEnvelope {
    JoinChannel {
        channel_id: ChannelId,
    },
    LeaveChannel,
    Offer {
        target_user_id: Uuid,
        sdp: Value,
    },
    Answer {
        target_user_id: Uuid,
        sdp: Value,
    },
    IceCandidate {
        target_user_id: Uuid,
        candidate: Value,
    },
    Mute,
    Unmute,
    Deafen,
    Undeafen,
    Speaking {
        speaking: bool,
    },
    Ping,
    #[serde(other)]
    Unknown,
}

/// `ConnectionId` on the wire is a bare UUID; this wrapper exists only to
/// keep (de)serialization local to this module's envelope types.
pub type ConnectionIdWire = Uuid;

/// Server→client voice signaling event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum VoiceEvent {
    Connected {
        connection_id: ConnectionIdWire,
    },
    ChannelJoined {
        channel_id: ChannelId,
        channel_name: String,
        members: Vec<VoiceMemberInfo>,
    },
    UserJoined {
        channel_id: ChannelId,
        connection_id: ConnectionIdWire,
        user_id: Uuid,
        handle: String,
    },
    UserLeft {
        channel_id: ChannelId,
        connection_id: ConnectionIdWire,
        user_id: Uuid,
    },
    Offer {
        user_id: Uuid,
        sdp: Value,
    },
    Answer {
        user_id: Uuid,
        sdp: Value,
    },
    IceCandidate {
        user_id: Uuid,
        candidate: Value,
    },
    Speaking {
        connection_id: ConnectionIdWire,
        speaking: bool,
    },
    MuteChanged {
        connection_id: ConnectionIdWire,
        muted: bool,
    },
    DeafenChanged {
        connection_id: ConnectionIdWire,
        deafened: bool,
    },
    Pong,
    /// Sent only in response to a rejected `join-channel` (not-found /
    /// wrong-kind / not-authorized). Mirrors the REST surface's `kind` +
    /// `message` error payload shape.
    Error {
        kind: String,
        message: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceMemberInfo {
    pub connection_id: ConnectionIdWire,
    pub user_id: Uuid,
    pub handle: String,
    pub muted: bool,
    pub deafened: bool,
    pub speaking: bool,
}

/// A voice connection's join state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VoiceConnState {
    Unjoined,
    Joined(ChannelId),
}

struct VoiceMember {
    user_id: Uuid,
    handle: String,
    muted: bool,
    deafened: bool,
    speaking: bool,
}

#[derive(Default)]
struct RoomState {
    members: HashMap<ConnectionId, VoiceMember>,
}

struct VoiceRegistry {
    connections: HashMap<ConnectionId, ConnectionHandle>,
    roles: HashMap<ConnectionId, Role>,
    states: HashMap<ConnectionId, VoiceConnState>,
    rooms: HashMap<ChannelId, Arc<Mutex<RoomState>>>,
}

impl Default for VoiceRegistry {
    fn default() -> Self {
        VoiceRegistry {
            connections: HashMap::new(),
            roles: HashMap::new(),
            states: HashMap::new(),
            rooms: HashMap::new(),
        }
    }
}

/// The voice-signaling hub: an in-memory room state machine with a
/// two-level locking discipline — registry lock first, room lock second,
/// never both held across an await that isn't the lock acquisition itself.
/// A prior version that locked rooms first and the registry second could
/// deadlock a join racing a leave on the same pair of rooms; this ordering
/// rules that out by construction.
#[derive(Clone)]
pub struct VoiceHub {
    registry: Arc<RwLock<VoiceRegistry>>,
    store: Store,
    outbound_capacity: usize,
    ping_interval: std::time::Duration,
    idle_timeout: std::time::Duration,
}

impl VoiceHub {
    pub fn new(
        store: Store,
        outbound_capacity: usize,
        ping_interval: std::time::Duration,
        idle_timeout: std::time::Duration,
    ) -> Self {
        VoiceHub {
            registry: Arc::new(RwLock::new(VoiceRegistry::default())),
            store,
            outbound_capacity,
            ping_interval,
            idle_timeout,
        }
    }

    async fn register(
        &self,
        user_id: Uuid,
        handle: String,
        role: Role,
    ) -> (
        ConnectionId,
        tokio::sync::mpsc::Receiver<Message>,
        Arc<std::sync::Mutex<Option<CloseReason>>>,
    ) {
        let (tx, rx) = outbound_channel(self.outbound_capacity);
        let id = ConnectionId::new();
        let close_reason = Arc::new(std::sync::Mutex::new(None));
        let conn = ConnectionHandle {
            id,
            user_id,
            handle,
            sender: tx,
            close_reason: close_reason.clone(),
        };

        let mut reg = self.registry.write().await;
        reg.connections.insert(id, conn);
        reg.roles.insert(id, role);
        reg.states.insert(id, VoiceConnState::Unjoined);

        (id, rx, close_reason)
    }

    /// Returns the room handle for `channel_id`, creating it if absent.
    /// Takes the registry write lock only for the lookup/insert, then
    /// releases it before the caller locks the room (two-level discipline).
    async fn room_for(&self, channel_id: ChannelId) -> Arc<Mutex<RoomState>> {
        let mut reg = self.registry.write().await;
        reg.rooms
            .entry(channel_id)
            .or_insert_with(|| Arc::new(Mutex::new(RoomState::default())))
            .clone()
    }

    fn current_room_state(reg: &VoiceRegistry, conn_id: ConnectionId) -> VoiceConnState {
        reg.states.get(&conn_id).copied().unwrap_or(VoiceConnState::Unjoined)
    }

    /// Resolves `channel_id` against the Store and Authorization before
    /// joining. Kept separate from `join_channel` so the in-memory room
    /// state machine stays unit-testable without a database.
    async fn handle_join_channel(&self, conn_id: ConnectionId, channel_id: ChannelId) {
        let role = {
            let reg = self.registry.read().await;
            match reg.roles.get(&conn_id).copied() {
                Some(r) => r,
                None => return,
            }
        };
        let user_id = {
            let reg = self.registry.read().await;
            match reg.connections.get(&conn_id) {
                Some(c) => c.user_id,
                None => return,
            }
        };

        let channel = match self.store.require_channel(channel_id).await {
            Ok(c) => c,
            Err(e) => {
                self.send_error(conn_id, &e).await;
                return;
            }
        };
        if let Err(e) = authorization::require_voice_channel(channel.kind()) {
            self.send_error(conn_id, &e).await;
            return;
        }
        if let Err(e) = authorization::require_member(&self.store, user_id, role, channel.server_id).await
        {
            self.send_error(conn_id, &e).await;
            return;
        }

        self.join_channel(conn_id, channel_id, channel.name).await;
    }

    async fn send_error(&self, conn_id: ConnectionId, err: &AppError) {
        self.send_to(
            conn_id,
            &VoiceEvent::Error {
                kind: err.kind().to_string(),
                message: err.to_string(),
            },
        )
        .await;
    }

    /// Joins `conn_id` into `channel_id`'s room, migrating out of any room
    /// it currently occupies first: a join into a new room while already in
    /// one always emits `user-left` for the old room strictly before
    /// `user-joined` reaches the new one, never the reverse.
    /// `channel_name` is trusted to have already been resolved by the caller.
    async fn join_channel(&self, conn_id: ConnectionId, channel_id: ChannelId, channel_name: String) {
        let already_here = {
            let reg = self.registry.read().await;
            Self::current_room_state(&reg, conn_id) == VoiceConnState::Joined(channel_id)
        };
        if already_here {
            return;
        }

        self.leave_channel(conn_id).await;

        let (user_id, handle) = {
            let reg = self.registry.read().await;
            let Some(conn) = reg.connections.get(&conn_id) else {
                return;
            };
            (conn.user_id, conn.handle.clone())
        };

        let room = self.room_for(channel_id).await;
        let existing: Vec<VoiceMemberInfo> = {
            let mut room_state = room.lock().await;
            let snapshot = room_state
                .members
                .iter()
                .map(|(id, m)| VoiceMemberInfo {
                    connection_id: id.0,
                    user_id: m.user_id,
                    handle: m.handle.clone(),
                    muted: m.muted,
                    deafened: m.deafened,
                    speaking: m.speaking,
                })
                .collect();
            room_state.members.insert(
                conn_id,
                VoiceMember {
                    user_id,
                    handle: handle.clone(),
                    muted: false,
                    deafened: false,
                    speaking: false,
                },
            );
            snapshot
        };

        {
            let mut reg = self.registry.write().await;
            reg.states.insert(conn_id, VoiceConnState::Joined(channel_id));
        }

        self.send_to(
            conn_id,
            &VoiceEvent::ChannelJoined {
                channel_id,
                channel_name,
                members: existing,
            },
        )
        .await;

        self.broadcast_room(
            channel_id,
            Some(conn_id),
            &VoiceEvent::UserJoined {
                channel_id,
                connection_id: conn_id.0,
                user_id,
                handle,
            },
        )
        .await;
    }

    async fn leave_channel(&self, conn_id: ConnectionId) {
        let channel_id = {
            let reg = self.registry.read().await;
            match Self::current_room_state(&reg, conn_id) {
                VoiceConnState::Joined(c) => c,
                VoiceConnState::Unjoined => return,
            }
        };

        let user_id = {
            let reg = self.registry.read().await;
            reg.connections.get(&conn_id).map(|c| c.user_id)
        };

        let room = self.room_for(channel_id).await;
        let room_now_empty = {
            let mut room_state = room.lock().await;
            room_state.members.remove(&conn_id);
            room_state.members.is_empty()
        };

        {
            let mut reg = self.registry.write().await;
            reg.states.insert(conn_id, VoiceConnState::Unjoined);
            if room_now_empty {
                reg.rooms.remove(&channel_id);
            }
        }

        if let Some(user_id) = user_id {
            self.broadcast_room(
                channel_id,
                Some(conn_id),
                &VoiceEvent::UserLeft {
                    channel_id,
                    connection_id: conn_id.0,
                    user_id,
                },
            )
            .await;
        }
    }

    async fn set_mute(&self, conn_id: ConnectionId, muted: bool) {
        self.update_member_flag(conn_id, |m| m.muted = muted).await;
        if let Some(channel_id) = self.channel_of(conn_id).await {
            self.broadcast_room(
                channel_id,
                None,
                &VoiceEvent::MuteChanged {
                    connection_id: conn_id.0,
                    muted,
                },
            )
            .await;
        }
    }

    async fn set_deafen(&self, conn_id: ConnectionId, deafened: bool) {
        self.update_member_flag(conn_id, |m| m.deafened = deafened).await;
        if let Some(channel_id) = self.channel_of(conn_id).await {
            self.broadcast_room(
                channel_id,
                None,
                &VoiceEvent::DeafenChanged {
                    connection_id: conn_id.0,
                    deafened,
                },
            )
            .await;
        }
    }

    async fn channel_of(&self, conn_id: ConnectionId) -> Option<ChannelId> {
        let reg = self.registry.read().await;
        match Self::current_room_state(&reg, conn_id) {
            VoiceConnState::Joined(c) => Some(c),
            VoiceConnState::Unjoined => None,
        }
    }

    async fn user_of(&self, conn_id: ConnectionId) -> Option<Uuid> {
        let reg = self.registry.read().await;
        reg.connections.get(&conn_id).map(|c| c.user_id)
    }

    async fn update_member_flag(&self, conn_id: ConnectionId, f: impl FnOnce(&mut VoiceMember)) {
        let Some(channel_id) = self.channel_of(conn_id).await else {
            return;
        };
        let room = self.room_for(channel_id).await;
        let mut room_state = room.lock().await;
        if let Some(member) = room_state.members.get_mut(&conn_id) {
            f(member);
        }
    }

    /// Relays a signaling payload to every connection the target user holds
    /// in the sender's current room — a user may have multiple devices
    /// joined at once. Cross-room and cross-user-outside-room relay is
    /// rejected by construction since the target is only ever resolved
    /// against the sender's own room.
    async fn relay_to_user(&self, sender: ConnectionId, target_user_id: Uuid, event: &VoiceEvent) {
        let Some(channel_id) = self.channel_of(sender).await else {
            return;
        };
        let room = self.room_for(channel_id).await;
        let targets: Vec<ConnectionId> = {
            let room_state = room.lock().await;
            room_state
                .members
                .iter()
                .filter(|(_, m)| m.user_id == target_user_id)
                .map(|(id, _)| *id)
                .collect()
        };
        for target in targets {
            self.send_to(target, event).await;
        }
    }

    async fn send_to(&self, conn_id: ConnectionId, event: &VoiceEvent) {
        let payload = match serde_json::to_string(event) {
            Ok(p) => p,
            Err(e) => {
                tracing::error!(error = ?e, "failed to serialize voice event");
                return;
            }
        };

        let target = {
            let reg = self.registry.read().await;
            reg.connections.get(&conn_id).cloned()
        };

        if let Some(conn) = target {
            if !conn.try_send_text(payload) {
                tracing::warn!(connection_id = %conn_id, "voice connection queue full, dropping");
                conn.mark_close(CloseReason::SlowConsumer);
                self.deregister(conn_id).await;
            }
        }
    }

    /// Broadcasts to every member of `channel_id`'s room except `exclude`
    /// (if given). Snapshots the member id list under the room lock, drops
    /// it, then sends — same discipline as `Self::join_channel`.
    async fn broadcast_room(
        &self,
        channel_id: ChannelId,
        exclude: Option<ConnectionId>,
        event: &VoiceEvent,
    ) {
        let room = self.room_for(channel_id).await;
        let members: Vec<ConnectionId> = {
            let room_state = room.lock().await;
            room_state.members.keys().copied().collect()
        };

        for member in members {
            if Some(member) == exclude {
                continue;
            }
            self.send_to(member, event).await;
        }
    }

    async fn deregister(&self, conn_id: ConnectionId) {
        self.leave_channel(conn_id).await;
        let mut reg = self.registry.write().await;
        reg.connections.remove(&conn_id);
        reg.roles.remove(&conn_id);
        reg.states.remove(&conn_id);
    }

    async fn handle_envelope(&self, conn_id: ConnectionId, envelope: VoiceEnvelope) {
        match envelope {
            VoiceEnvelope::JoinChannel { channel_id } => {
                self.handle_join_channel(conn_id, channel_id).await;
            }
            VoiceEnvelope::LeaveChannel => {
                self.leave_channel(conn_id).await;
            }
            VoiceEnvelope::Offer { target_user_id, sdp } => {
                let Some(user_id) = self.user_of(conn_id).await else {
                    return;
                };
                self.relay_to_user(
                    conn_id,
                    target_user_id,
                    &VoiceEvent::Offer { user_id, sdp },
                )
                .await;
            }
            VoiceEnvelope::Answer { target_user_id, sdp } => {
                let Some(user_id) = self.user_of(conn_id).await else {
                    return;
                };
                self.relay_to_user(
                    conn_id,
                    target_user_id,
                    &VoiceEvent::Answer { user_id, sdp },
                )
                .await;
            }
            VoiceEnvelope::IceCandidate {
                target_user_id,
                candidate,
            } => {
                let Some(user_id) = self.user_of(conn_id).await else {
                    return;
                };
                self.relay_to_user(
                    conn_id,
                    target_user_id,
                    &VoiceEvent::IceCandidate { user_id, candidate },
                )
                .await;
            }
            VoiceEnvelope::Mute => self.set_mute(conn_id, true).await,
            VoiceEnvelope::Unmute => self.set_mute(conn_id, false).await,
            VoiceEnvelope::Deafen => self.set_deafen(conn_id, true).await,
            VoiceEnvelope::Undeafen => self.set_deafen(conn_id, false).await,
            VoiceEnvelope::Speaking { speaking } => {
                self.update_member_flag(conn_id, |m| m.speaking = speaking).await;
                if let Some(channel_id) = self.channel_of(conn_id).await {
                    self.broadcast_room(
                        channel_id,
                        Some(conn_id),
                        &VoiceEvent::Speaking {
                            connection_id: conn_id.0,
                            speaking,
                        },
                    )
                    .await;
                }
            }
            VoiceEnvelope::Ping => {
                self.send_to(conn_id, &VoiceEvent::Pong).await;
            }
            VoiceEnvelope::Unknown => {}
        }
    }

    /// Drives one voice socket end to end, mirroring `TextHub::handle_socket`'s
    /// register/spawn/guaranteed-deregister shape. `token_exp` is the expiry
    /// (unix seconds) of the token presented at handshake; every inbound
    /// envelope re-checks it so a token that expires mid-session closes the
    /// connection on its next message.
    pub async fn handle_socket(
        self,
        socket: WebSocket,
        user_id: Uuid,
        handle: String,
        token_exp: i64,
        role: Role,
    ) {
        let (id, mut outbound_rx, close_reason) = self.register(user_id, handle, role).await;

        self.send_to(id, &VoiceEvent::Connected { connection_id: id.0 })
            .await;

        let hub = self.clone();
        let guard = scopeguard::guard((), move |_| {
            let hub = hub.clone();
            tokio::spawn(async move {
                hub.deregister(id).await;
            });
        });

        let (mut ws_tx, mut ws_rx) = socket.split();

        let writer = async {
            let mut ticker = tokio::time::interval(self.ping_interval);
            loop {
                tokio::select! {
                    frame = outbound_rx.recv() => {
                        match frame {
                            Some(frame) => {
                                if ws_tx.send(frame).await.is_err() {
                                    break;
                                }
                            }
                            None => break,
                        }
                    }
                    _ = ticker.tick() => {
                        if ws_tx.send(Message::Ping(Vec::new())).await.is_err() {
                            break;
                        }
                    }
                }
            }
        };

        let reader = async {
            loop {
                match tokio::time::timeout(self.idle_timeout, ws_rx.next()).await {
                    Ok(Some(Ok(Message::Text(text)))) => {
                        if Utc::now().timestamp() >= token_exp {
                            close_reason
                                .lock()
                                .expect("close_reason mutex poisoned")
                                .get_or_insert(CloseReason::PolicyViolation);
                            break;
                        }
                        match serde_json::from_str::<VoiceEnvelope>(&text) {
                            Ok(envelope) => self.handle_envelope(id, envelope).await,
                            Err(e) => {
                                tracing::debug!(error = ?e, "malformed voice envelope");
                            }
                        }
                    }
                    Ok(Some(Ok(Message::Close(_)))) | Ok(None) => break,
                    Ok(Some(Ok(_))) => {}
                    Ok(Some(Err(_))) => break,
                    Err(_) => {
                        close_reason
                            .lock()
                            .expect("close_reason mutex poisoned")
                            .get_or_insert(CloseReason::IdleTimeout);
                        tracing::debug!(connection_id = %id, "voice idle timeout");
                        break;
                    }
                }
            }
        };

        tokio::select! {
            _ = writer => {}
            _ = reader => {}
        }

        let reason = close_reason
            .lock()
            .expect("close_reason mutex poisoned")
            .unwrap_or(CloseReason::Normal);
        let frame = reason.close_frame();
        let _ = ws_tx
            .send(Message::Close(Some(CloseFrame {
                code: frame.code,
                reason: frame.reason,
            })))
            .await;

        drop(guard);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// These tests exercise the in-memory room state machine directly
    /// (`join_channel`/`leave_channel`), bypassing `handle_join_channel`'s
    /// Store/Authorization resolution entirely — so a lazy pool that never
    /// issues a query is enough; no live database is needed.
    fn hub() -> VoiceHub {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://localhost/unused")
            .expect("lazy pool construction does not touch the network");
        VoiceHub::new(
            Store::new(pool),
            32,
            std::time::Duration::from_secs(30),
            std::time::Duration::from_secs(90),
        )
    }

    #[tokio::test]
    async fn join_then_leave_empties_room() {
        let hub = hub();
        let (id, _rx, _close) = hub.register(Uuid::new_v4(), "alice".into(), Role::User).await;
        let channel_id = Uuid::new_v4();

        hub.join_channel(id, channel_id, "general".into()).await;
        assert_eq!(hub.channel_of(id).await, Some(channel_id));

        hub.leave_channel(id).await;
        assert_eq!(hub.channel_of(id).await, None);

        let reg = hub.registry.read().await;
        assert!(!reg.rooms.contains_key(&channel_id));
    }

    #[tokio::test]
    async fn join_while_joined_migrates_rooms() {
        let hub = hub();
        let (id, _rx, _close) = hub.register(Uuid::new_v4(), "alice".into(), Role::User).await;
        let channel_a = Uuid::new_v4();
        let channel_b = Uuid::new_v4();

        hub.join_channel(id, channel_a, "general".into()).await;
        assert_eq!(hub.channel_of(id).await, Some(channel_a));

        hub.join_channel(id, channel_b, "other".into()).await;
        assert_eq!(hub.channel_of(id).await, Some(channel_b));

        let reg = hub.registry.read().await;
        assert!(!reg.rooms.contains_key(&channel_a), "old room must be vacated");
    }

    #[tokio::test]
    async fn relay_rejects_cross_room_target() {
        let hub = hub();
        let alice_id = Uuid::new_v4();
        let bob_id = Uuid::new_v4();
        let (a, _rx_a, _close_a) = hub.register(alice_id, "alice".into(), Role::User).await;
        let (b, mut rx_b, _close_b) = hub.register(bob_id, "bob".into(), Role::User).await;

        let channel_a = Uuid::new_v4();
        let channel_b = Uuid::new_v4();
        hub.join_channel(a, channel_a, "general".into()).await;
        hub.join_channel(b, channel_b, "other".into()).await;

        hub.relay_to_user(
            a,
            bob_id,
            &VoiceEvent::Offer {
                user_id: alice_id,
                sdp: Value::Null,
            },
        )
        .await;

        // b never joined a's room, so nothing should have been queued for it
        // beyond its own Connected/ChannelJoined frames already drained by
        // the test setup; assert the channel is empty of a fresh Offer.
        let mut saw_offer = false;
        while let Ok(msg) = rx_b.try_recv() {
            if let Message::Text(t) = msg {
                if t.contains("\"offer\"") {
                    saw_offer = true;
                }
            }
        }
        assert!(!saw_offer);
    }

    /// A join/leave storm against the same room from many connections at
    /// once must terminate and leave the registry consistent — this is the
    /// liveness property the two-level locking discipline exists for.
    #[tokio::test]
    async fn join_leave_storm_does_not_deadlock() {
        let hub = hub();
        let channel_id = Uuid::new_v4();

        let mut conns = Vec::new();
        for i in 0..16 {
            let (id, _rx, _close) = hub
                .register(Uuid::new_v4(), format!("user-{i}"), Role::User)
                .await;
            conns.push(id);
        }

        let mut tasks = tokio::task::JoinSet::new();
        for &id in &conns {
            let hub = hub.clone();
            tasks.spawn(async move {
                for _ in 0..50 {
                    hub.join_channel(id, channel_id, "storm".into()).await;
                    hub.leave_channel(id).await;
                }
            });
        }

        let outcome = tokio::time::timeout(std::time::Duration::from_secs(10), async {
            while tasks.join_next().await.is_some() {}
        })
        .await;
        assert!(outcome.is_ok(), "join/leave storm deadlocked");

        // Hub must still be responsive afterward: a fresh join/leave
        // completes and leaves no stray room behind.
        let (probe, _rx, _close) = hub.register(Uuid::new_v4(), "probe".into(), Role::User).await;
        hub.join_channel(probe, channel_id, "storm".into()).await;
        hub.leave_channel(probe).await;

        let reg = hub.registry.read().await;
        assert!(!reg.rooms.contains_key(&channel_id));
    }
}
