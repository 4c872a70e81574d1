use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use chrono::{DateTime, Utc};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::CloseReason;
use crate::hub::connection::{outbound_channel, ConnectionHandle, ConnectionId};
use crate::store::Store;

/// Hard ceiling on posted content, matching the REST surface's
/// `CreateMessageRequest` validator so a message can't slip past the one
/// and be rejected by the other.
const MAX_CONTENT_LEN: usize = 4096;

/// Wire envelope exchanged over the text hub socket: one payload shape per
/// kind, tagged by `type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum TextEnvelope {
    Join {
        channel_id: Uuid,
    },
    Leave {
        channel_id: Uuid,
    },
    Chat {
        channel_id: Uuid,
        #[serde(skip_serializing_if = "Option::is_none")]
        user_id: Option<Uuid>,
        #[serde(skip_serializing_if = "Option::is_none")]
        handle: Option<String>,
        data: ChatPayload,
        #[serde(skip_serializing_if = "Option::is_none")]
        timestamp: Option<DateTime<Utc>>,
    },
    Typing {
        channel_id: Uuid,
        #[serde(skip_serializing_if = "Option::is_none")]
        user_id: Option<Uuid>,
        #[serde(skip_serializing_if = "Option::is_none")]
        handle: Option<String>,
    },
    StopTyping {
        channel_id: Uuid,
        #[serde(skip_serializing_if = "Option::is_none")]
        user_id: Option<Uuid>,
    },
    UserJoined {
        channel_id: Uuid,
        user_id: Uuid,
        handle: String,
    },
    UserLeft {
        channel_id: Uuid,
        user_id: Uuid,
        handle: String,
    },
    Ping {
        #[serde(skip_serializing_if = "Option::is_none")]
        channel_id: Option<Uuid>,
    },
    Pong {
        #[serde(skip_serializing_if = "Option::is_none")]
        channel_id: Option<Uuid>,
    },
    /// Anything the hub doesn't recognize is a no-op, so adding a new type
    /// later doesn't break older clients.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatPayload {
    pub message_id: i64,
    pub content: String,
}

type ChannelId = Uuid;

#[derive(Default)]
struct Registry {
    /// Fan-out index: which connections are subscribed to a channel. This
    /// is the primary index — keyed by channel, not by user — since
    /// publish needs to walk it once per channel event.
    subscribers: HashMap<ChannelId, HashSet<ConnectionId>>,
    connections: HashMap<ConnectionId, ConnectionHandle>,
}

/// The text-channel real-time hub: a channel-keyed fan-out registry plus
/// bounded per-connection queues.
#[derive(Clone)]
pub struct TextHub {
    registry: Arc<RwLock<Registry>>,
    store: Store,
    outbound_capacity: usize,
    ping_interval: std::time::Duration,
    idle_timeout: std::time::Duration,
}

impl TextHub {
    pub fn new(
        store: Store,
        outbound_capacity: usize,
        ping_interval: std::time::Duration,
        idle_timeout: std::time::Duration,
    ) -> Self {
        TextHub {
            registry: Arc::new(RwLock::new(Registry::default())),
            store,
            outbound_capacity,
            ping_interval,
            idle_timeout,
        }
    }

    /// Sends one envelope directly to a single connection (used for `pong`
    /// replies, which are not fanned out). Silently drops on a full queue,
    /// same policy as `publish`.
    async fn send_to(&self, conn_id: ConnectionId, envelope: &TextEnvelope) {
        let payload = match serde_json::to_string(envelope) {
            Ok(p) => p,
            Err(e) => {
                tracing::error!(error = ?e, "failed to serialize text envelope");
                return;
            }
        };
        let target = {
            let reg = self.registry.read().await;
            reg.connections.get(&conn_id).cloned()
        };
        if let Some(conn) = target {
            if !conn.try_send_text(payload) {
                tracing::warn!(connection_id = %conn_id, "text connection queue full, dropping");
                conn.mark_close(CloseReason::SlowConsumer);
                self.deregister(conn_id).await;
            }
        }
    }

    /// Registers a new connection and returns its id, the receiver half its
    /// writer task should drain, and the shared close-reason cell that
    /// records why the connection eventually goes away.
    async fn register(
        &self,
        user_id: Uuid,
        handle: String,
    ) -> (
        ConnectionId,
        tokio::sync::mpsc::Receiver<Message>,
        Arc<Mutex<Option<CloseReason>>>,
    ) {
        let (tx, rx) = outbound_channel(self.outbound_capacity);
        let id = ConnectionId::new();
        let close_reason = Arc::new(Mutex::new(None));
        let conn = ConnectionHandle {
            id,
            user_id,
            handle,
            sender: tx,
            close_reason: close_reason.clone(),
        };

        let mut reg = self.registry.write().await;
        reg.connections.insert(id, conn);

        (id, rx, close_reason)
    }

    /// Subscribes a connection to a channel's fan-out set. Connections are
    /// subscribed eagerly at connect time to every channel the caller may
    /// read (see DESIGN.md), so this is driven entirely by the handshake.
    async fn subscribe(&self, conn_id: ConnectionId, channel_id: ChannelId) {
        let mut reg = self.registry.write().await;
        reg.subscribers.entry(channel_id).or_default().insert(conn_id);
    }

    /// Removes a connection entirely and drops it from every channel it was
    /// subscribed to. Called exactly once per connection, on its way out.
    async fn deregister(&self, conn_id: ConnectionId) -> Option<ConnectionHandle> {
        let mut reg = self.registry.write().await;
        let removed = reg.connections.remove(&conn_id);
        for set in reg.subscribers.values_mut() {
            set.remove(&conn_id);
        }
        reg.subscribers.retain(|_, set| !set.is_empty());
        removed
    }

    /// Publishes an envelope to every connection subscribed to `channel_id`.
    /// Snapshots the subscriber set and connection handles, releases the
    /// registry lock, then sends — so a slow or full queue never blocks the
    /// publisher nor holds the lock.
    pub async fn publish(&self, channel_id: ChannelId, envelope: &TextEnvelope) {
        let payload = match serde_json::to_string(envelope) {
            Ok(p) => p,
            Err(e) => {
                tracing::error!(error = ?e, "failed to serialize text envelope");
                return;
            }
        };

        let targets: Vec<ConnectionHandle> = {
            let reg = self.registry.read().await;
            match reg.subscribers.get(&channel_id) {
                Some(set) => set
                    .iter()
                    .filter_map(|id| reg.connections.get(id).cloned())
                    .collect(),
                None => return,
            }
        };

        let mut dead = Vec::new();
        for conn in &targets {
            if !conn.try_send_text(payload.clone()) {
                tracing::warn!(connection_id = %conn.id, "text connection queue full, dropping");
                conn.mark_close(CloseReason::SlowConsumer);
                dead.push(conn.id);
            }
        }

        for id in dead {
            self.deregister(id).await;
        }
    }

    /// Interprets one inbound frame from a connection's own reader.
    /// `subscribed` is the set of channels resolved for this connection at
    /// handshake, and doubles as the authorization check here: a channel-id
    /// the connection was never subscribed to is rejected the same as one
    /// it has no membership for.
    async fn handle_inbound(
        &self,
        conn_id: ConnectionId,
        user_id: Uuid,
        handle: &str,
        subscribed: &HashSet<ChannelId>,
        raw: &str,
    ) {
        let envelope: TextEnvelope = match serde_json::from_str(raw) {
            Ok(e) => e,
            Err(_) => return,
        };

        match envelope {
            TextEnvelope::Chat {
                channel_id, data, ..
            } => {
                if !subscribed.contains(&channel_id) {
                    return;
                }
                let content = data.content.trim();
                if content.is_empty() || content.chars().count() > MAX_CONTENT_LEN {
                    return;
                }
                match self.store.append_message(channel_id, user_id, content).await {
                    Ok(message) => {
                        self.publish(
                            channel_id,
                            &TextEnvelope::Chat {
                                channel_id,
                                user_id: Some(user_id),
                                handle: Some(handle.to_string()),
                                data: ChatPayload {
                                    message_id: message.id,
                                    content: message.content,
                                },
                                timestamp: Some(message.created_at),
                            },
                        )
                        .await;
                    }
                    Err(e) => {
                        tracing::warn!(error = ?e, "inbound chat append failed");
                    }
                }
            }
            TextEnvelope::Typing { channel_id, .. } => {
                if !subscribed.contains(&channel_id) {
                    return;
                }
                self.publish(
                    channel_id,
                    &TextEnvelope::Typing {
                        channel_id,
                        user_id: Some(user_id),
                        handle: Some(handle.to_string()),
                    },
                )
                .await;
            }
            TextEnvelope::StopTyping { channel_id, .. } => {
                if !subscribed.contains(&channel_id) {
                    return;
                }
                self.publish(
                    channel_id,
                    &TextEnvelope::StopTyping {
                        channel_id,
                        user_id: Some(user_id),
                    },
                )
                .await;
            }
            TextEnvelope::Ping { channel_id } => {
                self.send_to(conn_id, &TextEnvelope::Pong { channel_id }).await;
            }
            // Everything else — including `join`/`leave`, which are
            // server→client only — is a forward-compatible no-op.
            _ => {}
        }
    }

    /// Drives one socket end to end: registers it, spawns reader/writer
    /// tasks, and guarantees deregistration + `user-left` fan-out on the way
    /// out regardless of how the connection ended. `token_exp` is the
    /// expiry (unix seconds) of the token presented at handshake; every
    /// inbound envelope re-checks it so a token that expires mid-session
    /// closes the connection on its next message rather than staying live
    /// until the socket happens to break on its own.
    pub async fn handle_socket(
        self,
        socket: WebSocket,
        user_id: Uuid,
        handle: String,
        token_exp: i64,
        initial_channels: Vec<ChannelId>,
    ) {
        let (id, mut outbound_rx, close_reason) = self.register(user_id, handle.clone()).await;

        for channel_id in &initial_channels {
            self.subscribe(id, *channel_id).await;
            self.publish(
                *channel_id,
                &TextEnvelope::UserJoined {
                    channel_id: *channel_id,
                    user_id,
                    handle: handle.clone(),
                },
            )
            .await;
        }

        let hub = self.clone();
        let guard = scopeguard::guard((), move |_| {
            let hub = hub.clone();
            let handle = handle.clone();
            let channels = initial_channels.clone();
            tokio::spawn(async move {
                hub.deregister(id).await;
                for channel_id in channels {
                    hub.publish(
                        channel_id,
                        &TextEnvelope::UserLeft {
                            channel_id,
                            user_id,
                            handle: handle.clone(),
                        },
                    )
                    .await;
                }
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

        let subscribed: HashSet<ChannelId> = initial_channels.iter().copied().collect();

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
                        self.handle_inbound(id, user_id, &handle, &subscribed, &text)
                            .await;
                    }
                    Ok(Some(Ok(Message::Close(_)))) | Ok(None) => break,
                    Ok(Some(Ok(_))) => {}
                    Ok(Some(Err(_))) => break,
                    Err(_) => {
                        close_reason
                            .lock()
                            .expect("close_reason mutex poisoned")
                            .get_or_insert(CloseReason::IdleTimeout);
                        tracing::debug!(connection_id = %id, "idle timeout");
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
