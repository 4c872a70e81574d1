use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::CloseReason;

/// Identity of a live socket, independent of the authenticated user. A user
/// may hold several connections at once (multiple tabs, multiple devices),
/// so user-id is not a usable key into either hub's connection map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        ConnectionId(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-connection outbound queue. `try_send` is the only write path; a full
/// queue means a slow reader, and the connection is dropped rather than
/// allowed to apply backpressure to whoever is publishing into it.
pub fn outbound_channel(
    capacity: usize,
) -> (mpsc::Sender<axum::extract::ws::Message>, mpsc::Receiver<axum::extract::ws::Message>) {
    mpsc::channel(capacity)
}

/// A handle the hub holds for a registered connection: just enough to push
/// frames at it and to know who it belongs to. The socket I/O itself lives
/// in the reader/writer tasks spawned in `hub::text`/`hub::voice`.
#[derive(Clone)]
pub struct ConnectionHandle {
    pub id: ConnectionId,
    pub user_id: Uuid,
    pub handle: String,
    pub sender: mpsc::Sender<axum::extract::ws::Message>,
    /// Set by whichever side first decides why this connection is going
    /// away (a full outbound queue, an idle reader, an expired token), and
    /// read back by the connection's own task once its reader/writer loop
    /// exits, so it knows which close frame to send. A plain `Mutex` is
    /// enough since it's only ever held across a single read or write, never
    /// across an await.
    pub close_reason: Arc<Mutex<Option<CloseReason>>>,
}

impl ConnectionHandle {
    /// Attempts to hand one frame to this connection's writer task without
    /// blocking. Returns `false` on a full queue, signaling the caller
    /// should drop the connection.
    pub fn try_send_text(&self, payload: String) -> bool {
        self.sender
            .try_send(axum::extract::ws::Message::Text(payload))
            .is_ok()
    }

    /// Records why this connection is being closed, unless something else
    /// already claimed a reason first.
    pub fn mark_close(&self, reason: CloseReason) {
        let mut guard = self.close_reason.lock().expect("close_reason mutex poisoned");
        if guard.is_none() {
            *guard = Some(reason);
        }
    }
}
