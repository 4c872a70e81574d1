use std::sync::Arc;

use crate::config::Config;
use crate::hub::{TextHub, VoiceHub};
use crate::store::Store;

/// Shared process state, cheap to clone and handed to every handler and
/// connection by reference rather than reached for through an ambient
/// singleton.
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub config: Arc<Config>,
    pub text_hub: TextHub,
    pub voice_hub: VoiceHub,
}

impl AppState {
    pub fn new(store: Store, config: Config) -> Self {
        let text_hub = TextHub::new(
            store.clone(),
            config.outbound_queue_capacity,
            config.ping_interval,
            config.idle_timeout,
        );
        let voice_hub = VoiceHub::new(
            store.clone(),
            config.outbound_queue_capacity,
            config.ping_interval,
            config.idle_timeout,
        );

        AppState {
            store,
            config: Arc::new(config),
            text_hub,
            voice_hub,
        }
    }
}

impl axum::extract::FromRef<AppState> for Store {
    fn from_ref(state: &AppState) -> Self {
        state.store.clone()
    }
}
