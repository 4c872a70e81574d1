pub mod connection;
pub mod text;
pub mod voice;

pub use connection::ConnectionId;
pub use text::{ChatPayload, TextEnvelope, TextHub};
pub use voice::{VoiceEnvelope, VoiceEvent, VoiceHub};
