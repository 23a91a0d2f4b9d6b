// oneui-api: Async Rust client for the One-UI panel API (REST + presence stream)

pub mod client;
pub mod error;
pub mod presence_stream;
pub mod transport;
pub mod types;

pub use client::PanelClient;
pub use error::Error;
pub use presence_stream::{PresenceStreamHandle, ReconnectConfig, StreamStatus};
pub use transport::{TlsMode, TransportConfig};
