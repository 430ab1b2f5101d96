// adsrpc-api: Async Rust client for the JSON-RPC management interface of
// ads-tec industrial devices (firewalls, routers, panels).
//
// Layers, bottom up: transport (POST /rpc), session (SID acquisition),
// client (`call` and status-code mapping), configuration sessions, and
// file transfer over the PHP side channel.

pub mod client;
pub mod config_session;
pub mod envelope;
pub mod error;
pub mod files;
pub mod session;
pub mod transport;

pub use client::{ClientConfig, DeviceClient};
pub use config_session::CfgSessionId;
pub use error::Error;
pub use files::{DownloadFile, UploadKind};
pub use transport::{DEFAULT_TIMEOUT, TlsMode, TransportConfig};
