//! Real-time connection to the game server
//!
//! - `manager`: connection state machine, heartbeat, reconnection, channels
//! - `core`: runtime-free backoff math
//! - `shared`: constants and endpoint derivation
//! - `desktop`: tokio-tungstenite transport

mod core;
mod desktop;
mod manager;
mod shared;

pub use self::core::{BackoffPolicy, BackoffState};
pub use desktop::TungsteniteConnector;
pub use manager::{ConnectionConfig, ConnectionError, ConnectionManager};
pub use shared::{socket_url, EndpointError};
