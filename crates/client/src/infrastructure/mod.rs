pub mod http_client;
pub mod messaging;
pub mod platform;
pub mod scheduler;
pub mod websocket;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export messaging types
pub use messaging::{ConnectionEvent, ConnectionState, EventBus};
