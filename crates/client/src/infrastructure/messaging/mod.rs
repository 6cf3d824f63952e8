//! Event bus and connection lifecycle messaging.
//!
//! - `EventBus`: push-based, per-component listener registry
//! - `ConnectionState` / `ConnectionEvent`: what the connection manager publishes

pub mod connection;
pub mod event_bus;

pub use connection::{ConnectionEvent, ConnectionState, ConnectionStateObserver};
pub use event_bus::{EventBus, Subscription};
