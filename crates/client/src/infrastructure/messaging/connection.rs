//! Connection lifecycle types.
//!
//! The connection state is stored as an atomic `u8` so observers can read it
//! without going through the connection driver.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Connection state for the real-time channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Not connected, and not trying to be
    Disconnected,
    /// Socket is being opened
    Connecting,
    /// Socket open and handshake traffic flowing
    Connected,
    /// Connection lost, a retry is scheduled
    Reconnecting,
}

impl ConnectionState {
    /// Convert to u8 for atomic storage.
    pub fn to_u8(self) -> u8 {
        match self {
            ConnectionState::Disconnected => 0,
            ConnectionState::Connecting => 1,
            ConnectionState::Connected => 2,
            ConnectionState::Reconnecting => 3,
        }
    }

    /// Convert from u8 (atomic storage).
    pub fn from_u8(v: u8) -> Self {
        match v {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            3 => ConnectionState::Reconnecting,
            _ => ConnectionState::Disconnected,
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
        };
        f.write_str(name)
    }
}

/// Lifecycle notifications published by the connection manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    StateChanged {
        previous: ConnectionState,
        current: ConnectionState,
    },
    /// Handshake received after the socket opened
    Established { peer_count: u32 },
    /// Server acknowledged a subscription
    ChannelSubscribed(String),
    /// Server acknowledged an unsubscription
    ChannelUnsubscribed(String),
    /// No heartbeat acknowledgment arrived in time; the socket is being recycled
    HeartbeatFailed,
    /// Server closed with an authentication close code. No retry is scheduled.
    AuthenticationFailed { code: u16, reason: String },
    /// Reconnection gave up after this many attempts
    MaxRetriesExhausted { attempts: u32 },
    /// A scheduled reconnect could not build its endpoint (credential gone or
    /// origin unusable). No further retry is scheduled.
    ReconnectAbandoned { reason: String },
}

/// Observable connection state for UI binding.
///
/// Multiple observers can share the same underlying state without holding
/// the manager itself.
#[derive(Clone)]
pub struct ConnectionStateObserver {
    state: Arc<AtomicU8>,
}

impl ConnectionStateObserver {
    /// Create a new observer from a shared state Arc.
    pub fn new(state: Arc<AtomicU8>) -> Self {
        Self { state }
    }

    /// Get the current connection state.
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Check if currently connected.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }
}
