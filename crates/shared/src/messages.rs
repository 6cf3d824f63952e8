//! WebSocket frame types for client-server communication
//!
//! Every frame is a JSON object with a `type` discriminator. The client sends
//! [`ClientFrame`] and receives [`ServerFrame`].
//!
//! ## Versioning Policy
//!
//! - New variants can be added at the end (forward compatible)
//! - Renaming variants is a breaking change
//! - Unknown server frame types deserialize to `ServerFrame::Unknown` so older
//!   clients log and skip them instead of tearing down the connection

use serde::{Deserialize, Serialize};
use serde_json::Value;

// =============================================================================
// Close Codes
// =============================================================================

/// WebSocket close codes understood by both sides.
pub mod close_codes {
    /// Intentional teardown. Never triggers a reconnect.
    pub const NORMAL: u16 = 1000;
    /// Peer went away without a close frame (tungstenite reports this for dropped sockets).
    pub const ABNORMAL: u16 = 1006;
    /// Client gave up waiting for a heartbeat acknowledgment.
    pub const HEARTBEAT_FAILURE: u16 = 4000;
    /// Credential missing, malformed, or expired.
    pub const AUTH_FAILED: u16 = 4001;
    /// Credential valid but the session is not allowed on this server.
    pub const AUTH_FORBIDDEN: u16 = 4003;

    /// Close codes after which retrying with the same credential is pointless.
    pub fn is_auth_failure(code: u16) -> bool {
        matches!(code, AUTH_FAILED | AUTH_FORBIDDEN)
    }
}

// =============================================================================
// Client Frames (Client → Server)
// =============================================================================

/// Frames sent by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Heartbeat probe. The server answers with `pong` echoing the timestamp.
    Ping { timestamp: i64 },
    /// Ask to join a channel. Membership changes once `subscribed` comes back.
    Subscribe { channel: String },
    /// Ask to leave a channel.
    Unsubscribe { channel: String },
    /// Publish a payload to everyone on a channel.
    Publish { channel: String, data: Value },
}

impl ClientFrame {
    pub fn subscribe(channel: impl Into<String>) -> Self {
        ClientFrame::Subscribe {
            channel: channel.into(),
        }
    }

    pub fn unsubscribe(channel: impl Into<String>) -> Self {
        ClientFrame::Unsubscribe {
            channel: channel.into(),
        }
    }

    pub fn publish(channel: impl Into<String>, data: Value) -> Self {
        ClientFrame::Publish {
            channel: channel.into(),
            data,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// =============================================================================
// Server Frames (Server → Client)
// =============================================================================

/// Frames pushed by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Heartbeat acknowledgment
    Pong {
        #[serde(default)]
        timestamp: Option<i64>,
    },
    /// Handshake sent right after the socket opens
    Connected {
        /// Players currently online
        #[serde(default)]
        peer_count: u32,
    },
    /// Channel subscription acknowledged
    Subscribed { channel: String },
    /// Channel unsubscription acknowledged
    Unsubscribed { channel: String },
    /// Payload published to a subscribed channel
    Broadcast {
        channel: String,
        #[serde(default)]
        data: Value,
    },
    /// Authoritative stat deltas for the player (cash, heat, xp, ...)
    StatUpdate {
        #[serde(default)]
        stats: serde_json::Map<String, Value>,
    },
    /// Player-facing notification
    Notification {
        message: String,
        #[serde(default)]
        level: NotificationLevel,
    },
    /// Server-side error that does not close the connection
    Error { message: String },

    /// Unknown frame type for forward compatibility
    #[serde(other)]
    Unknown,
}

impl ServerFrame {
    /// Wire discriminator, as it appears in the `type` field.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerFrame::Pong { .. } => "pong",
            ServerFrame::Connected { .. } => "connected",
            ServerFrame::Subscribed { .. } => "subscribed",
            ServerFrame::Unsubscribed { .. } => "unsubscribed",
            ServerFrame::Broadcast { .. } => "broadcast",
            ServerFrame::StatUpdate { .. } => "stat_update",
            ServerFrame::Notification { .. } => "notification",
            ServerFrame::Error { .. } => "error",
            ServerFrame::Unknown => "unknown",
        }
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Severity of a server notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
    #[default]
    Info,
    Success,
    Warning,
    Danger,
}
