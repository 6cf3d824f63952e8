//! Socket Port - outbound port for the raw real-time transport
//!
//! A connector opens one socket and hands back a [`SocketLink`]: a pair of
//! channels for outgoing frames and incoming events. The connection manager
//! owns everything above that (state machine, heartbeat, reconnection), so a
//! transport only has to move text frames and report how the socket closed.

use async_trait::async_trait;
use tokio::sync::mpsc;
use url::Url;

/// Error type for transport operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Socket could not be opened.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
}

/// Frame handed to the transport for writing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    Text(String),
    /// Close the socket with the given code. Nothing is written after this.
    Close { code: u16, reason: String },
}

/// Event read from the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    Text(String),
    /// Socket closed. Always the last event of a link.
    Closed { code: u16, reason: String },
}

/// One open socket.
#[derive(Debug)]
pub struct SocketLink {
    pub outbound: mpsc::UnboundedSender<OutboundFrame>,
    pub inbound: mpsc::UnboundedReceiver<SocketEvent>,
}

/// Opens sockets.
#[async_trait]
pub trait SocketConnector: Send + Sync {
    async fn connect(&self, url: &Url) -> Result<SocketLink, TransportError>;
}
