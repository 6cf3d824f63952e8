//! Desktop WebSocket transport using tokio-tungstenite

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use racketeer_shared::close_codes;

use crate::ports::outbound::{
    OutboundFrame, SocketConnector, SocketEvent, SocketLink, TransportError,
};

/// Close code reported when the peer sent a close frame without a status.
const NO_STATUS_RECEIVED: u16 = 1005;

/// Opens sockets with tokio-tungstenite and splits each into a reader and a
/// writer task bridged to the link channels.
///
/// Dropping the link's outbound sender closes the socket normally.
#[derive(Debug, Clone, Default)]
pub struct TungsteniteConnector;

impl TungsteniteConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SocketConnector for TungsteniteConnector {
    async fn connect(&self, url: &Url) -> Result<SocketLink, TransportError> {
        let (ws_stream, _) = connect_async(url.as_str())
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        tracing::debug!(host = url.host_str().unwrap_or_default(), "Socket opened");

        let (mut write, mut read) = ws_stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<OutboundFrame>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<SocketEvent>();

        tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                match frame {
                    OutboundFrame::Text(text) => {
                        if let Err(e) = write.send(Message::Text(text)).await {
                            tracing::error!("Failed to send message: {}", e);
                            return;
                        }
                    }
                    OutboundFrame::Close { code, reason } => {
                        let frame = CloseFrame {
                            code: CloseCode::from(code),
                            reason: reason.into(),
                        };
                        if let Err(e) = write.send(Message::Close(Some(frame))).await {
                            tracing::debug!("Close frame not delivered: {}", e);
                        }
                        return;
                    }
                }
            }
            // Link dropped without an explicit close
            let _ = write.send(Message::Close(None)).await;
        });

        tokio::spawn(async move {
            let closed = loop {
                match read.next().await {
                    Some(Ok(Message::Text(text))) => {
                        if inbound_tx.send(SocketEvent::Text(text)).is_err() {
                            return;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let (code, reason) = frame
                            .map(|f| (u16::from(f.code), f.reason.into_owned()))
                            .unwrap_or((NO_STATUS_RECEIVED, String::new()));
                        tracing::info!(code, %reason, "Server closed connection");
                        break SocketEvent::Closed { code, reason };
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!("WebSocket error: {}", e);
                        break SocketEvent::Closed {
                            code: close_codes::ABNORMAL,
                            reason: e.to_string(),
                        };
                    }
                    None => {
                        break SocketEvent::Closed {
                            code: close_codes::ABNORMAL,
                            reason: "stream ended".to_string(),
                        };
                    }
                }
            };
            let _ = inbound_tx.send(closed);
        });

        Ok(SocketLink {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}
