use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use racketeer_shared::{ClientFrame, ServerFrame};
use tokio::sync::mpsc;
use url::Url;

use crate::ports::outbound::{
    OutboundFrame, SocketConnector, SocketEvent, SocketLink, TransportError,
};

#[derive(Default)]
struct Script {
    refuse_next: usize,
    refuse_all: bool,
    attempts: Vec<Url>,
}

/// Channel-backed connector. Every accepted socket shows up as a
/// [`ServerEnd`] on the receiver returned by [`FakeConnector::new`].
pub struct FakeConnector {
    script: Mutex<Script>,
    accepted: mpsc::UnboundedSender<ServerEnd>,
}

impl FakeConnector {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ServerEnd>) {
        let (accepted, rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            script: Mutex::new(Script::default()),
            accepted,
        });
        (connector, rx)
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Refuse the next `n` connection attempts.
    pub fn refuse_next(&self, n: usize) {
        self.script().refuse_next = n;
    }

    /// Refuse every attempt until turned off.
    pub fn refuse_all(&self, refuse: bool) {
        self.script().refuse_all = refuse;
    }

    /// Connection attempts so far, refused ones included.
    pub fn connect_count(&self) -> usize {
        self.script().attempts.len()
    }

    pub fn attempted_urls(&self) -> Vec<Url> {
        self.script().attempts.clone()
    }
}

#[async_trait]
impl SocketConnector for FakeConnector {
    async fn connect(&self, url: &Url) -> Result<SocketLink, TransportError> {
        {
            let mut script = self.script();
            script.attempts.push(url.clone());
            if script.refuse_all {
                return Err(TransportError::ConnectionFailed("refused".to_string()));
            }
            if script.refuse_next > 0 {
                script.refuse_next -= 1;
                return Err(TransportError::ConnectionFailed("refused".to_string()));
            }
        }

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let _ = self.accepted.send(ServerEnd {
            url: url.clone(),
            sent: outbound_rx,
            push: inbound_tx,
        });

        Ok(SocketLink {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}

/// The server side of one fake socket.
pub struct ServerEnd {
    pub url: Url,
    sent: mpsc::UnboundedReceiver<OutboundFrame>,
    push: mpsc::UnboundedSender<SocketEvent>,
}

impl ServerEnd {
    pub fn push(&self, frame: &ServerFrame) {
        if let Ok(text) = serde_json::to_string(frame) {
            self.push_text(&text);
        }
    }

    pub fn push_text(&self, text: &str) {
        let _ = self.push.send(SocketEvent::Text(text.to_string()));
    }

    /// Close from the server side.
    pub fn close(&self, code: u16, reason: &str) {
        let _ = self.push.send(SocketEvent::Closed {
            code,
            reason: reason.to_string(),
        });
    }

    /// Drain every frame the client has written so far.
    pub fn drain(&mut self) -> Vec<OutboundFrame> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.sent.try_recv() {
            frames.push(frame);
        }
        frames
    }

    /// Drain and decode the text frames the client has written so far.
    pub fn sent_frames(&mut self) -> Vec<ClientFrame> {
        self.drain()
            .into_iter()
            .filter_map(|frame| match frame {
                OutboundFrame::Text(text) => serde_json::from_str(&text).ok(),
                OutboundFrame::Close { .. } => None,
            })
            .collect()
    }

    /// Drain until the client's close frame, if it sent one.
    pub fn next_close(&mut self) -> Option<(u16, String)> {
        self.drain().into_iter().find_map(|frame| match frame {
            OutboundFrame::Close { code, reason } => Some((code, reason)),
            OutboundFrame::Text(_) => None,
        })
    }
}
