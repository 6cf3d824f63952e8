//! Game session: the explicit owner of one connection and one action queue.
//!
//! There are no process-wide singletons. Whoever needs the connection or the
//! queue gets a clone of the handle from here.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use racketeer_shared::GameAction;

use crate::application::dto::ActionId;
use crate::application::services::ActionQueue;
use crate::application::{QueueError, QueueResult};
use crate::config::ClientConfig;
use crate::infrastructure::websocket::{ConnectionError, ConnectionManager};
use crate::ports::outbound::{
    ActionApiPort, ClockPort, CredentialProvider, SocketConnector, StorageProvider,
};

/// Adapters a session is built from.
pub struct SessionDeps {
    pub storage: Arc<dyn StorageProvider>,
    pub credentials: Arc<dyn CredentialProvider>,
    pub connector: Arc<dyn SocketConnector>,
    pub api: Arc<dyn ActionApiPort>,
    pub clock: Arc<dyn ClockPort>,
}

pub struct GameSession {
    connection: ConnectionManager,
    queue: ActionQueue,
    channels: Vec<String>,
    connectivity: watch::Sender<bool>,
    hook: JoinHandle<()>,
}

impl GameSession {
    /// Restore the queue and spawn the connection driver. Opens nothing yet.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn new(config: &ClientConfig, deps: SessionDeps) -> Result<Self, QueueError> {
        let queue = ActionQueue::load(
            deps.storage,
            deps.api,
            deps.clock,
            config.queue.clone(),
        )?;
        let connection = ConnectionManager::new(
            config.connection.clone(),
            deps.connector,
            deps.credentials,
        );

        let (connectivity, signal) = watch::channel(true);
        let hook = queue.spawn_connectivity_hook(signal);

        Ok(Self {
            connection,
            queue,
            channels: config.channels.clone(),
            connectivity,
            hook,
        })
    }

    /// Join the configured channels and open the connection.
    ///
    /// Subscriptions are recorded first, so they go out as soon as the socket
    /// opens and again after every reconnect.
    pub async fn start(&self) -> Result<(), ConnectionError> {
        for channel in &self.channels {
            self.connection.subscribe(channel.clone());
        }
        self.connection.connect().await
    }

    /// Record a locally applied action and try to confirm it right away.
    pub fn perform(&self, action: GameAction, local_result: Value) -> QueueResult<ActionId> {
        let id = self.queue.enqueue(action, local_result)?;
        if self.queue.is_online() {
            let queue = self.queue.clone();
            tokio::spawn(async move { queue.sync_all().await });
        }
        Ok(id)
    }

    /// Host connectivity signal. Coming back online starts a sync pass.
    pub fn set_online(&self, online: bool) {
        self.connectivity.send_replace(online);
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    pub fn queue(&self) -> &ActionQueue {
        &self.queue
    }

    pub fn channels(&self) -> &[String] {
        &self.channels
    }

    /// Close the connection and stop following connectivity.
    pub async fn shutdown(self) {
        self.hook.abort();
        self.connection.disconnect().await;
        tracing::info!(queued = self.queue.len(), "Session closed");
    }
}
