//! Racketeer client - composition root binary.

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use racketeer_client::application::dto::QueueEvent;
use racketeer_client::infrastructure::http_client::HttpActionApi;
use racketeer_client::infrastructure::platform::{
    EnvCredentialProvider, FileStorageProvider, SystemClock,
};
use racketeer_client::infrastructure::websocket::TungsteniteConnector;
use racketeer_client::infrastructure::ConnectionEvent;
use racketeer_client::{ClientConfig, GameSession, SessionDeps};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "racketeer_client=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = dotenvy::dotenv() {
        tracing::debug!(error = %e, "No .env file loaded");
    }

    let config = ClientConfig::from_env().context("invalid client configuration")?;
    tracing::info!(server = %config.server_url, "Starting Racketeer client");

    let storage = FileStorageProvider::new().context("cannot open local storage")?;
    tracing::debug!(path = %storage.path().display(), "Using local storage");

    let credentials = Arc::new(EnvCredentialProvider);
    let api = HttpActionApi::with_timeout(
        config.server_url.clone(),
        credentials.clone(),
        config.request_timeout,
    )
    .context("cannot build HTTP client")?;

    let session = GameSession::new(
        &config,
        SessionDeps {
            storage: Arc::new(storage),
            credentials,
            connector: Arc::new(TungsteniteConnector),
            api: Arc::new(api),
            clock: Arc::new(SystemClock),
        },
    )
    .context("cannot restore action queue")?;

    let _connection_events = session.connection().events().subscribe(|event| match event {
        ConnectionEvent::StateChanged { current, .. } => {
            tracing::info!(state = %current, "Connection state changed")
        }
        ConnectionEvent::AuthenticationFailed { code, reason } => {
            tracing::warn!(code, %reason, "Server refused credential; log in again")
        }
        ConnectionEvent::MaxRetriesExhausted { attempts } => {
            tracing::error!(attempts, "Gave up reconnecting")
        }
        ConnectionEvent::ReconnectAbandoned { reason } => {
            tracing::error!(%reason, "Stopped reconnecting; log in again")
        }
        other => tracing::debug!(event = ?other, "Connection event"),
    });
    let _frames = session.connection().on_any(|frame| {
        tracing::debug!(kind = frame.kind(), "Server frame");
    });
    let _queue_events = session.queue().events().subscribe(|event| match event {
        QueueEvent::Reconciled(r) => tracing::info!(
            action_id = %r.action_id,
            action_type = %r.action_type,
            adjustments = %r.adjustments,
            "Server adjusted an action"
        ),
        QueueEvent::AuthenticationRequired { reason } => {
            tracing::warn!(%reason, "Action submission needs a fresh login")
        }
        other => tracing::debug!(event = ?other, "Queue event"),
    });

    if let Err(e) = session.start().await {
        tracing::warn!(error = %e, "Initial connection failed; retrying in the background");
    }

    let report = session.queue().sync_all().await;
    tracing::info!(
        synced = report.synced,
        adjusted = report.adjusted,
        rejected = report.rejected,
        pending = session.queue().pending_count(),
        "Initial sync finished"
    );

    tokio::signal::ctrl_c()
        .await
        .context("cannot listen for Ctrl-C")?;
    tracing::info!("Shutting down");
    session.shutdown().await;

    Ok(())
}
