//! Shared helpers for the connection manager and its transports.
//!
//! This module is intentionally runtime-agnostic (no tokio) so the constants
//! and URL derivation can be reused by any transport adapter.

use url::Url;

// Reconnection constants
pub const INITIAL_RETRY_DELAY_MS: u64 = 1_000;
pub const MAX_RETRY_DELAY_MS: u64 = 30_000;
pub const MAX_RETRY_ATTEMPTS: u32 = 10;
pub const BACKOFF_MULTIPLIER: f64 = 2.0;

// Heartbeat constants
pub const HEARTBEAT_INTERVAL_MS: u64 = 30_000;
pub const HEARTBEAT_TIMEOUT_MS: u64 = 10_000;

/// Path of the real-time endpoint on the game server.
pub const SOCKET_PATH: &str = "/ws";

/// Error deriving the socket endpoint from the HTTP origin.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot derive socket endpoint from {origin}: {reason}")]
pub struct EndpointError {
    pub origin: String,
    pub reason: &'static str,
}

/// Build the socket URL: scheme `http`→`ws` / `https`→`wss`, path `/ws`, and
/// the bearer credential in the `token` query parameter.
pub fn socket_url(origin: &Url, token: &str) -> Result<Url, EndpointError> {
    let scheme = match origin.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        _ => {
            return Err(EndpointError {
                origin: origin.to_string(),
                reason: "unsupported scheme",
            })
        }
    };

    let mut url = origin.clone();
    url.set_scheme(scheme).map_err(|()| EndpointError {
        origin: origin.to_string(),
        reason: "scheme cannot be substituted",
    })?;
    url.set_path(SOCKET_PATH);
    url.set_fragment(None);
    url.query_pairs_mut().clear().append_pair("token", token);
    Ok(url)
}
