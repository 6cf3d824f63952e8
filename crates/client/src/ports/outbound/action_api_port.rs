//! Action API Port - outbound port for submitting queued actions
//!
//! Submissions go over plain request/response HTTP, not the socket, so the
//! queue can drain even while the real-time connection is still reconnecting.

use async_trait::async_trait;
use racketeer_shared::{GameAction, SubmitActionRequest, SubmitActionResponse};

/// Why a submission did not produce a server verdict.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    /// Server unreachable, timed out, or temporarily failing. Retryable.
    #[error("transient network error: {0}")]
    Transient(String),

    /// Credential refused. Never retried with the same credential.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Server refused the request outright (business rule, not transport)
    #[error("rejected by server: {0}")]
    Rejected(String),

    /// Server answered but the body could not be decoded
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl SubmitError {
    /// Whether the action should stay queued for a later pass.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SubmitError::Transient(_) | SubmitError::InvalidResponse(_))
    }
}

/// Submits one action and returns the server's verdict.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ActionApiPort: Send + Sync {
    async fn submit(
        &self,
        action: &GameAction,
        request: &SubmitActionRequest,
    ) -> Result<SubmitActionResponse, SubmitError>;
}
