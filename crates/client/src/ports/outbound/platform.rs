//! Platform abstraction ports
//!
//! These traits abstract host-provided operations so that:
//! 1. Application code remains platform-agnostic
//! 2. Platform-specific code is isolated in infrastructure
//! 3. Code becomes easily testable with fake implementations
//!
//! All ports are object-safe and `Send + Sync` so services can hold them as
//! `Arc<dyn ...>` and be shared across tasks.

use chrono::{DateTime, Utc};

/// Errors from the durable key-value store.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Persistent key-value storage (localStorage / file-based).
///
/// Writes are synchronous and complete only once durable.
pub trait StorageProvider: Send + Sync {
    /// Load a string value by key, `None` if absent
    fn load(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Save a string value under the given key
    fn save(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove a value by key. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Source of the bearer credential issued by the external auth collaborator.
pub trait CredentialProvider: Send + Sync {
    /// Current bearer token, `None` when the player is not logged in
    fn bearer_token(&self) -> Option<String>;
}

/// Wall-clock time, injectable for retention and staleness checks.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait ClockPort: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Storage key constants
///
/// Kept in the ports layer as they define the contract for what keys are
/// persisted across restarts.
pub mod storage_keys {
    /// Full action queue, JSON array
    pub const ACTION_QUEUE: &str = "racketeer_action_queue";
    /// Last successful sync pass, RFC 3339
    pub const LAST_SYNC: &str = "racketeer_last_sync";
}
