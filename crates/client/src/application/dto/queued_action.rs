//! Queue records and the events the action queue publishes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use racketeer_shared::{ActionType, GameAction};

/// Opaque unique id of a queued action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionId(Uuid);

impl ActionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ActionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ActionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Where an action stands relative to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Waiting for a sync pass
    Pending,
    /// Submitted, verdict outstanding
    Syncing,
    /// Server agreed with the prediction
    Synced,
    /// Server applied the action with a different outcome
    Adjusted,
    /// Server refused the action, or retries ran out
    Rejected,
}

impl SyncStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SyncStatus::Synced | SyncStatus::Adjusted | SyncStatus::Rejected
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::Syncing => "syncing",
            SyncStatus::Synced => "synced",
            SyncStatus::Adjusted => "adjusted",
            SyncStatus::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A locally predicted action awaiting (or past) server confirmation.
///
/// This is also the persisted shape: the whole queue is stored as a JSON
/// array of these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedAction {
    pub id: ActionId,
    pub action: GameAction,
    /// Outcome the player was already shown
    pub local_result: Value,
    pub enqueued_at: DateTime<Utc>,
    pub status: SyncStatus,
    /// Submissions made so far, authentication failures excluded
    #[serde(default)]
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_result: Option<Value>,
    /// Adjustment shown to the player when the server disagreed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reconciliation: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// When a terminal status was reached
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl QueuedAction {
    pub fn new(action: GameAction, local_result: Value, enqueued_at: DateTime<Utc>) -> Self {
        Self {
            id: ActionId::new(),
            action,
            local_result,
            enqueued_at,
            status: SyncStatus::Pending,
            attempts: 0,
            server_result: None,
            reconciliation: None,
            last_error: None,
            completed_at: None,
        }
    }

    pub fn action_type(&self) -> ActionType {
        self.action.action_type()
    }
}

/// The server's outcome differed from what the player was shown.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciliationEvent {
    pub action_id: ActionId,
    pub action_type: ActionType,
    pub local_result: Value,
    pub server_result: Value,
    pub adjustments: Value,
}

/// Outcome counts of one sync pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub submitted: usize,
    pub synced: usize,
    pub adjusted: usize,
    pub rejected: usize,
    /// Left Pending after a transient failure
    pub retrying: usize,
    /// The pass did not run: another pass was in flight, or the host is offline
    pub skipped: bool,
    /// The pass stopped early on an authentication failure
    pub aborted: bool,
}

impl SyncReport {
    pub fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }

    /// Actions the server confirmed in this pass.
    pub fn confirmed(&self) -> usize {
        self.synced + self.adjusted
    }
}

/// Notifications published by the action queue.
#[derive(Debug, Clone, PartialEq)]
pub enum QueueEvent {
    LengthChanged(usize),
    StatusChanged { id: ActionId, status: SyncStatus },
    Reconciled(ReconciliationEvent),
    /// The submission endpoint refused the credential; prompt for login
    AuthenticationRequired { reason: String },
    SyncCompleted(SyncReport),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_terminal_statuses() {
        assert!(!SyncStatus::Pending.is_terminal());
        assert!(!SyncStatus::Syncing.is_terminal());
        assert!(SyncStatus::Synced.is_terminal());
        assert!(SyncStatus::Adjusted.is_terminal());
        assert!(SyncStatus::Rejected.is_terminal());
    }

    #[test]
    fn test_persisted_shape() {
        let at = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).single().expect("date");
        let action = QueuedAction::new(GameAction::crime("mugging"), json!({"cash": 20}), at);

        let value = serde_json::to_value(&action).expect("serialize");
        assert_eq!(value["action"], json!({"type": "crime", "payload": {"crime_id": "mugging"}}));
        assert_eq!(value["localResult"], json!({"cash": 20}));
        assert_eq!(value["status"], json!("pending"));
        assert_eq!(value["enqueuedAt"], json!("2026-01-02T03:04:05Z"));
        assert!(value.get("serverResult").is_none());

        let back: QueuedAction = serde_json::from_value(value).expect("deserialize");
        assert_eq!(back, action);
    }
}
