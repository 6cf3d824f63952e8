//! Data transfer objects for the application layer

pub mod queued_action;

pub use queued_action::{
    ActionId, QueueEvent, QueuedAction, ReconciliationEvent, SyncReport, SyncStatus,
};
