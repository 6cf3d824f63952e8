//! Application layer: the offline action queue and its model.

pub mod dto;
pub mod error;
pub mod services;

pub use error::{QueueError, QueueResult};
