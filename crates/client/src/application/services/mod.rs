//! Application services
//!
//! Services depend on port traits, not concrete infrastructure
//! implementations.

pub mod action_queue;
pub mod reconcile;

pub use action_queue::{ActionQueue, QueueConfig};
pub use reconcile::{classify, diff_results, Verdict};
