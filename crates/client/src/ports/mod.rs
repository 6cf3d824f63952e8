//! Client port definitions.
//!
//! Ports are the traits infrastructure adapters implement; application
//! services depend only on these.

pub mod outbound;
