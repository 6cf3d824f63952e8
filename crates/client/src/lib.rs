//! Racketeer game client core.
//!
//! One persistent real-time connection to the game server plus an offline
//! queue of locally predicted actions, composed per session.

pub mod application;
pub mod config;
pub mod infrastructure;
pub mod ports;
pub mod session;

pub use config::{ClientConfig, ConfigError};
pub use session::{GameSession, SessionDeps};
