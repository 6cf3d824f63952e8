//! Racketeer Shared - wire contract between the game client and server
//!
//! This crate contains the types both sides serialize:
//! - WebSocket frames (`ClientFrame`, `ServerFrame`) and close codes
//! - Gameplay actions and the HTTP submission envelope
//!
//! # Design Principles
//!
//! 1. **Minimal dependencies** - only serde and serde_json
//! 2. **No business logic** - pure data types and serialization
//! 3. **Forward compatible** - unknown server frame types decode to `Unknown`

pub mod actions;
pub mod messages;

pub use actions::{
    ActionType, GameAction, PropertyOperation, SubmitActionRequest, SubmitActionResponse,
};
pub use messages::{close_codes, ClientFrame, NotificationLevel, ServerFrame};
