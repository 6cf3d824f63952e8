//! In-crate fakes for exercising the client without a network or a real clock.
//!
//! Available to unit tests and, behind the `testing` feature, to downstream
//! integration tests.

mod clock;
mod socket;

pub use clock::ManualClock;
pub use socket::{FakeConnector, ServerEnd};
