//! Outbound ports - Interfaces for external services
//!
//! These ports define the contracts that infrastructure adapters must implement,
//! allowing application services to interact with external systems without
//! depending on concrete implementations.

pub mod action_api_port;
pub mod platform;
pub mod socket_port;

pub use action_api_port::{ActionApiPort, SubmitError};
pub use platform::{storage_keys, ClockPort, CredentialProvider, StorageError, StorageProvider};
pub use socket_port::{OutboundFrame, SocketConnector, SocketEvent, SocketLink, TransportError};

#[cfg(any(test, feature = "testing"))]
pub use action_api_port::MockActionApiPort;
#[cfg(any(test, feature = "testing"))]
pub use platform::MockClockPort;
