//! Platform-specific implementations
//!
//! This module provides the host-side implementations of the platform
//! traits defined in ports/outbound/platform.rs.

mod desktop;
mod memory;

pub use desktop::{
    EnvCredentialProvider, FileStorageProvider, StaticCredentials, SystemClock, TOKEN_ENV,
};
pub use memory::MemoryStorageProvider;
