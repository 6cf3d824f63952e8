//! Desktop platform implementations
//!
//! Provides platform-specific implementations for desktop using
//! standard library and native crates.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use directories::ProjectDirs;

use crate::ports::outbound::{ClockPort, CredentialProvider, StorageError, StorageProvider};

/// Wall clock backed by chrono.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl ClockPort for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Desktop storage provider with file-based persistence
///
/// Stores key-value pairs in a JSON file at:
/// - Linux: ~/.config/racketeer/client/storage.json
/// - macOS: ~/Library/Application Support/io.racketeer.client/storage.json
/// - Windows: C:\Users\<User>\AppData\Roaming\racketeer\client\storage.json
///
/// Every mutation is written through to disk before returning.
#[derive(Clone)]
pub struct FileStorageProvider {
    storage_path: PathBuf,
    cache: Arc<RwLock<HashMap<String, String>>>,
}

impl FileStorageProvider {
    /// Storage file in the platform config directory.
    pub fn new() -> Result<Self, StorageError> {
        let storage_path = if let Some(dirs) = ProjectDirs::from("io", "racketeer", "client") {
            dirs.config_dir().join("storage.json")
        } else {
            // Fallback to current directory if project dirs unavailable
            PathBuf::from("racketeer_storage.json")
        };
        Self::at(storage_path)
    }

    /// Storage file at an explicit path.
    ///
    /// A missing file starts empty. A corrupt file is logged and replaced on
    /// the next write.
    pub fn at(storage_path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let storage_path = storage_path.into();
        let cache = match fs::read_to_string(&storage_path) {
            Ok(data) => match serde_json::from_str::<HashMap<String, String>>(&data) {
                Ok(map) => map,
                Err(e) => {
                    tracing::warn!("Failed to parse storage file: {}", e);
                    HashMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };

        tracing::debug!("Desktop storage initialized at: {:?}", storage_path);

        Ok(Self {
            storage_path,
            cache: Arc::new(RwLock::new(cache)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.storage_path
    }

    /// Persist a snapshot of the cache to disk
    fn persist(&self, snapshot: &HashMap<String, String>) -> Result<(), StorageError> {
        if let Some(parent) = self.storage_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let data = serde_json::to_string_pretty(snapshot)?;

        // Write beside the target then rename, so a crash never leaves half a file
        let tmp = self.storage_path.with_extension("json.tmp");
        fs::write(&tmp, data)?;
        fs::rename(&tmp, &self.storage_path)?;
        Ok(())
    }

    fn mutate(&self, apply: impl FnOnce(&mut HashMap<String, String>)) -> Result<(), StorageError> {
        let mut guard = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        apply(&mut guard);
        if let Err(e) = self.persist(&guard) {
            tracing::error!("Failed to write storage file: {}", e);
            return Err(e);
        }
        Ok(())
    }
}

impl StorageProvider for FileStorageProvider {
    fn load(&self, key: &str) -> Result<Option<String>, StorageError> {
        let guard = self.cache.read().unwrap_or_else(PoisonError::into_inner);
        Ok(guard.get(key).cloned())
    }

    fn save(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.mutate(|map| {
            map.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.mutate(|map| {
            map.remove(key);
        })
    }
}

/// Environment variable holding the bearer credential.
pub const TOKEN_ENV: &str = "RACKETEER_TOKEN";

/// Reads the bearer credential from the environment on every call, so a
/// refreshed token is picked up by the next connect attempt.
#[derive(Debug, Clone, Default)]
pub struct EnvCredentialProvider;

impl CredentialProvider for EnvCredentialProvider {
    fn bearer_token(&self) -> Option<String> {
        std::env::var(TOKEN_ENV)
            .ok()
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty())
    }
}

/// Fixed credential, replaceable at runtime (login/logout).
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    token: Arc<RwLock<Option<String>>>,
}

impl StaticCredentials {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: Arc::new(RwLock::new(token)),
        }
    }

    pub fn set(&self, token: Option<String>) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = token;
    }
}

impl CredentialProvider for StaticCredentials {
    fn bearer_token(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
