//! Persistence of the firewall policy and live temporary bans.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{PolicyConfig, TemporaryBan};

/// Errors that can occur while loading or saving the policy
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Everything written to the policy file.
///
/// The policy fields sit at the top level of the document next to
/// `temporary_bans`; unknown keys are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    #[serde(flatten)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub temporary_bans: Vec<TemporaryBan>,
}

/// Durable home of the policy.
#[cfg_attr(test, mockall::automock)]
pub trait ConfigStore: Send + Sync {
    /// Returns `None` when nothing has been persisted yet.
    fn load(&self) -> Result<Option<PersistedState>, StoreError>;

    fn persist(&self, state: &PersistedState) -> Result<(), StoreError>;
}

/// Pretty-printed JSON file store
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl ConfigStore for JsonFileStore {
    fn load(&self) -> Result<Option<PersistedState>, StoreError> {
        let data = match fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_error(e)),
        };

        Ok(Some(serde_json::from_str(&data)?))
    }

    fn persist(&self, state: &PersistedState) -> Result<(), StoreError> {
        let data = serde_json::to_string_pretty(state)?;

        // Write to a sibling first so a crash never leaves a truncated policy.
        let staging = self.path.with_extension("json.tmp");
        fs::write(&staging, data).map_err(|e| self.io_error(e))?;
        fs::rename(&staging, &self.path).map_err(|e| self.io_error(e))
    }
}
