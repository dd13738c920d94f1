//! Dependency install state machine
//!
//! Tracks per-dependency installation state with bounded retry. Untrusted
//! code may declare a need for an external package; the orchestrator drives
//! each record through `Pending -> Installing -> {Installed | Failed}` and
//! may retry a failed install only while the attempt counter is under the
//! ceiling. At the ceiling the record is frozen until an explicit reset.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Maximum automatic install attempts before a record freezes.
pub const MAX_INSTALL_ATTEMPTS: u32 = 3;

/// Default machine error code when none is supplied.
pub const DEFAULT_ERROR_CODE: &str = "INSTALL_ERROR";

/// Structured install failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallError {
    pub code: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Tracked state for one dependency.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstallRecord {
    /// Resolved version, once known
    pub version: Option<String>,

    /// An install is currently running for this record
    pub installing: bool,

    /// The dependency is installed and usable
    pub is_installed: bool,

    /// Monotonically non-decreasing until explicitly reset
    pub install_attempts: u32,

    /// Last human-readable error message
    pub last_error: Option<String>,

    /// Last structured error (code, message, timestamp)
    pub error: Option<InstallError>,
}

/// Errors surfaced by install transitions.
#[derive(Debug, Error)]
pub enum InstallFailure {
    #[error("dependency '{0}' exhausted its {MAX_INSTALL_ATTEMPTS} install attempts")]
    AttemptsExhausted(String),

    #[error("dependency '{0}' already has an install in progress")]
    AlreadyInstalling(String),
}

/// Per-dependency install records plus the derived aggregate flag.
#[derive(Debug, Default)]
pub struct PackageStore {
    records: HashMap<String, InstallRecord>,
    /// Recomputed from all records on every transition, never toggled
    /// independently.
    any_installing: bool,
}

impl PackageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a dependency.
    ///
    /// A fresh name creates a pending record. An existing record under the
    /// retry ceiling is treated as a fresh attempt window: error and
    /// install/installing flags are cleared, the record is not duplicated.
    /// An existing record at the ceiling keeps its last error; the caller
    /// must reset attempts explicitly before retrying.
    pub fn add_package(&mut self, name: &str) {
        let record = self.records.entry(name.to_string()).or_default();
        if record.install_attempts < MAX_INSTALL_ATTEMPTS {
            record.installing = false;
            record.is_installed = false;
            record.last_error = None;
            record.error = None;
        } else {
            tracing::debug!(
                package = name,
                attempts = record.install_attempts,
                "re-registered package at retry ceiling; keeping last error"
            );
        }
        self.recompute_installing();
    }

    /// Begin an install attempt. Counts the attempt, clears any prior error
    /// and raises the aggregate installing flag.
    pub fn begin_install(&mut self, name: &str) -> Result<(), InstallFailure> {
        let record = self.records.entry(name.to_string()).or_default();
        if record.installing {
            return Err(InstallFailure::AlreadyInstalling(name.to_string()));
        }
        if record.install_attempts >= MAX_INSTALL_ATTEMPTS {
            return Err(InstallFailure::AttemptsExhausted(name.to_string()));
        }
        record.install_attempts += 1;
        record.installing = true;
        record.last_error = None;
        record.error = None;
        self.recompute_installing();
        Ok(())
    }

    /// Mark a dependency installed. Records the resolved version if provided,
    /// otherwise preserves the prior known version.
    pub fn set_installed(&mut self, name: &str, version: Option<&str>) {
        let record = self.records.entry(name.to_string()).or_default();
        record.is_installed = true;
        record.installing = false;
        record.last_error = None;
        record.error = None;
        if let Some(version) = version {
            record.version = Some(version.to_string());
        }
        self.recompute_installing();
    }

    /// Record or clear the error on a dependency.
    ///
    /// `Some(message)` stores the human message plus a structured error with
    /// the given code (default `INSTALL_ERROR`) and a timestamp. `None`
    /// clears the structured error entirely; "no error" is distinct from
    /// "error with empty message".
    pub fn set_package_error(&mut self, name: &str, message: Option<&str>, code: Option<&str>) {
        let record = self.records.entry(name.to_string()).or_default();
        record.installing = false;
        match message {
            Some(message) => {
                record.last_error = Some(message.to_string());
                record.error = Some(InstallError {
                    code: code.unwrap_or(DEFAULT_ERROR_CODE).to_string(),
                    message: message.to_string(),
                    timestamp: Utc::now(),
                });
            }
            None => {
                record.last_error = None;
                record.error = None;
            }
        }
        self.recompute_installing();
    }

    /// Clear attempts and error state so a frozen record becomes retryable.
    pub fn reset_attempts(&mut self, name: &str) {
        if let Some(record) = self.records.get_mut(name) {
            record.install_attempts = 0;
            record.installing = false;
            record.last_error = None;
            record.error = None;
        }
        self.recompute_installing();
    }

    /// Whether an install may be started for this name. Untracked names are
    /// treated optimistically as retryable.
    pub fn can_retry_install(&self, name: &str) -> bool {
        self.records
            .get(name)
            .map(|record| record.install_attempts < MAX_INSTALL_ATTEMPTS)
            .unwrap_or(true)
    }

    /// Lookup by name.
    pub fn get(&self, name: &str) -> Option<&InstallRecord> {
        self.records.get(name)
    }

    /// All dependencies that are registered but not yet installed.
    pub fn pending_packages(&self) -> Vec<&str> {
        let mut pending: Vec<&str> = self
            .records
            .iter()
            .filter(|(_, record)| !record.is_installed)
            .map(|(name, _)| name.as_str())
            .collect();
        pending.sort_unstable();
        pending
    }

    /// True while any record has an install in progress.
    pub fn any_installing(&self) -> bool {
        self.any_installing
    }

    fn recompute_installing(&mut self) {
        self.any_installing = self.records.values().any(|record| record.installing);
    }
}
