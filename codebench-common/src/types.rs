//! Core types for sandbox execution

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Request to execute code in a language module
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    /// The source text to execute
    pub code: String,

    /// Optional timeout override in milliseconds (None = unit default)
    pub timeout_ms: Option<u64>,

    /// Optional memory ceiling override in bytes, capped at the unit's
    /// configured limit. The execution runs against an instance sized to
    /// the effective ceiling.
    pub memory_limit_bytes: Option<u64>,

    /// Whether to capture stdout
    #[serde(default = "default_true")]
    pub capture_stdout: bool,

    /// Whether to capture stderr
    #[serde(default = "default_true")]
    pub capture_stderr: bool,

    /// Environment variables visible to the execution
    #[serde(default)]
    pub env: HashMap<String, String>,
}

fn default_true() -> bool {
    true
}

impl ExecutionRequest {
    /// Create a simple execution request with defaults
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            timeout_ms: None,
            memory_limit_bytes: None,
            capture_stdout: true,
            capture_stderr: true,
            env: HashMap::new(),
        }
    }

    /// Set timeout in milliseconds
    pub fn with_timeout_ms(mut self, millis: u64) -> Self {
        self.timeout_ms = Some(millis);
        self
    }

    /// Add an environment variable
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

/// Result of one execution. Immutable value object.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Exit code (0 = success)
    pub exit_code: i32,

    /// Captured stdout
    pub stdout: String,

    /// Captured stderr
    pub stderr: String,

    /// Optional error message
    pub error: Option<String>,

    /// Wall-clock duration in milliseconds
    pub duration_ms: u64,

    /// Peak linear-memory usage observed, if the unit reports it
    pub peak_memory_bytes: Option<u64>,
}

impl ExecutionResult {
    /// Check if execution succeeded
    pub fn success(&self) -> bool {
        self.exit_code == 0 && self.error.is_none()
    }

    /// A failed result carrying an explanation on stderr.
    ///
    /// Traps, aborts and missing entry points are reported this way rather
    /// than propagated as errors.
    pub fn failed(message: impl Into<String>, duration_ms: u64) -> Self {
        let message = message.into();
        Self {
            exit_code: 1,
            stdout: String::new(),
            stderr: format!("{}\n", message),
            error: Some(message),
            duration_ms,
            peak_memory_bytes: None,
        }
    }
}
