//! Execution unit configuration
//!
//! One `UnitConfig` per contributed language, constructed from an already
//! schema-validated manifest entry and immutable thereafter.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// WASM linear memory page size in bytes.
pub const WASM_PAGE_SIZE: u64 = 64 * 1024;

/// Default memory ceiling: 128 MiB (2048 pages).
pub const DEFAULT_MEMORY_LIMIT_BYTES: u64 = 128 * 1024 * 1024;

/// Default caller-side execution timeout.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// A dependency declared by a language module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencySpec {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Integrity checksum of the artifact
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
}

/// Editor-display metadata for a language module.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EditorMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment_prefix: Option<String>,
}

/// Configuration for one loadable language execution unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitConfig {
    /// Stable language identifier (e.g. "rust", "cpp")
    pub language_id: String,

    /// Display name shown in the editor
    pub display_name: String,

    /// File extensions handled by this language
    #[serde(default)]
    pub extensions: Vec<String>,

    /// Semantic version of the module
    pub version: String,

    /// Location of the compiled WASM module
    pub module_path: PathBuf,

    /// Optional bridging code shipped alongside the module
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bridge_path: Option<PathBuf>,

    #[serde(default)]
    pub editor: EditorMeta,

    /// Dependencies this module declares
    #[serde(default)]
    pub dependencies: Vec<DependencySpec>,

    /// Memory ceiling in bytes; rounded up to whole 64 KiB pages
    #[serde(default = "default_memory_limit")]
    pub memory_limit_bytes: u64,

    /// Caller-side execution timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_memory_limit() -> u64 {
    DEFAULT_MEMORY_LIMIT_BYTES
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

impl UnitConfig {
    /// Configuration with contract defaults (128 MiB, 30 s).
    pub fn new(
        language_id: impl Into<String>,
        display_name: impl Into<String>,
        module_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            language_id: language_id.into(),
            display_name: display_name.into(),
            extensions: Vec::new(),
            version: "0.1.0".to_string(),
            module_path: module_path.into(),
            bridge_path: None,
            editor: EditorMeta::default(),
            dependencies: Vec::new(),
            memory_limit_bytes: DEFAULT_MEMORY_LIMIT_BYTES,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }

    pub fn with_memory_limit(mut self, bytes: u64) -> Self {
        self.memory_limit_bytes = bytes;
        self
    }

    pub fn with_timeout_ms(mut self, millis: u64) -> Self {
        self.timeout_ms = millis;
        self
    }

    /// Memory ceiling in whole pages. A limit that is not a multiple of the
    /// page size is rounded up.
    pub fn memory_pages(&self) -> u64 {
        self.memory_limit_bytes.div_ceil(WASM_PAGE_SIZE)
    }

    /// The page-aligned byte ceiling actually enforced.
    pub fn page_aligned_limit(&self) -> u64 {
        self.memory_pages() * WASM_PAGE_SIZE
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
