//! Execution sandbox for pluggable language modules
//!
//! Runs untrusted code under a capability boundary: WASM-backed language
//! modules with bounded memory and caller-enforced timeouts, a denylist for
//! native modules requested by in-process script code, and a message-passing
//! worker protocol so each language executes in an isolated context.

pub mod config;
pub mod denylist;
mod error;
mod service;
mod unit;
pub mod wasm;
pub mod worker;

pub use config::{
    DependencySpec, EditorMeta, UnitConfig, DEFAULT_MEMORY_LIMIT_BYTES, DEFAULT_TIMEOUT_MS,
    WASM_PAGE_SIZE,
};
pub use error::{SandboxError, UnitError};
pub use service::Sandbox;
pub use unit::{BufferSink, OutputSink, StreamKind, UnitState};
pub use wasm::{WasmUnit, ALLOCATOR_PAIRS, ENTRY_POINTS};
pub use worker::{UnitStatus, WorkerHandle, WorkerMessage, WorkerResponse};

/// Re-export common error type
pub type Result<T> = anyhow::Result<T>;
