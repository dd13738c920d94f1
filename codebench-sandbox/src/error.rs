//! Sandbox error taxonomy
//!
//! Execution failures (traps, aborts, missing entry points) are never
//! errors: they are reported inside `ExecutionResult` with exit code 1.
//! These enums cover the conditions callers branch on.

use thiserror::Error;

/// Lifecycle errors raised by an execution unit.
#[derive(Debug, Error)]
pub enum UnitError {
    /// Artifact missing, malformed, or failed compile-time validation
    #[error("failed to load module: {0}")]
    Load(String),

    /// Module's import surface does not match the provided capabilities
    #[error("failed to instantiate module: {0}")]
    Instantiation(String),

    /// Use after `dispose()`
    #[error("execution unit has been disposed")]
    Disposed,

    /// Operation requires a loaded module
    #[error("execution unit is not loaded")]
    NotLoaded,

    /// Operation requires a live instance
    #[error("execution unit has no live instance")]
    NotInstantiated,
}

/// Errors surfaced by the worker controller and orchestration facade.
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error(transparent)]
    Unit(#[from] UnitError),

    /// Caller-side timeout elapsed; the execution is abandoned and any late
    /// response is discarded
    #[error("execution timed out after {0} ms")]
    Timeout(u64),

    #[error("language '{0}' is not registered")]
    UnknownLanguage(String),

    /// Worker must respond `ready` before accepting executions
    #[error("worker for language '{0}' is not ready")]
    NotReady(String),

    /// Failure reported by the isolated execution context
    #[error("worker error: {0}")]
    Worker(String),

    #[error("worker channel closed")]
    ChannelClosed,
}
