//! Shared types for the codebench execution sandbox
//!
//! Value objects exchanged between the orchestrator, execution units and
//! workers, plus the batching queue used to coalesce bursty state updates.

pub mod queue;
pub mod types;

pub use queue::{StateSink, Update, UpdateQueue};
pub use types::{ExecutionRequest, ExecutionResult};

/// Re-export common error type
pub type Result<T> = anyhow::Result<T>;
