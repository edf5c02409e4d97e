//! Shared data structures and utilities for the cognitive task management engine
//!
//! This crate contains the task data model, configuration structures, and
//! utilities used by the `ctm` binary. It has no durable I/O of its own;
//! persistence is owned by the state store in the binary crate.

pub mod config;
pub mod defaults;
pub mod task;
pub mod utils;

// Re-export commonly used types for convenience
pub use config::{CtmConfig, MemoryProfile, PriorityWeights};
pub use task::{PriorityLevel, Task, TaskStatus};
pub use utils::{fingerprint, generate_task_id};

/// Result type alias used throughout the workspace
pub type Result<T> = anyhow::Result<T>;

/// Error taxonomy for the task management engine.
///
/// These are the only error kinds callers branch on; anything else travels
/// as an opaque `anyhow` chain. The store's optimistic update loop downcasts
/// to `ConcurrentModification` to decide whether to retry.
#[derive(Debug, thiserror::Error)]
pub enum CtmError {
    #[error("unknown task: {0}")]
    NotFound(String),

    #[error("illegal status transition: {from} -> {to}")]
    IllegalTransition { from: String, to: String },

    #[error("concurrent modification of task {id}: expected version {expected}, found {found}")]
    ConcurrentModification {
        id: String,
        expected: u64,
        found: u64,
    },

    #[error("gave up after {attempts} conflicting writes to task {id}")]
    ConflictAbandoned { id: String, attempts: u32 },

    #[error("storage failure: {0}")]
    Storage(String),

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("task {id} uses schema version {found}, newer than supported {supported}")]
    SchemaMismatch { id: String, found: u32, supported: u32 },
}

#[cfg(test)]
mod tests;
