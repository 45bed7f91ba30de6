//! Error taxonomy of the content cache.
//!
//! - `CacheError`: what callers of the controller / pipeline / updaters see.
//! - `TaskError`: one failed per-entity rebuild task (captured, never thrown past the barrier).
//!
//! Internal helpers (file format, lock file, fixtures) keep returning `anyhow::Result`
//! and are converted at the public edge.

use std::fmt;
use thiserror::Error;

pub type CacheResult<T> = std::result::Result<T, CacheError>;

#[derive(Debug, Error)]
pub enum CacheError {
    /// Invalid setting, or the persisted file location is unusable.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A datastore call failed outside of a per-entity task (session, top-level listing).
    #[error("datasource query failed: {0:#}")]
    DatasourceQuery(#[source] anyhow::Error),

    /// Union of all per-task failures of one rebuild. The partial snapshot has been kept.
    #[error("cache rebuild finished with {} failed task(s) in phase(s) [{}]", .errors.len(), .phases.join(", "))]
    AggregateRebuild {
        phases: Vec<String>,
        errors: Vec<TaskError>,
    },

    /// Null or structurally invalid incremental update argument.
    #[error("invalid cache update: {0}")]
    InvalidUpdate(String),

    /// Persisted snapshot could not be written or read.
    #[error("persistence error: {0:#}")]
    Persistence(#[source] anyhow::Error),

    /// The controller was cleaned up.
    #[error("content cache controller is shut down")]
    Shutdown,
}

impl CacheError {
    pub fn invalid_update(msg: impl Into<String>) -> Self {
        CacheError::InvalidUpdate(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        CacheError::Configuration(msg.into())
    }

    /// Per-task errors if this is an aggregate failure, empty otherwise.
    pub fn task_errors(&self) -> &[TaskError] {
        match self {
            CacheError::AggregateRebuild { errors, .. } => errors,
            _ => &[],
        }
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(self, CacheError::AggregateRebuild { .. })
    }
}

/// What went wrong inside a single rebuild task.
#[derive(Debug)]
pub enum TaskFailure {
    Query(anyhow::Error),
    Panicked(String),
    TimedOut,
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskFailure::Query(e) => write!(f, "{:#}", e),
            TaskFailure::Panicked(msg) => write!(f, "task panicked: {}", msg),
            TaskFailure::TimedOut => write!(f, "task did not finish before the deadline"),
        }
    }
}

/// One failed per-entity task: entity family (phase), entity id, cause.
#[derive(Debug, Error)]
#[error("{family} '{entity}': {failure}")]
pub struct TaskError {
    pub family: String,
    pub entity: String,
    pub failure: TaskFailure,
}

impl TaskError {
    pub fn query(family: &str, entity: &str, e: anyhow::Error) -> Self {
        Self {
            family: family.to_string(),
            entity: entity.to_string(),
            failure: TaskFailure::Query(e),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.failure, TaskFailure::TimedOut)
    }
}
