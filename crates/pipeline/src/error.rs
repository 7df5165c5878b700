// crates/pipeline/src/error.rs
use std::path::PathBuf;

use commitscope_core::llm::ServiceError;
use commitscope_core::{ConfigError, GitError, LockError};
use commitscope_db::DbError;
use commitscope_search::SearchError;
use thiserror::Error;

/// Errors that end an invocation. Per-item classification failures are not
/// errors; they are counted in the cycle summary.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("{0}")]
    LockHeld(LockError),

    #[error("Lock error: {0}")]
    Lock(LockError),

    #[error("No index found at {}; run `commitscope init` first", .0.display())]
    NotFound(PathBuf),

    #[error("Classification service error: {0}")]
    Service(#[from] ServiceError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Git error: {0}")]
    Git(#[from] GitError),

    #[error("Search index error: {0}")]
    Search(#[from] SearchError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LockError> for PipelineError {
    fn from(e: LockError) -> Self {
        match e {
            LockError::Held { .. } => Self::LockHeld(e),
            LockError::Io { .. } => Self::Lock(e),
        }
    }
}

impl PipelineError {
    /// Process exit code for the CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration(_) => 2,
            Self::LockHeld(_) => 3,
            Self::NotFound(_) => 4,
            Self::Service(_) => 5,
            _ => 1,
        }
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_errors_split_by_kind() {
        let held = LockError::Held {
            pid: 42,
            hostname: "devbox".into(),
            acquired_at: "2026-01-01T00:00:00Z".into(),
            holder_alive: true,
        };
        let err = PipelineError::from(held);
        assert!(matches!(err, PipelineError::LockHeld(_)));
        assert_eq!(err.exit_code(), 3);

        let io = LockError::io("/tmp/x", std::io::Error::other("boom"));
        assert!(matches!(PipelineError::from(io), PipelineError::Lock(_)));
    }

    #[test]
    fn test_not_found_message_suggests_init() {
        let err = PipelineError::NotFound(PathBuf::from("/repo/.commitscope"));
        assert!(err.to_string().contains("commitscope init"));
        assert_eq!(err.exit_code(), 4);
    }
}
