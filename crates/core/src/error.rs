use std::path::PathBuf;
use thiserror::Error;

/// Errors from the version-control collaborator (`git` subprocess).
#[derive(Debug, Error)]
pub enum GitError {
    #[error("Not a git repository: {path}")]
    NotARepo { path: PathBuf },

    #[error("Failed to spawn git: {0}")]
    SpawnFailed(String),

    #[error("git {command} failed with exit code {code}: {stderr}")]
    CommandFailed {
        command: String,
        code: i32,
        stderr: String,
    },

    #[error("git {0} timed out after {1} seconds")]
    Timeout(String, u64),

    #[error("Invalid commit hash: {0}")]
    InvalidHash(String),
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing credentials: set {var} to use the classification service")]
    MissingApiKey { var: &'static str },

    #[error("Invalid config file {path}: {message}")]
    InvalidFile { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },

    #[error("Open batch job {job_id} belongs to backend {job_backend}, but {configured} is configured")]
    BackendMismatch {
        job_id: String,
        job_backend: String,
        configured: String,
    },

    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from the cross-process write lock.
#[derive(Debug, Error)]
pub enum LockError {
    #[error("Index is locked by process {pid} on {hostname} since {acquired_at} ({})", if *.holder_alive { "still running" } else { "process not found; run `commitscope unlock --force` if it crashed" })]
    Held {
        pid: u32,
        hostname: String,
        acquired_at: String,
        holder_alive: bool,
    },

    #[error("IO error on lock file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl LockError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_held_display_mentions_pid_and_hint() {
        let err = LockError::Held {
            pid: 4242,
            hostname: "devbox".into(),
            acquired_at: "2026-01-01T00:00:00Z".into(),
            holder_alive: false,
        };
        let msg = err.to_string();
        assert!(msg.contains("4242 on devbox"));
        assert!(msg.contains("unlock --force"));

        let err = LockError::Held {
            pid: 1,
            hostname: "h".into(),
            acquired_at: "t".into(),
            holder_alive: true,
        };
        assert!(err.to_string().contains("still running"));
    }

    #[test]
    fn test_missing_api_key_display() {
        let err = ConfigError::MissingApiKey {
            var: "ANTHROPIC_API_KEY",
        };
        assert!(err.to_string().contains("ANTHROPIC_API_KEY"));
    }

    #[test]
    fn test_git_error_display() {
        let err = GitError::CommandFailed {
            command: "log".into(),
            code: 128,
            stderr: "fatal: bad revision".into(),
        };
        assert_eq!(
            err.to_string(),
            "git log failed with exit code 128: fatal: bad revision"
        );
    }
}
