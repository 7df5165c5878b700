// crates/core/src/llm/types.rs
//! Request/result/error types for the classification service.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::Verdict;

/// One commit submitted for classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationItem {
    pub hash: String,
    pub author: String,
    pub timestamp: i64,
    pub message: String,
    pub files_changed: Vec<String>,
    pub diff: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemErrorKind {
    /// The model answered but the answer could not be interpreted.
    Parse,
    /// The service reported an error for this request.
    Service,
    /// The request was canceled or expired before processing.
    Expired,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemError {
    pub kind: ItemErrorKind,
    pub message: String,
}

impl ItemError {
    pub fn parse(message: impl Into<String>) -> Self {
        Self {
            kind: ItemErrorKind::Parse,
            message: message.into(),
        }
    }

    pub fn service(message: impl Into<String>) -> Self {
        Self {
            kind: ItemErrorKind::Service,
            message: message.into(),
        }
    }

    pub fn expired(message: impl Into<String>) -> Self {
        Self {
            kind: ItemErrorKind::Expired,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ItemError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.kind {
            ItemErrorKind::Parse => "parse",
            ItemErrorKind::Service => "service",
            ItemErrorKind::Expired => "expired",
        };
        write!(f, "{kind}: {}", self.message)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResultOutcome {
    Verdict(Verdict),
    Error(ItemError),
}

/// Result for one submitted commit.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationResult {
    pub hash: String,
    pub outcome: ResultOutcome,
}

impl ClassificationResult {
    pub fn verdict(hash: impl Into<String>, verdict: Verdict) -> Self {
        Self {
            hash: hash.into(),
            outcome: ResultOutcome::Verdict(verdict),
        }
    }

    pub fn error(hash: impl Into<String>, error: ItemError) -> Self {
        Self {
            hash: hash.into(),
            outcome: ResultOutcome::Error(error),
        }
    }
}

/// What `submit` hands back.
#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    /// Accepted for asynchronous processing; poll later.
    Queued { job_id: String },
    /// Evaluated synchronously; results are final.
    Completed {
        job_id: String,
        results: Vec<ClassificationResult>,
    },
}

impl Submission {
    pub fn job_id(&self) -> &str {
        match self {
            Self::Queued { job_id } | Self::Completed { job_id, .. } => job_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteJobStatus {
    InProgress,
    /// Results can be fetched.
    Completed,
    /// Terminal without results (expired, deleted, unknown to the service).
    Failed { reason: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestCounts {
    #[serde(default)]
    pub processing: u64,
    #[serde(default)]
    pub succeeded: u64,
    #[serde(default)]
    pub errored: u64,
    #[serde(default)]
    pub canceled: u64,
    #[serde(default)]
    pub expired: u64,
}

impl RequestCounts {
    pub fn total(&self) -> u64 {
        self.processing + self.succeeded + self.errored + self.canceled + self.expired
    }

    pub fn finished(&self) -> u64 {
        self.total() - self.processing
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobPoll {
    pub status: RemoteJobStatus,
    pub counts: RequestCounts,
}

/// Errors that can occur talking to the classification service.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Rate limited, retry after {retry_after_secs} seconds")]
    RateLimited { retry_after_secs: u64 },

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),

    #[error("Operation not available: {0}")]
    NotAvailable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_counts_totals() {
        let counts = RequestCounts {
            processing: 2,
            succeeded: 5,
            errored: 1,
            canceled: 0,
            expired: 1,
        };
        assert_eq!(counts.total(), 9);
        assert_eq!(counts.finished(), 7);
    }

    #[test]
    fn test_request_counts_deserialize_partial() {
        let counts: RequestCounts = serde_json::from_str(r#"{"succeeded": 3}"#).unwrap();
        assert_eq!(counts.succeeded, 3);
        assert_eq!(counts.processing, 0);
    }

    #[test]
    fn test_submission_job_id() {
        let queued = Submission::Queued {
            job_id: "msgbatch_1".into(),
        };
        assert_eq!(queued.job_id(), "msgbatch_1");
        let done = Submission::Completed {
            job_id: "sync_x".into(),
            results: vec![],
        };
        assert_eq!(done.job_id(), "sync_x");
    }

    #[test]
    fn test_item_error_display() {
        assert_eq!(
            ItemError::parse("no JSON object").to_string(),
            "parse: no JSON object"
        );
    }
}
