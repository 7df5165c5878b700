// crates/core/src/types.rs
//! Domain types shared by the store, the search index and the pipeline.

use serde::{Deserialize, Serialize};

// ============================================================================
// Classification taxonomy
// ============================================================================

/// Category assigned to a commit by the classification service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Feature,
    Bugfix,
    Refactor,
    Docs,
    Test,
    Chore,
    Perf,
    Style,
    Ci,
    Build,
    Security,
    Revert,
}

impl Classification {
    pub const ALL: [Classification; 12] = [
        Self::Feature,
        Self::Bugfix,
        Self::Refactor,
        Self::Docs,
        Self::Test,
        Self::Chore,
        Self::Perf,
        Self::Style,
        Self::Ci,
        Self::Build,
        Self::Security,
        Self::Revert,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Feature => "feature",
            Self::Bugfix => "bugfix",
            Self::Refactor => "refactor",
            Self::Docs => "docs",
            Self::Test => "test",
            Self::Chore => "chore",
            Self::Perf => "perf",
            Self::Style => "style",
            Self::Ci => "ci",
            Self::Build => "build",
            Self::Security => "security",
            Self::Revert => "revert",
        }
    }

    /// Lenient parse: accepts the canonical names plus the aliases models
    /// tend to produce (`fix`, `tests`, `documentation`, ...).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "feature" | "feat" => Some(Self::Feature),
            "bugfix" | "bug_fix" | "fix" | "bug" => Some(Self::Bugfix),
            "refactor" | "refactoring" => Some(Self::Refactor),
            "docs" | "doc" | "documentation" => Some(Self::Docs),
            "test" | "tests" | "testing" => Some(Self::Test),
            "chore" | "maintenance" => Some(Self::Chore),
            "perf" | "performance" => Some(Self::Perf),
            "style" | "formatting" => Some(Self::Style),
            "ci" | "ci_cd" => Some(Self::Ci),
            "build" | "deps" | "dependencies" => Some(Self::Build),
            "security" => Some(Self::Security),
            "revert" => Some(Self::Revert),
            _ => None,
        }
    }
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Commits
// ============================================================================

/// A commit known to the store, with its enrichment fields.
///
/// Identity is `hash`. Enrichment fields stay `None` until an import writes
/// them; `enrichment_error` is set when the service could not produce a
/// verdict for this commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Commit {
    pub hash: String,
    pub author: String,
    pub author_email: String,
    /// Unix seconds (author time).
    pub timestamp: i64,
    /// First line of the commit message.
    pub message: String,
    pub files_changed: Vec<String>,
    pub classification: Option<Classification>,
    pub summary: Option<String>,
    /// 1 (trivial) ..= 5 (very complex).
    pub complexity: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enrichment_error: Option<String>,
}

impl Commit {
    pub fn is_enriched(&self) -> bool {
        self.classification.is_some()
    }

    /// Abbreviated hash for display.
    pub fn short_hash(&self) -> &str {
        &self.hash[..self.hash.len().min(10)]
    }
}

/// Parsed enrichment produced for one commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub classification: Classification,
    pub summary: String,
    pub complexity: u8,
}

/// Totals over the commit table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitCounts {
    pub total: i64,
    pub enriched: i64,
    /// Neither enriched nor marked failed.
    pub unenriched: i64,
    pub failed: i64,
}

// ============================================================================
// Batch jobs
// ============================================================================

/// Lifecycle of a batch submission.
///
/// `Submitted` and `InProgress` are open; `Completed` and `Failed` are
/// terminal and never change afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchJobStatus {
    Submitted,
    InProgress,
    Completed,
    Failed,
}

impl BatchJobStatus {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "submitted" => Some(Self::Submitted),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, Self::Submitted | Self::InProgress)
    }
}

/// A batch submission as recorded in the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchJob {
    /// Opaque id issued by the classification service.
    pub id: String,
    pub status: BatchJobStatus,
    /// Service variant that owns the job (`anthropic-batch`, ...).
    pub backend: String,
    pub model: String,
    pub member_hashes: Vec<String>,
    pub succeeded_count: i64,
    pub failed_count: i64,
    pub error_message: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    pub completed_at: Option<i64>,
}

/// Input for recording a freshly submitted batch.
#[derive(Debug, Clone)]
pub struct NewBatchJob {
    pub id: String,
    pub backend: String,
    pub model: String,
    pub member_hashes: Vec<String>,
}
