// crates/core/src/git.rs
//! Version-control collaborator: commit listing and diffs via `git`.
//!
//! Read-only. Every call spawns `git` with a timeout; no libgit2.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::process::Command;

use crate::config::since_timestamp;
use crate::error::GitError;

/// Timeout for `git log` over the whole history.
const LOG_TIMEOUT_SECS: u64 = 120;
/// Timeout for single-commit operations.
const SHOW_TIMEOUT_SECS: u64 = 30;

const RECORD_SEP: char = '\x1e';
const FIELD_SEP: char = '\x1f';

/// A commit as read from version-control history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitCommit {
    /// Full commit hash (40 hex characters).
    pub hash: String,
    pub author: String,
    pub author_email: String,
    /// Unix timestamp (author time).
    pub timestamp: i64,
    /// Subject line.
    pub message: String,
    /// Paths touched, in the order git reports them.
    pub files_changed: Vec<String>,
}

#[async_trait]
pub trait VersionControl: Send + Sync {
    /// All commits reachable from HEAD, newest first.
    async fn list_commits(&self, since: Option<NaiveDate>) -> Result<Vec<GitCommit>, GitError>;

    /// Unified diff of one commit against its first parent.
    async fn get_diff(&self, hash: &str) -> Result<String, GitError>;
}

/// [`VersionControl`] backed by the `git` binary.
#[derive(Debug, Clone)]
pub struct GitCli {
    repo: PathBuf,
}

impl GitCli {
    pub fn new(repo: impl Into<PathBuf>) -> Self {
        Self { repo: repo.into() }
    }

    pub fn repo(&self) -> &Path {
        &self.repo
    }

    async fn run(&self, args: &[&str], timeout_secs: u64) -> Result<String, GitError> {
        run_git(&self.repo, args, timeout_secs).await
    }
}

#[async_trait]
impl VersionControl for GitCli {
    async fn list_commits(&self, since: Option<NaiveDate>) -> Result<Vec<GitCommit>, GitError> {
        let format = format!("--format={RECORD_SEP}%H{FIELD_SEP}%an{FIELD_SEP}%ae{FIELD_SEP}%at{FIELD_SEP}%s");
        // `@<seconds>` keeps git from reading the date in local time.
        let cutoff = since.map(since_timestamp);
        let since_arg = cutoff.map(|ts| format!("--since=@{ts}"));

        let mut args = vec![
            "-c",
            "core.quotepath=off",
            "log",
            format.as_str(),
            "--name-only",
            "--no-renames",
        ];
        if let Some(since_arg) = since_arg.as_deref() {
            args.push(since_arg);
        }

        let output = match self.run(&args, LOG_TIMEOUT_SECS).await {
            Ok(out) => out,
            // Freshly initialized repository with no commits.
            Err(GitError::CommandFailed { stderr, .. })
                if stderr.contains("does not have any commits") =>
            {
                return Ok(Vec::new())
            }
            Err(e) => return Err(e),
        };

        let mut commits = parse_log_output(&output);
        // git filters on committer time; the store and discovery use author time.
        if let Some(cutoff) = cutoff {
            commits.retain(|c| c.timestamp >= cutoff);
        }
        tracing::debug!(repo = %self.repo.display(), count = commits.len(), "git log parsed");
        Ok(commits)
    }

    async fn get_diff(&self, hash: &str) -> Result<String, GitError> {
        if hash.len() < 4 || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(GitError::InvalidHash(hash.to_string()));
        }
        self.run(
            &["show", "--format=", "--patch", "--no-color", "--no-ext-diff", hash],
            SHOW_TIMEOUT_SECS,
        )
        .await
    }
}

/// Resolve the top-level directory of the repository containing `path`.
pub async fn repo_root(path: &Path) -> Result<PathBuf, GitError> {
    match run_git(path, &["rev-parse", "--show-toplevel"], SHOW_TIMEOUT_SECS).await {
        Ok(out) => Ok(PathBuf::from(out.trim())),
        Err(GitError::CommandFailed { stderr, .. }) if stderr.contains("not a git repository") => {
            Err(GitError::NotARepo {
                path: path.to_path_buf(),
            })
        }
        Err(e) => Err(e),
    }
}

async fn run_git(cwd: &Path, args: &[&str], timeout_secs: u64) -> Result<String, GitError> {
    let command = args
        .iter()
        .find(|a| !a.starts_with('-') && !a.contains('='))
        .copied()
        .unwrap_or("git")
        .to_string();

    let mut cmd = Command::new("git");
    cmd.args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = tokio::time::timeout(Duration::from_secs(timeout_secs), cmd.output())
        .await
        .map_err(|_| GitError::Timeout(command.clone(), timeout_secs))?
        .map_err(|e| GitError::SpawnFailed(e.to_string()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        return Err(GitError::CommandFailed {
            command,
            code: output.status.code().unwrap_or(-1),
            stderr,
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Full object name: SHA-1 (40 hex) or SHA-256 (64 hex).
fn is_full_hash(hash: &str) -> bool {
    matches!(hash.len(), 40 | 64) && hash.chars().all(|c| c.is_ascii_hexdigit())
}

/// Parse `git log --name-only` output written with the record/field
/// separators above. Malformed records are skipped.
pub fn parse_log_output(output: &str) -> Vec<GitCommit> {
    output
        .split(RECORD_SEP)
        .filter_map(|record| {
            let mut lines = record.lines();
            let header = lines.next()?;
            let mut fields = header.split(FIELD_SEP);
            let hash = fields.next()?.trim();
            let author = fields.next()?;
            let author_email = fields.next()?;
            let timestamp = fields.next()?.trim().parse::<i64>().ok()?;
            let message = fields.next().unwrap_or("");
            if !is_full_hash(hash) {
                return None;
            }

            let files_changed = lines
                .map(|l| l.trim_end_matches('\r'))
                .filter(|l| !l.is_empty())
                .map(String::from)
                .collect();

            Some(GitCommit {
                hash: hash.to_string(),
                author: author.to_string(),
                author_email: author_email.to_string(),
                timestamp,
                message: message.to_string(),
                files_changed,
            })
        })
        .collect()
}
