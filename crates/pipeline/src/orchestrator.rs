// crates/pipeline/src/orchestrator.rs
//! EnrichmentOrchestrator: advance the enrichment pipeline by one phase.
//!
//! A cycle holds the write lock from start to finish and walks an explicit
//! state machine:
//!
//! ```text
//! Discovering ─┬─ open jobs ──────> Polling ⇄ Importing ──> (finish)
//!              ├─ pending commits ─> Submitting ──────────> (finish)
//!              └─ nothing to do ──> Aggregating -> Indexing -> Done
//! ```
//!
//! Every durable transition (job created, results imported, job failed,
//! aggregates replaced) is a single database transaction, so a process
//! killed at any point resumes from the last committed state on the next
//! invocation.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;

use commitscope_core::llm::{
    ClassificationItem, ClassificationService, RemoteJobStatus, ServiceError, Submission,
};
use commitscope_core::{
    BatchJob, BatchJobStatus, BatchProgressStatus, Commit, ConfigError, EnrichConfig, NewBatchJob,
    Progress, ProgressPhase, VersionControl, WriteLock,
};
use commitscope_core::config::since_timestamp;
use commitscope_db::{AggregateEngine, Database, ImportSummary, RebuildSummary};
use commitscope_search::CommitSearchIndex;
use serde::Serialize;

use crate::error::{PipelineError, PipelineResult};

// ============================================================================
// Results
// ============================================================================

/// Where a cycle stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleOutcome {
    /// New batch jobs were submitted; invoke again later to poll them.
    Submitted,
    /// Open jobs are still being processed by the service.
    InProgress,
    /// Results were imported (or jobs closed as failed); invoke again to continue.
    Imported,
    /// No pending work; aggregates and search index were rebuilt.
    Done,
}

impl CycleOutcome {
    pub fn needs_reinvoke(&self) -> bool {
        !matches!(self, Self::Done)
    }
}

/// Counters for one cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleSummary {
    /// Jobs created by this cycle.
    pub submitted_jobs: Vec<String>,
    pub submitted_commits: u64,
    pub jobs_in_progress: u64,
    pub jobs_imported: u64,
    pub jobs_failed: u64,
    pub imported: u64,
    pub item_errors: u64,
    pub parse_failures: u64,
    pub missing: u64,
    pub skipped: u64,
    /// Members of failed jobs recorded as enrichment-failed.
    pub failed_commits: u64,
    pub rebuild: Option<RebuildSummary>,
    pub indexed: Option<u64>,
    /// Service failures that ended the cycle early, after earlier work in it
    /// was already committed.
    pub service_errors: Vec<String>,
}

impl CycleSummary {
    /// True once this cycle has written a job, an import or a job failure.
    fn has_committed(&self) -> bool {
        !self.submitted_jobs.is_empty() || self.jobs_imported > 0 || self.jobs_failed > 0
    }

    fn polling_outcome(&self) -> CycleOutcome {
        if self.jobs_in_progress > 0 {
            CycleOutcome::InProgress
        } else {
            CycleOutcome::Imported
        }
    }

    /// A service failure aborts the cycle only while nothing is committed.
    /// Afterwards it is recorded and the caller stops early.
    fn absorb_service_error(&mut self, err: ServiceError, context: &str) -> PipelineResult<()> {
        if !self.has_committed() {
            return Err(PipelineError::from(err));
        }
        tracing::warn!(
            context,
            error = %err,
            "service call failed after partial progress; ending cycle early"
        );
        self.service_errors.push(format!("{context}: {err}"));
        Ok(())
    }

    fn add_import(&mut self, s: &ImportSummary) {
        self.imported += s.imported;
        self.item_errors += s.item_errors;
        self.parse_failures += s.parse_failures;
        self.missing += s.missing;
        self.skipped += s.skipped;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleResult {
    pub outcome: CycleOutcome,
    pub summary: CycleSummary,
}

// ============================================================================
// State machine
// ============================================================================

#[derive(Debug)]
enum CycleState {
    Discovering,
    Submitting(Vec<Commit>),
    Polling(VecDeque<BatchJob>),
    Importing(BatchJob, VecDeque<BatchJob>),
    Aggregating,
    Indexing,
    Done,
}

impl CycleState {
    fn name(&self) -> &'static str {
        match self {
            Self::Discovering => "discovering",
            Self::Submitting(_) => "submitting",
            Self::Polling(_) => "polling",
            Self::Importing(..) => "importing",
            Self::Aggregating => "aggregating",
            Self::Indexing => "indexing",
            Self::Done => "done",
        }
    }
}

enum Transition {
    Next(CycleState),
    Finish(CycleOutcome),
}

type Reporter<'a> = &'a mut (dyn FnMut(&Progress) + Send);

pub struct EnrichmentOrchestrator {
    index_dir: PathBuf,
    db: Database,
    engine: AggregateEngine,
    search: Arc<CommitSearchIndex>,
    vcs: Arc<dyn VersionControl>,
    service: Arc<dyn ClassificationService>,
    config: EnrichConfig,
}

impl EnrichmentOrchestrator {
    pub fn new(
        index_dir: PathBuf,
        db: Database,
        search: Arc<CommitSearchIndex>,
        vcs: Arc<dyn VersionControl>,
        service: Arc<dyn ClassificationService>,
        config: EnrichConfig,
    ) -> Self {
        let engine = AggregateEngine::new(db.clone(), config.max_files_for_coupling);
        Self {
            index_dir,
            db,
            engine,
            search,
            vcs,
            service,
            config,
        }
    }

    /// Run one cycle. Fails with `LockHeld` before touching anything if
    /// another process holds the index lock.
    pub async fn run_cycle<F>(&self, mut on_progress: F) -> PipelineResult<CycleResult>
    where
        F: FnMut(&Progress) + Send,
    {
        let lock = WriteLock::acquire(&self.index_dir)?;
        let mut summary = CycleSummary::default();
        let mut state = CycleState::Discovering;

        let outcome = loop {
            tracing::debug!(state = state.name(), "enrichment cycle state");
            match self.advance(state, &mut summary, &mut on_progress).await? {
                Transition::Next(next) => state = next,
                Transition::Finish(outcome) => break outcome,
            }
        };

        lock.release();
        tracing::info!(outcome = ?outcome, imported = summary.imported, "enrichment cycle finished");
        Ok(CycleResult { outcome, summary })
    }

    async fn advance(
        &self,
        state: CycleState,
        summary: &mut CycleSummary,
        report: Reporter<'_>,
    ) -> PipelineResult<Transition> {
        let next = match state {
            CycleState::Discovering => {
                let open = self.db.list_open_batch_jobs().await?;
                if !open.is_empty() {
                    self.check_backend(&open)?;
                    CycleState::Polling(open.into())
                } else {
                    let pending = self.db.list_unenriched_commits(self.since_ts(), None).await?;
                    if pending.is_empty() {
                        CycleState::Aggregating
                    } else {
                        CycleState::Submitting(pending)
                    }
                }
            }

            CycleState::Submitting(pending) => {
                let outcome = self.submit(pending, summary, report).await?;
                return Ok(Transition::Finish(outcome));
            }

            CycleState::Polling(mut queue) => {
                let Some(job) = queue.pop_front() else {
                    return Ok(Transition::Finish(summary.polling_outcome()));
                };

                let poll = match self.service.poll_status(&job.id).await {
                    Ok(poll) => poll,
                    Err(e) => {
                        summary.absorb_service_error(e, &format!("poll {}", job.id))?;
                        return Ok(Transition::Finish(summary.polling_outcome()));
                    }
                };
                match poll.status {
                    RemoteJobStatus::InProgress => {
                        if job.status == BatchJobStatus::Submitted {
                            self.db
                                .update_batch_job_status(&job.id, BatchJobStatus::InProgress)
                                .await?;
                        }
                        summary.jobs_in_progress += 1;
                        report(&Progress::batch(
                            &job.id,
                            BatchProgressStatus::InProgress,
                            poll.counts.finished(),
                            poll.counts.total(),
                        ));
                        CycleState::Polling(queue)
                    }
                    RemoteJobStatus::Completed => CycleState::Importing(job, queue),
                    RemoteJobStatus::Failed { reason } => {
                        summary.failed_commits += self.db.fail_batch_job(&job.id, &reason).await?;
                        summary.jobs_failed += 1;
                        CycleState::Polling(queue)
                    }
                }
            }

            CycleState::Importing(job, queue) => {
                let total = job.member_hashes.len() as u64;
                report(&Progress::batch(&job.id, BatchProgressStatus::Importing, 0, total));

                let results = match self.service.fetch_results(&job.id).await {
                    Ok(results) => results,
                    Err(e) => {
                        summary.absorb_service_error(e, &format!("fetch {}", job.id))?;
                        return Ok(Transition::Finish(summary.polling_outcome()));
                    }
                };
                let imported = self.db.import_batch_results(&job.id, &results).await?;
                tracing::info!(
                    job_id = %job.id,
                    imported = imported.imported,
                    item_errors = imported.item_errors,
                    missing = imported.missing,
                    "batch results imported"
                );
                summary.add_import(&imported);
                summary.jobs_imported += 1;

                report(&Progress::batch(&job.id, BatchProgressStatus::Importing, total, total));
                CycleState::Polling(queue)
            }

            CycleState::Aggregating => {
                report(&Progress::phase(ProgressPhase::Aggregating));
                summary.rebuild = Some(self.engine.rebuild_all().await?);
                CycleState::Indexing
            }

            CycleState::Indexing => {
                report(&Progress::phase(ProgressPhase::Indexing));
                let commits = self.db.all_commits().await?;
                let search = Arc::clone(&self.search);
                let indexed = tokio::task::spawn_blocking(move || search.rebuild(&commits))
                    .await
                    .map_err(std::io::Error::other)??;
                summary.indexed = Some(indexed as u64);
                CycleState::Done
            }

            CycleState::Done => {
                report(&Progress::phase(ProgressPhase::Done));
                return Ok(Transition::Finish(CycleOutcome::Done));
            }
        };
        Ok(Transition::Next(next))
    }

    /// Submit `pending` in chunks of `batch_size`. A failed first submit
    /// aborts the cycle; a later one stops submission and keeps the chunks
    /// already accepted.
    async fn submit(
        &self,
        pending: Vec<Commit>,
        summary: &mut CycleSummary,
        report: Reporter<'_>,
    ) -> PipelineResult<CycleOutcome> {
        let batch_size = self.config.batch_size.max(1);
        let total_batches = pending.len().div_ceil(batch_size) as u64;
        let mut queued = false;

        for (i, chunk) in pending.chunks(batch_size).enumerate() {
            let items = self.build_items(chunk).await;
            let submission = match self.service.submit(items).await {
                Ok(submission) => submission,
                Err(e) => {
                    let context = format!("submit batch {}/{total_batches}", i + 1);
                    summary.absorb_service_error(e, &context)?;
                    break;
                }
            };
            let job = NewBatchJob {
                id: submission.job_id().to_string(),
                backend: self.service.name().to_string(),
                model: self.service.model().to_string(),
                member_hashes: chunk.iter().map(|c| c.hash.clone()).collect(),
            };
            let members = job.member_hashes.len() as u64;

            match submission {
                Submission::Queued { .. } => {
                    self.db.create_batch_job(&job).await?;
                    queued = true;
                    report(&Progress::batch(
                        &job.id,
                        BatchProgressStatus::Submitted,
                        i as u64 + 1,
                        total_batches,
                    ));
                }
                Submission::Completed { results, .. } => {
                    report(&Progress::batch(&job.id, BatchProgressStatus::Importing, 0, members));
                    let imported = self.db.record_completed_sync_batch(&job, &results).await?;
                    summary.add_import(&imported);
                    summary.jobs_imported += 1;
                    report(&Progress::batch(
                        &job.id,
                        BatchProgressStatus::Importing,
                        members,
                        members,
                    ));
                }
            }

            tracing::info!(job_id = %job.id, commits = members, backend = %job.backend, "batch submitted");
            summary.submitted_commits += members;
            summary.submitted_jobs.push(job.id);
        }

        Ok(if queued {
            CycleOutcome::Submitted
        } else {
            CycleOutcome::Imported
        })
    }

    async fn build_items(&self, commits: &[Commit]) -> Vec<ClassificationItem> {
        let mut items = Vec::with_capacity(commits.len());
        for commit in commits {
            let diff = match self.vcs.get_diff(&commit.hash).await {
                Ok(diff) => diff,
                Err(e) => {
                    tracing::warn!(hash = %commit.hash, error = %e, "diff unavailable, submitting without it");
                    String::new()
                }
            };
            items.push(ClassificationItem {
                hash: commit.hash.clone(),
                author: commit.author.clone(),
                timestamp: commit.timestamp,
                message: commit.message.clone(),
                files_changed: commit.files_changed.clone(),
                diff,
            });
        }
        items
    }

    fn check_backend(&self, open: &[BatchJob]) -> Result<(), ConfigError> {
        match open.iter().find(|j| j.backend != self.service.name()) {
            Some(job) => Err(ConfigError::BackendMismatch {
                job_id: job.id.clone(),
                job_backend: job.backend.clone(),
                configured: self.service.name().to_string(),
            }),
            None => Ok(()),
        }
    }

    fn since_ts(&self) -> Option<i64> {
        self.config.since.map(since_timestamp)
    }
}
