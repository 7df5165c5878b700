//! Enrichment cycle scenarios against in-test fakes of the version-control
//! and classification-service collaborators.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;
use commitscope_core::llm::{
    ClassificationItem, ClassificationResult, ClassificationService, ItemError, JobPoll,
    RemoteJobStatus, RequestCounts, ServiceError, Submission,
};
use commitscope_core::{
    BatchJobStatus, BatchProgressStatus, Classification, EnrichConfig, GitCommit, GitError,
    NewBatchJob, Progress, ProgressPhase, VersionControl, Verdict, WriteLock,
};
use commitscope_pipeline::{
    sync_commits, CycleOutcome, EnrichmentOrchestrator, IndexContext, PipelineError,
};
use commitscope_search::CommitSearchIndex;
use pretty_assertions::assert_eq;

// ============================================================================
// Fakes
// ============================================================================

struct FakeVcs {
    commits: Vec<GitCommit>,
    broken_diffs: HashSet<String>,
}

impl FakeVcs {
    fn new(commits: Vec<GitCommit>) -> Self {
        Self {
            commits,
            broken_diffs: HashSet::new(),
        }
    }
}

#[async_trait]
impl VersionControl for FakeVcs {
    async fn list_commits(&self, _since: Option<NaiveDate>) -> Result<Vec<GitCommit>, GitError> {
        Ok(self.commits.clone())
    }

    async fn get_diff(&self, hash: &str) -> Result<String, GitError> {
        if self.broken_diffs.contains(hash) {
            return Err(GitError::InvalidHash(hash.to_string()));
        }
        Ok(format!("diff --git a/{hash} b/{hash}\n+change"))
    }
}

#[derive(Default)]
struct FakeState {
    next_id: u32,
    submitted: Vec<Vec<String>>,
    members: HashMap<String, Vec<String>>,
    polls: u32,
    fetches: u32,
    remote_status: Option<RemoteJobStatus>,
    fail_submit: bool,
    fail_fetch: bool,
    /// Submits beyond this many are rejected.
    accepted_submits: Option<usize>,
    /// Fetches beyond this many are rejected.
    answered_fetches: Option<u32>,
    /// Hashes answered with an unparseable verdict.
    parse_errors: HashSet<String>,
    diffs_seen: HashMap<String, String>,
}

struct FakeService {
    name: &'static str,
    synchronous: bool,
    state: Mutex<FakeState>,
}

impl FakeService {
    fn batch() -> Arc<Self> {
        Arc::new(Self {
            name: "fake-batch",
            synchronous: false,
            state: Mutex::new(FakeState::default()),
        })
    }

    fn sync() -> Arc<Self> {
        Arc::new(Self {
            name: "fake-sync",
            synchronous: true,
            state: Mutex::new(FakeState::default()),
        })
    }

    fn set_status(&self, status: RemoteJobStatus) {
        self.state.lock().unwrap().remote_status = Some(status);
    }

    fn network_calls(&self) -> u32 {
        let s = self.state.lock().unwrap();
        s.submitted.len() as u32 + s.polls + s.fetches
    }

    fn results_for(state: &FakeState, hashes: &[String]) -> Vec<ClassificationResult> {
        hashes
            .iter()
            .map(|h| {
                if state.parse_errors.contains(h) {
                    ClassificationResult::error(h, ItemError::parse("no JSON object in response"))
                } else {
                    ClassificationResult::verdict(
                        h,
                        Verdict {
                            classification: Classification::Feature,
                            summary: format!("summary of {h}"),
                            complexity: 3,
                        },
                    )
                }
            })
            .collect()
    }
}

#[async_trait]
impl ClassificationService for FakeService {
    async fn submit(&self, items: Vec<ClassificationItem>) -> Result<Submission, ServiceError> {
        let mut s = self.state.lock().unwrap();
        if s.fail_submit || s.accepted_submits.is_some_and(|n| s.submitted.len() >= n) {
            return Err(ServiceError::Status {
                status: 500,
                body: "overloaded".into(),
            });
        }
        s.next_id += 1;
        let job_id = format!("job-{}", s.next_id);
        let hashes: Vec<String> = items.iter().map(|i| i.hash.clone()).collect();
        for item in &items {
            s.diffs_seen.insert(item.hash.clone(), item.diff.clone());
        }
        s.submitted.push(hashes.clone());
        s.members.insert(job_id.clone(), hashes.clone());

        if self.synchronous {
            let results = Self::results_for(&s, &hashes);
            Ok(Submission::Completed { job_id, results })
        } else {
            Ok(Submission::Queued { job_id })
        }
    }

    async fn poll_status(&self, _job_id: &str) -> Result<JobPoll, ServiceError> {
        let mut s = self.state.lock().unwrap();
        s.polls += 1;
        Ok(JobPoll {
            status: s.remote_status.clone().unwrap_or(RemoteJobStatus::InProgress),
            counts: RequestCounts {
                processing: 1,
                succeeded: 2,
                ..Default::default()
            },
        })
    }

    async fn fetch_results(&self, job_id: &str) -> Result<Vec<ClassificationResult>, ServiceError> {
        let mut s = self.state.lock().unwrap();
        s.fetches += 1;
        if s.fail_fetch || s.answered_fetches.is_some_and(|n| s.fetches > n) {
            return Err(ServiceError::InvalidResponse("truncated JSONL".into()));
        }
        let hashes = s.members.get(job_id).cloned().unwrap_or_default();
        Ok(Self::results_for(&s, &hashes))
    }

    fn name(&self) -> &str {
        self.name
    }

    fn model(&self) -> &str {
        "fake-model"
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn commit(hash: &str, ts: i64, files: &[&str]) -> GitCommit {
    GitCommit {
        hash: hash.to_string(),
        author: "dev".to_string(),
        author_email: "dev@example.com".to_string(),
        timestamp: ts,
        message: format!("change {hash}"),
        files_changed: files.iter().map(|f| f.to_string()).collect(),
    }
}

fn commits(n: usize) -> Vec<GitCommit> {
    (0..n)
        .map(|i| commit(&format!("c{i}"), 1_700_000_000 + i as i64, &["src/a.rs", "src/b.rs"]))
        .collect()
}

async fn setup(dir: &Path, history: Vec<GitCommit>) -> (IndexContext, Arc<FakeVcs>) {
    let ctx = IndexContext::init(dir).await.unwrap();
    let vcs = Arc::new(FakeVcs::new(history));
    let lock = WriteLock::acquire(&ctx.index_dir).unwrap();
    sync_commits(vcs.as_ref(), &ctx.db, None, &lock).await.unwrap();
    lock.release();
    (ctx, vcs)
}

fn orchestrator(
    ctx: &IndexContext,
    vcs: Arc<FakeVcs>,
    service: Arc<FakeService>,
    batch_size: usize,
) -> EnrichmentOrchestrator {
    let config = EnrichConfig {
        batch_size,
        ..EnrichConfig::default()
    };
    EnrichmentOrchestrator::new(
        ctx.index_dir.clone(),
        ctx.db.clone(),
        Arc::new(CommitSearchIndex::open_in_ram().unwrap()),
        vcs,
        service,
        config,
    )
}

fn collect(progress: &Arc<Mutex<Vec<Progress>>>) -> impl FnMut(&Progress) + Send {
    let sink = Arc::clone(progress);
    move |p: &Progress| sink.lock().unwrap().push(p.clone())
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn test_full_lifecycle_submit_poll_import_rebuild() {
    let tmp = tempfile::tempdir().unwrap();
    let (ctx, vcs) = setup(tmp.path(), commits(3)).await;
    let service = FakeService::batch();
    let orch = orchestrator(&ctx, vcs, service.clone(), 100);
    let progress = Arc::new(Mutex::new(Vec::new()));

    // Submit
    let r = orch.run_cycle(collect(&progress)).await.unwrap();
    assert_eq!(r.outcome, CycleOutcome::Submitted);
    assert_eq!(r.summary.submitted_jobs, vec!["job-1".to_string()]);
    assert_eq!(r.summary.submitted_commits, 3);
    let job = ctx.db.get_batch_job("job-1").await.unwrap().unwrap();
    assert_eq!(job.status, BatchJobStatus::Submitted);
    assert_eq!(job.member_hashes, vec!["c0", "c1", "c2"]);
    assert_eq!(job.backend, "fake-batch");
    assert_eq!(
        progress.lock().unwrap().last().unwrap().batch_status,
        Some(BatchProgressStatus::Submitted)
    );

    // Poll: still running
    let r = orch.run_cycle(collect(&progress)).await.unwrap();
    assert_eq!(r.outcome, CycleOutcome::InProgress);
    let job = ctx.db.get_batch_job("job-1").await.unwrap().unwrap();
    assert_eq!(job.status, BatchJobStatus::InProgress);
    let last = progress.lock().unwrap().last().cloned().unwrap();
    assert_eq!(last.batch_status, Some(BatchProgressStatus::InProgress));
    assert_eq!((last.current, last.total), (2, 3));

    // Poll: complete, import
    service.set_status(RemoteJobStatus::Completed);
    let r = orch.run_cycle(collect(&progress)).await.unwrap();
    assert_eq!(r.outcome, CycleOutcome::Imported);
    assert_eq!(r.summary.imported, 3);
    assert_eq!(ctx.db.commit_counts().await.unwrap().enriched, 3);
    let job = ctx.db.get_batch_job("job-1").await.unwrap().unwrap();
    assert_eq!(job.status, BatchJobStatus::Completed);

    // Nothing pending: rebuild
    progress.lock().unwrap().clear();
    let r = orch.run_cycle(collect(&progress)).await.unwrap();
    assert_eq!(r.outcome, CycleOutcome::Done);
    assert_eq!(r.summary.rebuild.unwrap().commits, 3);
    assert_eq!(r.summary.indexed, Some(3));
    let phases: Vec<ProgressPhase> = progress.lock().unwrap().iter().map(|p| p.phase).collect();
    assert_eq!(
        phases,
        vec![ProgressPhase::Aggregating, ProgressPhase::Indexing, ProgressPhase::Done]
    );

    let stats = ctx.aggregates().get_file_stats("src/a.rs").await.unwrap().unwrap();
    assert_eq!(stats.total_changes, 3);
    assert_eq!(stats.complexity, Some(3));
    assert_eq!(service.state.lock().unwrap().fetches, 1);
}

#[tokio::test]
async fn test_restart_polls_existing_job_instead_of_resubmitting() {
    let tmp = tempfile::tempdir().unwrap();
    let (ctx, vcs) = setup(tmp.path(), commits(5)).await;

    let first = FakeService::batch();
    let r = orchestrator(&ctx, vcs.clone(), first.clone(), 100)
        .run_cycle(|_: &Progress| {})
        .await
        .unwrap();
    assert_eq!(r.outcome, CycleOutcome::Submitted);

    // Fresh process: new orchestrator, new service client.
    let second = FakeService::batch();
    let r = orchestrator(&ctx, vcs, second.clone(), 100)
        .run_cycle(|_: &Progress| {})
        .await
        .unwrap();
    assert_eq!(r.outcome, CycleOutcome::InProgress);

    let s = second.state.lock().unwrap();
    assert!(s.submitted.is_empty());
    assert_eq!(s.polls, 1);
    drop(s);
    assert_eq!(ctx.db.list_open_batch_jobs().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_import_with_item_error_closes_job() {
    let tmp = tempfile::tempdir().unwrap();
    let (ctx, vcs) = setup(tmp.path(), commits(3)).await;
    let service = FakeService::batch();
    service.state.lock().unwrap().parse_errors.insert("c1".into());
    let orch = orchestrator(&ctx, vcs, service.clone(), 100);

    orch.run_cycle(|_: &Progress| {}).await.unwrap();
    service.set_status(RemoteJobStatus::Completed);
    let r = orch.run_cycle(|_: &Progress| {}).await.unwrap();

    assert_eq!(r.outcome, CycleOutcome::Imported);
    assert_eq!(r.summary.imported, 2);
    assert_eq!(r.summary.item_errors, 1);
    assert_eq!(r.summary.parse_failures, 1);

    assert!(ctx.db.get_commit("c0").await.unwrap().unwrap().classification.is_some());
    assert!(ctx.db.get_commit("c2").await.unwrap().unwrap().classification.is_some());
    let failed = ctx.db.get_commit("c1").await.unwrap().unwrap();
    assert!(failed.classification.is_none());
    assert!(failed.enrichment_error.is_some());

    let job = ctx.db.get_batch_job("job-1").await.unwrap().unwrap();
    assert_eq!(job.status, BatchJobStatus::Completed);
    assert_eq!(job.succeeded_count, 2);
    assert_eq!(job.failed_count, 1);

    // The failed commit is not resubmitted automatically.
    let r = orch.run_cycle(|_: &Progress| {}).await.unwrap();
    assert_eq!(r.outcome, CycleOutcome::Done);
}

#[tokio::test]
async fn test_second_cycle_while_locked_is_rejected_without_writes() {
    let tmp = tempfile::tempdir().unwrap();
    let (ctx, vcs) = setup(tmp.path(), commits(2)).await;
    let service = FakeService::batch();
    let orch = orchestrator(&ctx, vcs, service.clone(), 100);

    let held = WriteLock::acquire(&ctx.index_dir).unwrap();
    let err = orch.run_cycle(|_: &Progress| {}).await.unwrap_err();
    assert!(matches!(err, PipelineError::LockHeld(_)), "got {err:?}");

    assert_eq!(service.network_calls(), 0);
    assert!(ctx.db.list_open_batch_jobs().await.unwrap().is_empty());
    assert!(ctx.aggregates().aggregate_meta().await.unwrap().is_none());

    held.release();
    let r = orch.run_cycle(|_: &Progress| {}).await.unwrap();
    assert_eq!(r.outcome, CycleOutcome::Submitted);
}

#[tokio::test]
async fn test_lock_released_after_cycle_error() {
    let tmp = tempfile::tempdir().unwrap();
    let (ctx, vcs) = setup(tmp.path(), commits(2)).await;
    let service = FakeService::batch();
    service.state.lock().unwrap().fail_submit = true;
    let orch = orchestrator(&ctx, vcs, service, 100);

    let err = orch.run_cycle(|_: &Progress| {}).await.unwrap_err();
    assert!(matches!(err, PipelineError::Service(_)));
    assert!(WriteLock::acquire(&ctx.index_dir).is_ok());
}

#[tokio::test]
async fn test_nothing_pending_goes_straight_to_done_without_network() {
    let tmp = tempfile::tempdir().unwrap();
    let (ctx, vcs) = setup(tmp.path(), Vec::new()).await;
    let service = FakeService::batch();
    let orch = orchestrator(&ctx, vcs, service.clone(), 100);

    let r = orch.run_cycle(|_: &Progress| {}).await.unwrap();
    assert_eq!(r.outcome, CycleOutcome::Done);
    assert_eq!(service.network_calls(), 0);
}

#[tokio::test]
async fn test_done_is_idempotent() {
    let tmp = tempfile::tempdir().unwrap();
    let (ctx, vcs) = setup(tmp.path(), commits(3)).await;
    for c in ["c0", "c1", "c2"] {
        ctx.db
            .upsert_enrichment(
                c,
                &Verdict {
                    classification: Classification::Refactor,
                    summary: "tidy".into(),
                    complexity: 2,
                },
            )
            .await
            .unwrap();
    }
    let service = FakeService::batch();
    let orch = orchestrator(&ctx, vcs, service.clone(), 100);
    let engine = ctx.aggregates();

    let first = orch.run_cycle(|_: &Progress| {}).await.unwrap();
    let hotspots_first = engine.get_hotspots(10, &[]).await.unwrap();
    let pairs_first = engine.get_top_coupled_pairs(10, &[]).await.unwrap();

    let second = orch.run_cycle(|_: &Progress| {}).await.unwrap();
    assert_eq!(first.outcome, CycleOutcome::Done);
    assert_eq!(second.outcome, CycleOutcome::Done);
    assert_eq!(engine.get_hotspots(10, &[]).await.unwrap(), hotspots_first);
    assert_eq!(engine.get_top_coupled_pairs(10, &[]).await.unwrap(), pairs_first);
    assert_eq!(service.network_calls(), 0);
}

#[tokio::test]
async fn test_submit_failure_creates_no_job() {
    let tmp = tempfile::tempdir().unwrap();
    let (ctx, vcs) = setup(tmp.path(), commits(2)).await;
    let service = FakeService::batch();
    service.state.lock().unwrap().fail_submit = true;
    let orch = orchestrator(&ctx, vcs, service.clone(), 100);

    assert!(orch.run_cycle(|_: &Progress| {}).await.is_err());
    assert!(ctx.db.recent_batch_jobs(10).await.unwrap().is_empty());
    assert_eq!(ctx.db.commit_counts().await.unwrap().unenriched, 2);

    service.state.lock().unwrap().fail_submit = false;
    let r = orch.run_cycle(|_: &Progress| {}).await.unwrap();
    assert_eq!(r.outcome, CycleOutcome::Submitted);
}

#[tokio::test]
async fn test_fetch_failure_leaves_job_open_for_retry() {
    let tmp = tempfile::tempdir().unwrap();
    let (ctx, vcs) = setup(tmp.path(), commits(2)).await;
    let service = FakeService::batch();
    let orch = orchestrator(&ctx, vcs, service.clone(), 100);

    orch.run_cycle(|_: &Progress| {}).await.unwrap();
    service.set_status(RemoteJobStatus::Completed);
    service.state.lock().unwrap().fail_fetch = true;

    let err = orch.run_cycle(|_: &Progress| {}).await.unwrap_err();
    assert!(matches!(err, PipelineError::Service(_)));
    assert_eq!(ctx.db.list_open_batch_jobs().await.unwrap().len(), 1);
    assert_eq!(ctx.db.commit_counts().await.unwrap().enriched, 0);

    service.state.lock().unwrap().fail_fetch = false;
    let r = orch.run_cycle(|_: &Progress| {}).await.unwrap();
    assert_eq!(r.outcome, CycleOutcome::Imported);
    assert_eq!(ctx.db.commit_counts().await.unwrap().enriched, 2);
}

#[tokio::test]
async fn test_expired_job_marks_members_failed() {
    let tmp = tempfile::tempdir().unwrap();
    let (ctx, vcs) = setup(tmp.path(), commits(2)).await;
    let service = FakeService::batch();
    let orch = orchestrator(&ctx, vcs, service.clone(), 100);

    orch.run_cycle(|_: &Progress| {}).await.unwrap();
    service.set_status(RemoteJobStatus::Failed {
        reason: "batch expired".into(),
    });

    let r = orch.run_cycle(|_: &Progress| {}).await.unwrap();
    assert_eq!(r.outcome, CycleOutcome::Imported);
    assert_eq!(r.summary.jobs_failed, 1);
    assert_eq!(r.summary.failed_commits, 2);
    assert_eq!(service.state.lock().unwrap().fetches, 0);

    let job = ctx.db.get_batch_job("job-1").await.unwrap().unwrap();
    assert_eq!(job.status, BatchJobStatus::Failed);
    let counts = ctx.db.commit_counts().await.unwrap();
    assert_eq!((counts.failed, counts.unenriched), (2, 0));

    let r = orch.run_cycle(|_: &Progress| {}).await.unwrap();
    assert_eq!(r.outcome, CycleOutcome::Done);

    // Explicit retry makes them eligible again.
    assert_eq!(ctx.db.retry_failed_enrichments().await.unwrap(), 2);
    let r = orch.run_cycle(|_: &Progress| {}).await.unwrap();
    assert_eq!(r.outcome, CycleOutcome::Submitted);
}

#[tokio::test]
async fn test_synchronous_backend_imports_in_one_cycle() {
    let tmp = tempfile::tempdir().unwrap();
    let (ctx, vcs) = setup(tmp.path(), commits(3)).await;
    let service = FakeService::sync();
    let orch = orchestrator(&ctx, vcs, service.clone(), 100);

    let r = orch.run_cycle(|_: &Progress| {}).await.unwrap();
    assert_eq!(r.outcome, CycleOutcome::Imported);
    assert_eq!(r.summary.imported, 3);
    assert_eq!(service.state.lock().unwrap().polls, 0);

    let job = ctx.db.get_batch_job("job-1").await.unwrap().unwrap();
    assert_eq!(job.status, BatchJobStatus::Completed);
    assert!(ctx.db.list_open_batch_jobs().await.unwrap().is_empty());

    let r = orch.run_cycle(|_: &Progress| {}).await.unwrap();
    assert_eq!(r.outcome, CycleOutcome::Done);
}

#[tokio::test]
async fn test_open_job_from_other_backend_is_configuration_error() {
    let tmp = tempfile::tempdir().unwrap();
    let (ctx, vcs) = setup(tmp.path(), commits(1)).await;
    ctx.db
        .create_batch_job(&NewBatchJob {
            id: "msgbatch_1".into(),
            backend: "anthropic-batch".into(),
            model: "m".into(),
            member_hashes: vec!["c0".into()],
        })
        .await
        .unwrap();

    let service = FakeService::sync();
    let orch = orchestrator(&ctx, vcs, service.clone(), 100);
    let err = orch.run_cycle(|_: &Progress| {}).await.unwrap_err();
    assert!(matches!(err, PipelineError::Configuration(_)), "got {err:?}");
    assert_eq!(service.network_calls(), 0);
}

#[tokio::test]
async fn test_pending_commits_are_partitioned_by_batch_size() {
    let tmp = tempfile::tempdir().unwrap();
    let (ctx, vcs) = setup(tmp.path(), commits(5)).await;
    let service = FakeService::batch();
    let orch = orchestrator(&ctx, vcs, service.clone(), 2);

    let r = orch.run_cycle(|_: &Progress| {}).await.unwrap();
    assert_eq!(r.summary.submitted_jobs.len(), 3);

    let sizes: Vec<usize> = service
        .state
        .lock()
        .unwrap()
        .submitted
        .iter()
        .map(Vec::len)
        .collect();
    assert_eq!(sizes, vec![2, 2, 1]);

    let mut all: Vec<String> = service.state.lock().unwrap().submitted.concat();
    all.sort();
    all.dedup();
    assert_eq!(all.len(), 5);
}

#[tokio::test]
async fn test_commits_added_during_open_job_wait_for_next_submission() {
    let tmp = tempfile::tempdir().unwrap();
    let (ctx, vcs) = setup(tmp.path(), commits(2)).await;
    let service = FakeService::batch();
    let orch = orchestrator(&ctx, vcs, service.clone(), 100);
    orch.run_cycle(|_: &Progress| {}).await.unwrap();

    ctx.db
        .insert_new_commits(&[commit("late", 1_800_000_000, &["src/z.rs"])])
        .await
        .unwrap();
    let r = orch.run_cycle(|_: &Progress| {}).await.unwrap();
    assert_eq!(r.outcome, CycleOutcome::InProgress);
    assert_eq!(service.state.lock().unwrap().submitted.len(), 1);

    service.set_status(RemoteJobStatus::Completed);
    orch.run_cycle(|_: &Progress| {}).await.unwrap();
    let r = orch.run_cycle(|_: &Progress| {}).await.unwrap();
    assert_eq!(r.outcome, CycleOutcome::Submitted);
    assert_eq!(
        service.state.lock().unwrap().submitted.last().unwrap(),
        &vec!["late".to_string()]
    );
}

#[tokio::test]
async fn test_missing_diff_still_submits_commit() {
    let tmp = tempfile::tempdir().unwrap();
    let ctx = IndexContext::init(tmp.path()).await.unwrap();
    let mut fake = FakeVcs::new(commits(2));
    fake.broken_diffs.insert("c1".into());
    let vcs = Arc::new(fake);
    ctx.db.insert_new_commits(&vcs.commits).await.unwrap();

    let service = FakeService::batch();
    let orch = orchestrator(&ctx, vcs, service.clone(), 100);
    orch.run_cycle(|_: &Progress| {}).await.unwrap();

    let s = service.state.lock().unwrap();
    assert_eq!(s.diffs_seen["c1"], "");
    assert!(s.diffs_seen["c0"].contains("+change"));
}

#[tokio::test]
async fn test_sync_commits_is_incremental() {
    let tmp = tempfile::tempdir().unwrap();
    let ctx = IndexContext::init(tmp.path()).await.unwrap();
    let vcs = FakeVcs::new(commits(3));
    let lock = WriteLock::acquire(&ctx.index_dir).unwrap();

    let first = sync_commits(&vcs, &ctx.db, None, &lock).await.unwrap();
    assert_eq!((first.scanned, first.inserted), (3, 3));
    let second = sync_commits(&vcs, &ctx.db, None, &lock).await.unwrap();
    assert_eq!((second.scanned, second.inserted), (3, 0));
}

#[tokio::test]
async fn test_submit_failure_after_accepted_chunk_keeps_the_job() {
    let tmp = tempfile::tempdir().unwrap();
    let (ctx, vcs) = setup(tmp.path(), commits(4)).await;
    let service = FakeService::batch();
    service.state.lock().unwrap().accepted_submits = Some(1);
    let orch = orchestrator(&ctx, vcs, service.clone(), 2);

    let r = orch.run_cycle(|_: &Progress| {}).await.unwrap();
    assert_eq!(r.outcome, CycleOutcome::Submitted);
    assert_eq!(r.summary.submitted_jobs, vec!["job-1".to_string()]);
    assert_eq!(r.summary.submitted_commits, 2);
    assert_eq!(r.summary.service_errors.len(), 1);
    assert!(r.summary.service_errors[0].starts_with("submit batch 2/2"));
    assert_eq!(ctx.db.list_open_batch_jobs().await.unwrap().len(), 1);

    // The unsubmitted half goes out on the next cycle once the open job closes.
    service.state.lock().unwrap().accepted_submits = None;
    service.set_status(RemoteJobStatus::Completed);
    let r = orch.run_cycle(|_: &Progress| {}).await.unwrap();
    assert_eq!(r.outcome, CycleOutcome::Imported);
    let r = orch.run_cycle(|_: &Progress| {}).await.unwrap();
    assert_eq!(r.outcome, CycleOutcome::Submitted);
    assert_eq!(r.summary.submitted_commits, 2);
}

#[tokio::test]
async fn test_fetch_failure_after_import_reports_partial_progress() {
    let tmp = tempfile::tempdir().unwrap();
    let (ctx, vcs) = setup(tmp.path(), commits(4)).await;
    let service = FakeService::batch();
    let orch = orchestrator(&ctx, vcs, service.clone(), 2);

    let r = orch.run_cycle(|_: &Progress| {}).await.unwrap();
    assert_eq!(r.summary.submitted_jobs.len(), 2);

    service.set_status(RemoteJobStatus::Completed);
    service.state.lock().unwrap().answered_fetches = Some(1);
    let r = orch.run_cycle(|_: &Progress| {}).await.unwrap();
    assert_eq!(r.outcome, CycleOutcome::Imported);
    assert_eq!(r.summary.jobs_imported, 1);
    assert_eq!(r.summary.imported, 2);
    assert_eq!(r.summary.service_errors.len(), 1);
    assert_eq!(ctx.db.commit_counts().await.unwrap().enriched, 2);
    assert_eq!(ctx.db.list_open_batch_jobs().await.unwrap().len(), 1);

    service.state.lock().unwrap().answered_fetches = None;
    let r = orch.run_cycle(|_: &Progress| {}).await.unwrap();
    assert_eq!(r.outcome, CycleOutcome::Imported);
    assert!(r.summary.service_errors.is_empty());
    assert_eq!(ctx.db.commit_counts().await.unwrap().enriched, 4);
    assert!(ctx.db.list_open_batch_jobs().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_since_cutoff_is_start_of_day_utc() {
    let tmp = tempfile::tempdir().unwrap();
    let history = vec![
        commit("before", 1_709_251_199, &["a.rs"]),
        commit("at", 1_709_251_200, &["a.rs"]),
    ];
    let (ctx, vcs) = setup(tmp.path(), history).await;
    let service = FakeService::batch();
    let config = EnrichConfig {
        since: NaiveDate::from_ymd_opt(2024, 3, 1),
        ..EnrichConfig::default()
    };
    let orch = EnrichmentOrchestrator::new(
        ctx.index_dir.clone(),
        ctx.db.clone(),
        Arc::new(CommitSearchIndex::open_in_ram().unwrap()),
        vcs,
        service.clone(),
        config,
    );

    orch.run_cycle(|_: &Progress| {}).await.unwrap();
    assert_eq!(service.state.lock().unwrap().submitted, vec![vec!["at".to_string()]]);
}
