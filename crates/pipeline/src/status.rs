// crates/pipeline/src/status.rs
//! Read-only snapshot of an index: commit totals, jobs, aggregates, lock.

use commitscope_core::lock::read_holder;
use commitscope_core::{BatchJob, CommitCounts, LockHolder};
use commitscope_db::AggregateMeta;
use serde::Serialize;

use crate::context::IndexContext;
use crate::error::PipelineResult;

const RECENT_JOBS: i64 = 5;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStatus {
    pub commits: CommitCounts,
    pub open_jobs: Vec<BatchJob>,
    pub recent_jobs: Vec<BatchJob>,
    pub aggregates: Option<AggregateMeta>,
    pub aggregates_stale: bool,
    pub lock: Option<LockHolder>,
}

impl IndexStatus {
    /// True when another `enrich` invocation would do something.
    pub fn has_pending_work(&self) -> bool {
        self.commits.unenriched > 0 || !self.open_jobs.is_empty() || self.aggregates_stale
    }
}

/// Does not take the write lock.
pub async fn status(ctx: &IndexContext) -> PipelineResult<IndexStatus> {
    let engine = ctx.aggregates();
    Ok(IndexStatus {
        commits: ctx.db.commit_counts().await?,
        open_jobs: ctx.db.list_open_batch_jobs().await?,
        recent_jobs: ctx.db.recent_batch_jobs(RECENT_JOBS).await?,
        aggregates: engine.aggregate_meta().await?,
        aggregates_stale: engine.aggregates_stale().await?,
        lock: read_holder(&ctx.index_dir)?,
    })
}
