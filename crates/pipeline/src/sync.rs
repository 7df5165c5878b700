// crates/pipeline/src/sync.rs
//! Commit discovery: copy new commits from version control into the store.

use std::time::Instant;

use chrono::NaiveDate;
use commitscope_core::{VersionControl, WriteLock};
use commitscope_db::{Database, RebuildSummary};
use serde::Serialize;

use crate::context::IndexContext;
use crate::error::PipelineResult;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSummary {
    /// Commits reported by version control.
    pub scanned: u64,
    /// Commits that were not yet in the store.
    pub inserted: u64,
}

/// Insert every commit not yet known. Existing rows, including their
/// enrichment, are left untouched. Taking `&WriteLock` ties the write to a
/// held lock.
pub async fn sync_commits(
    vcs: &dyn VersionControl,
    db: &Database,
    since: Option<NaiveDate>,
    _lock: &WriteLock,
) -> PipelineResult<SyncSummary> {
    let start = Instant::now();
    let commits = vcs.list_commits(since).await?;
    let inserted = db.insert_new_commits(&commits).await?;

    let summary = SyncSummary {
        scanned: commits.len() as u64,
        inserted,
    };
    tracing::info!(
        scanned = summary.scanned,
        inserted = summary.inserted,
        duration_secs = start.elapsed().as_secs_f64(),
        "commit sync complete"
    );
    Ok(summary)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexSummary {
    pub sync: SyncSummary,
    pub rebuild: RebuildSummary,
    pub indexed: u64,
}

/// `index` command: sync commits, then rebuild aggregates and the search
/// index, all under the write lock. Never calls the classification service.
pub async fn index_repository(
    ctx: &IndexContext,
    vcs: &dyn VersionControl,
    since: Option<NaiveDate>,
) -> PipelineResult<IndexSummary> {
    let lock = WriteLock::acquire(&ctx.index_dir)?;

    let sync = sync_commits(vcs, &ctx.db, since.or(ctx.config.since), &lock).await?;
    let rebuild = ctx.aggregates().rebuild_all().await?;

    let search = ctx.open_search()?;
    let commits = ctx.db.all_commits().await?;
    let indexed = tokio::task::spawn_blocking(move || search.rebuild(&commits))
        .await
        .map_err(std::io::Error::other)?? as u64;

    lock.release();
    Ok(IndexSummary {
        sync,
        rebuild,
        indexed,
    })
}
