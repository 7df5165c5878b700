// crates/db/src/queries/batch_jobs.rs
// BatchJobStore: submission records, member sets and atomic result import.

use std::collections::HashSet;

use commitscope_core::llm::{ClassificationResult, ItemErrorKind, ResultOutcome};
use commitscope_core::{BatchJob, BatchJobStatus, NewBatchJob};
use serde::Serialize;
use sqlx::SqliteConnection;

use super::commits::{mark_failed, write_verdict};
use super::row_types::BatchJobRow;
use super::IN_CHUNK;
use crate::{now_secs, Database, DbError, DbResult};

const OPEN_STATUSES: &str = "('submitted', 'in_progress')";

/// Outcome of importing one job's results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    /// Verdicts written.
    pub imported: u64,
    /// Per-item errors recorded (including parse failures).
    pub item_errors: u64,
    /// Subset of `item_errors` where the answer could not be interpreted.
    pub parse_failures: u64,
    /// Members the service returned nothing for; recorded as failed.
    pub missing: u64,
    /// Results ignored: unknown hash, duplicate, or commit already enriched.
    pub skipped: u64,
}

impl Database {
    /// Record a freshly submitted job. Rejects the job if any member is
    /// already part of another open job.
    pub async fn create_batch_job(&self, job: &NewBatchJob) -> DbResult<BatchJob> {
        let mut tx = self.pool().begin().await?;
        insert_job(&mut tx, job).await?;
        tx.commit().await?;

        tracing::info!(job_id = %job.id, members = job.member_hashes.len(), "batch job recorded");
        self.get_batch_job(&job.id)
            .await?
            .ok_or_else(|| DbError::JobNotFound(job.id.clone()))
    }

    /// Record a job whose results were produced synchronously and import
    /// them, all in one transaction.
    pub async fn record_completed_sync_batch(
        &self,
        job: &NewBatchJob,
        results: &[ClassificationResult],
    ) -> DbResult<ImportSummary> {
        let mut tx = self.pool().begin().await?;
        let members = insert_job(&mut tx, job).await?;
        let summary = apply_results(&mut tx, &job.id, &members, results).await?;
        close_completed(&mut tx, &job.id, &summary).await?;
        tx.commit().await?;
        Ok(summary)
    }

    /// Import a job's results and mark it completed, atomically. Fails with
    /// `JobNotOpen` if the job was already closed, so results are never
    /// imported twice.
    pub async fn import_batch_results(
        &self,
        job_id: &str,
        results: &[ClassificationResult],
    ) -> DbResult<ImportSummary> {
        let mut tx = self.pool().begin().await?;
        require_open(&mut tx, job_id).await?;
        let members: HashSet<String> = member_hashes(&mut tx, job_id).await?.into_iter().collect();
        let summary = apply_results(&mut tx, job_id, &members, results).await?;
        close_completed(&mut tx, job_id, &summary).await?;
        tx.commit().await?;

        tracing::info!(
            job_id,
            imported = summary.imported,
            item_errors = summary.item_errors,
            missing = summary.missing,
            "batch results imported"
        );
        Ok(summary)
    }

    /// Move an open job to another status. Terminal jobs never change.
    pub async fn update_batch_job_status(
        &self,
        job_id: &str,
        status: BatchJobStatus,
    ) -> DbResult<()> {
        let now = now_secs();
        let completed_at = (!status.is_open()).then_some(now);
        let result = sqlx::query(&format!(
            r#"
            UPDATE batch_jobs SET status = ?2, updated_at = ?3, completed_at = ?4
            WHERE id = ?1 AND status IN {OPEN_STATUSES}
            "#
        ))
        .bind(job_id)
        .bind(status.as_db_str())
        .bind(now)
        .bind(completed_at)
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(match self.get_batch_job(job_id).await? {
                Some(_) => DbError::JobNotOpen(job_id.to_string()),
                None => DbError::JobNotFound(job_id.to_string()),
            });
        }
        Ok(())
    }

    /// Close a job as failed without importing anything. Every member still
    /// lacking a verdict is marked enrichment-failed. Returns how many.
    pub async fn fail_batch_job(&self, job_id: &str, reason: &str) -> DbResult<u64> {
        let now = now_secs();
        let mut tx = self.pool().begin().await?;
        require_open(&mut tx, job_id).await?;

        let members = member_hashes(&mut tx, job_id).await?;
        let item_reason = format!("batch {job_id} failed: {reason}");
        let mut marked = 0;
        for hash in &members {
            marked += mark_failed(&mut tx, hash, &item_reason).await?;
        }

        sqlx::query(
            r#"
            UPDATE batch_jobs SET
                status = 'failed',
                failed_count = ?2,
                error_message = ?3,
                updated_at = ?4,
                completed_at = ?4
            WHERE id = ?1
            "#,
        )
        .bind(job_id)
        .bind(members.len() as i64)
        .bind(reason)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        tracing::warn!(job_id, reason, members = members.len(), "batch job failed");
        Ok(marked)
    }

    /// Open jobs, oldest first.
    pub async fn list_open_batch_jobs(&self) -> DbResult<Vec<BatchJob>> {
        let rows: Vec<BatchJobRow> = sqlx::query_as(&format!(
            "SELECT * FROM batch_jobs WHERE status IN {OPEN_STATUSES} ORDER BY created_at ASC, id ASC"
        ))
        .fetch_all(self.pool())
        .await?;
        self.with_members(rows).await
    }

    pub async fn get_batch_job(&self, job_id: &str) -> DbResult<Option<BatchJob>> {
        let row: Option<BatchJobRow> = sqlx::query_as("SELECT * FROM batch_jobs WHERE id = ?1")
            .bind(job_id)
            .fetch_optional(self.pool())
            .await?;
        match row {
            Some(row) => Ok(self.with_members(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    /// Most recent jobs of any status, newest first.
    pub async fn recent_batch_jobs(&self, limit: i64) -> DbResult<Vec<BatchJob>> {
        let rows: Vec<BatchJobRow> =
            sqlx::query_as("SELECT * FROM batch_jobs ORDER BY created_at DESC, id DESC LIMIT ?1")
                .bind(limit)
                .fetch_all(self.pool())
                .await?;
        self.with_members(rows).await
    }

    async fn with_members(&self, rows: Vec<BatchJobRow>) -> DbResult<Vec<BatchJob>> {
        let mut conn = self.pool().acquire().await?;
        let mut jobs = Vec::with_capacity(rows.len());
        for row in rows {
            let members = member_hashes(&mut conn, &row.id).await?;
            jobs.push(row.into_batch_job(members)?);
        }
        Ok(jobs)
    }
}

// ============================================================================
// Transaction helpers
// ============================================================================

/// Insert the job and its members after checking none is in an open job.
/// Returns the de-duplicated member set.
async fn insert_job(conn: &mut SqliteConnection, job: &NewBatchJob) -> DbResult<HashSet<String>> {
    let mut seen = HashSet::new();
    let members: Vec<&str> = job
        .member_hashes
        .iter()
        .map(String::as_str)
        .filter(|h| seen.insert(*h))
        .collect();

    for chunk in members.chunks(IN_CHUNK) {
        let mut qb = sqlx::QueryBuilder::<sqlx::Sqlite>::new(format!(
            "SELECT m.hash, m.job_id FROM batch_job_members m \
             JOIN batch_jobs j ON j.id = m.job_id \
             WHERE j.status IN {OPEN_STATUSES} AND m.hash IN ("
        ));
        let mut sep = qb.separated(", ");
        for h in chunk {
            sep.push_bind(*h);
        }
        qb.push(") LIMIT 1");
        let clash: Option<(String, String)> =
            qb.build_query_as().fetch_optional(&mut *conn).await?;
        if let Some((hash, job_id)) = clash {
            return Err(DbError::DuplicateSubmission { hash, job_id });
        }
    }

    let now = now_secs();
    sqlx::query(
        r#"
        INSERT INTO batch_jobs (id, status, backend, model, request_count, created_at, updated_at)
        VALUES (?1, 'submitted', ?2, ?3, ?4, ?5, ?5)
        "#,
    )
    .bind(&job.id)
    .bind(&job.backend)
    .bind(&job.model)
    .bind(members.len() as i64)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    for hash in &members {
        sqlx::query("INSERT INTO batch_job_members (job_id, hash) VALUES (?1, ?2)")
            .bind(&job.id)
            .bind(*hash)
            .execute(&mut *conn)
            .await?;
    }

    Ok(members.into_iter().map(String::from).collect())
}

async fn require_open(conn: &mut SqliteConnection, job_id: &str) -> DbResult<()> {
    let status: Option<(String,)> = sqlx::query_as("SELECT status FROM batch_jobs WHERE id = ?1")
        .bind(job_id)
        .fetch_optional(&mut *conn)
        .await?;
    match status.and_then(|(s,)| BatchJobStatus::from_db_str(&s)) {
        Some(s) if s.is_open() => Ok(()),
        Some(_) => Err(DbError::JobNotOpen(job_id.to_string())),
        None => Err(DbError::JobNotFound(job_id.to_string())),
    }
}

async fn member_hashes(conn: &mut SqliteConnection, job_id: &str) -> Result<Vec<String>, sqlx::Error> {
    let rows: Vec<(String,)> =
        sqlx::query_as("SELECT hash FROM batch_job_members WHERE job_id = ?1 ORDER BY hash")
            .bind(job_id)
            .fetch_all(&mut *conn)
            .await?;
    Ok(rows.into_iter().map(|(h,)| h).collect())
}

/// Write every result for a job's members; members with no result are
/// recorded as failed.
async fn apply_results(
    conn: &mut SqliteConnection,
    job_id: &str,
    members: &HashSet<String>,
    results: &[ClassificationResult],
) -> DbResult<ImportSummary> {
    let mut summary = ImportSummary::default();
    let mut seen: HashSet<&str> = HashSet::new();

    for result in results {
        if !members.contains(&result.hash) || !seen.insert(result.hash.as_str()) {
            tracing::debug!(job_id, hash = %result.hash, "ignoring result outside job membership");
            summary.skipped += 1;
            continue;
        }
        match &result.outcome {
            ResultOutcome::Verdict(verdict) => {
                if write_verdict(conn, &result.hash, verdict, true).await? > 0 {
                    summary.imported += 1;
                } else {
                    summary.skipped += 1;
                }
            }
            ResultOutcome::Error(err) => {
                tracing::warn!(job_id, hash = %result.hash, error = %err, "enrichment failed for commit");
                mark_failed(conn, &result.hash, &err.to_string()).await?;
                summary.item_errors += 1;
                if err.kind == ItemErrorKind::Parse {
                    summary.parse_failures += 1;
                }
            }
        }
    }

    let mut missing: Vec<&String> = members.iter().filter(|h| !seen.contains(h.as_str())).collect();
    missing.sort();
    for hash in missing {
        mark_failed(conn, hash, "no result returned by classification service").await?;
        summary.missing += 1;
    }

    Ok(summary)
}

async fn close_completed(
    conn: &mut SqliteConnection,
    job_id: &str,
    summary: &ImportSummary,
) -> Result<(), sqlx::Error> {
    let now = now_secs();
    sqlx::query(
        r#"
        UPDATE batch_jobs SET
            status = 'completed',
            succeeded_count = ?2,
            failed_count = ?3,
            updated_at = ?4,
            completed_at = ?4
        WHERE id = ?1
        "#,
    )
    .bind(job_id)
    .bind(summary.imported as i64)
    .bind((summary.item_errors + summary.missing) as i64)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(())
}
