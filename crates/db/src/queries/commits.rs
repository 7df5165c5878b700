// crates/db/src/queries/commits.rs
// CommitStore: commit rows, their file-change history and enrichment fields.

use std::collections::{HashMap, HashSet};

use commitscope_core::git::GitCommit;
use commitscope_core::{Commit, CommitCounts, Verdict};
use sqlx::SqliteConnection;

use super::row_types::CommitRow;
use super::IN_CHUNK;
use crate::{now_secs, Database, DbResult};

const COMMIT_COLUMNS: &str = "hash, author, author_email, timestamp, message, classification, \
     summary, complexity, enrichment_error";

impl Database {
    /// Insert commits not yet known, with their file lists, in one
    /// transaction. Existing rows are left untouched. Returns the number of
    /// commits inserted.
    pub async fn insert_new_commits(&self, commits: &[GitCommit]) -> DbResult<u64> {
        let now = now_secs();
        let mut tx = self.pool().begin().await?;
        let mut inserted = 0u64;

        for commit in commits {
            let mut seen = HashSet::new();
            let files: Vec<&str> = commit
                .files_changed
                .iter()
                .map(String::as_str)
                .filter(|f| seen.insert(*f))
                .collect();

            let result = sqlx::query(
                r#"
                INSERT OR IGNORE INTO commits
                    (hash, author, author_email, timestamp, message, file_count, discovered_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
            )
            .bind(&commit.hash)
            .bind(&commit.author)
            .bind(&commit.author_email)
            .bind(commit.timestamp)
            .bind(&commit.message)
            .bind(files.len() as i64)
            .bind(now)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                continue;
            }
            inserted += 1;

            for (ordinal, path) in files.iter().enumerate() {
                sqlx::query("INSERT INTO commit_files (hash, ordinal, path) VALUES (?1, ?2, ?3)")
                    .bind(&commit.hash)
                    .bind(ordinal as i64)
                    .bind(*path)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await?;
        Ok(inserted)
    }

    /// Commits with no classification that are neither marked failed nor
    /// members of an open batch job, oldest first.
    pub async fn list_unenriched_commits(
        &self,
        since: Option<i64>,
        limit: Option<i64>,
    ) -> DbResult<Vec<Commit>> {
        let rows: Vec<CommitRow> = sqlx::query_as(&format!(
            r#"
            SELECT {COMMIT_COLUMNS} FROM commits c
            WHERE c.classification IS NULL
              AND c.enrichment_failed_at IS NULL
              AND (?1 IS NULL OR c.timestamp >= ?1)
              AND NOT EXISTS (
                  SELECT 1 FROM batch_job_members m
                  JOIN batch_jobs j ON j.id = m.job_id
                  WHERE m.hash = c.hash AND j.status IN ('submitted', 'in_progress')
              )
            ORDER BY c.timestamp ASC, c.hash ASC
            LIMIT ?2
            "#
        ))
        .bind(since)
        .bind(limit.unwrap_or(-1))
        .fetch_all(self.pool())
        .await?;

        self.attach_files(rows).await
    }

    pub async fn get_commit(&self, hash: &str) -> DbResult<Option<Commit>> {
        let row: Option<CommitRow> =
            sqlx::query_as(&format!("SELECT {COMMIT_COLUMNS} FROM commits WHERE hash = ?1"))
                .bind(hash)
                .fetch_optional(self.pool())
                .await?;
        match row {
            Some(row) => Ok(self.attach_files(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    /// Every commit, newest first.
    pub async fn all_commits(&self) -> DbResult<Vec<Commit>> {
        let rows: Vec<CommitRow> = sqlx::query_as(&format!(
            "SELECT {COMMIT_COLUMNS} FROM commits ORDER BY timestamp DESC, hash ASC"
        ))
        .fetch_all(self.pool())
        .await?;

        let mut files = self.files_by_commit().await?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let f = files.remove(&row.hash).unwrap_or_default();
                row.into_commit(f)
            })
            .collect())
    }

    /// Write enrichment fields for one commit, clearing any failure marker.
    /// Returns false if the commit is unknown.
    pub async fn upsert_enrichment(&self, hash: &str, verdict: &Verdict) -> DbResult<bool> {
        let mut conn = self.pool().acquire().await?;
        let n = write_verdict(&mut conn, hash, verdict, false).await?;
        Ok(n > 0)
    }

    /// Record that enrichment failed for a commit still lacking a verdict.
    pub async fn mark_enrichment_failed(&self, hash: &str, reason: &str) -> DbResult<bool> {
        let mut conn = self.pool().acquire().await?;
        let n = mark_failed(&mut conn, hash, reason).await?;
        Ok(n > 0)
    }

    /// Clear failure markers so the next cycle resubmits those commits.
    pub async fn retry_failed_enrichments(&self) -> DbResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE commits SET enrichment_error = NULL, enrichment_failed_at = NULL
            WHERE classification IS NULL AND enrichment_failed_at IS NOT NULL
            "#,
        )
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn commit_counts(&self) -> DbResult<CommitCounts> {
        let row: (i64, i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*),
                COALESCE(SUM(classification IS NOT NULL), 0),
                COALESCE(SUM(classification IS NULL AND enrichment_failed_at IS NULL), 0),
                COALESCE(SUM(classification IS NULL AND enrichment_failed_at IS NOT NULL), 0)
            FROM commits
            "#,
        )
        .fetch_one(self.pool())
        .await?;
        Ok(CommitCounts {
            total: row.0,
            enriched: row.1,
            unenriched: row.2,
            failed: row.3,
        })
    }

    /// Commits whose enrichment failed, newest first.
    pub async fn list_failed_commits(&self, limit: i64) -> DbResult<Vec<Commit>> {
        let rows: Vec<CommitRow> = sqlx::query_as(&format!(
            r#"
            SELECT {COMMIT_COLUMNS} FROM commits
            WHERE classification IS NULL AND enrichment_failed_at IS NOT NULL
            ORDER BY enrichment_failed_at DESC, hash ASC
            LIMIT ?1
            "#
        ))
        .bind(limit)
        .fetch_all(self.pool())
        .await?;
        self.attach_files(rows).await
    }

    async fn attach_files(&self, rows: Vec<CommitRow>) -> DbResult<Vec<Commit>> {
        let mut files: HashMap<String, Vec<String>> = HashMap::new();
        let hashes: Vec<&str> = rows.iter().map(|r| r.hash.as_str()).collect();

        for chunk in hashes.chunks(IN_CHUNK) {
            let mut qb = sqlx::QueryBuilder::<sqlx::Sqlite>::new(
                "SELECT hash, path FROM commit_files WHERE hash IN (",
            );
            let mut sep = qb.separated(", ");
            for h in chunk {
                sep.push_bind(*h);
            }
            qb.push(") ORDER BY hash, ordinal");
            let pairs: Vec<(String, String)> = qb.build_query_as().fetch_all(self.pool()).await?;
            for (hash, path) in pairs {
                files.entry(hash).or_default().push(path);
            }
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let f = files.remove(&row.hash).unwrap_or_default();
                row.into_commit(f)
            })
            .collect())
    }

    async fn files_by_commit(&self) -> DbResult<HashMap<String, Vec<String>>> {
        let pairs: Vec<(String, String)> =
            sqlx::query_as("SELECT hash, path FROM commit_files ORDER BY hash, ordinal")
                .fetch_all(self.pool())
                .await?;
        let mut files: HashMap<String, Vec<String>> = HashMap::new();
        for (hash, path) in pairs {
            files.entry(hash).or_default().push(path);
        }
        Ok(files)
    }
}

// ============================================================================
// Connection-level helpers shared with batch import transactions
// ============================================================================

/// Write a verdict. With `only_if_unenriched`, an existing classification is
/// never overwritten. Returns rows affected.
pub(crate) async fn write_verdict(
    conn: &mut SqliteConnection,
    hash: &str,
    verdict: &Verdict,
    only_if_unenriched: bool,
) -> Result<u64, sqlx::Error> {
    let guard = if only_if_unenriched {
        " AND classification IS NULL"
    } else {
        ""
    };
    let result = sqlx::query(&format!(
        r#"
        UPDATE commits SET
            classification = ?2,
            summary = ?3,
            complexity = ?4,
            enriched_at = ?5,
            enrichment_error = NULL,
            enrichment_failed_at = NULL
        WHERE hash = ?1{guard}
        "#
    ))
    .bind(hash)
    .bind(verdict.classification.as_str())
    .bind(&verdict.summary)
    .bind(verdict.complexity as i64)
    .bind(now_secs())
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}

/// Mark a still-unenriched commit as failed. Returns rows affected.
pub(crate) async fn mark_failed(
    conn: &mut SqliteConnection,
    hash: &str,
    reason: &str,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE commits SET enrichment_error = ?2, enrichment_failed_at = ?3
        WHERE hash = ?1 AND classification IS NULL
        "#,
    )
    .bind(hash)
    .bind(reason)
    .bind(now_secs())
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}
