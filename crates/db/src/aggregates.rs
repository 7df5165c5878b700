// crates/db/src/aggregates.rs
//! AggregateEngine: derived statistics rebuilt from the commit table.
//!
//! Aggregates are a materialized view. `rebuild_all` reads a snapshot of
//! commits and their file lists, computes everything in memory, then
//! replaces every aggregate table inside one transaction, so readers see
//! either the previous view or the new one.

use std::collections::{BTreeMap, BTreeSet};

use chrono::DateTime;
use commitscope_core::{categorize_path, Classification, FileCategory};
use serde::Serialize;
use sqlx::Row;

use crate::{now_secs, Database, DbResult};

/// Weight of normalized change count in the hotspot score.
pub const HOTSPOT_CHURN_WEIGHT: f64 = 0.6;
/// Weight of normalized complexity in the hotspot score.
pub const HOTSPOT_COMPLEXITY_WEIGHT: f64 = 0.4;

pub(crate) const UNCLASSIFIED: &str = "unclassified";

// ============================================================================
// Types
// ============================================================================

/// Input row for aggregate computation.
#[derive(Debug, Clone)]
pub struct CommitSnapshot {
    pub hash: String,
    pub timestamp: i64,
    pub classification: Option<Classification>,
    pub complexity: Option<u8>,
    pub files: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileStats {
    pub path: String,
    pub category: FileCategory,
    pub total_changes: i64,
    /// Complexity of the most recent enriched commit touching the file.
    pub complexity: Option<u8>,
    pub hotspot_score: f64,
    pub first_changed_at: i64,
    pub last_changed_at: i64,
    /// Classification name (or "unclassified") to number of commits.
    pub classification_counts: BTreeMap<String, i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Hotspot {
    pub path: String,
    pub category: FileCategory,
    pub total_changes: i64,
    pub complexity: Option<u8>,
    pub score: f64,
}

/// Everything `rebuild_all` writes.
#[derive(Debug, Clone, Default)]
pub struct ComputedAggregates {
    pub files: Vec<FileStats>,
    /// (path_a, path_b, co_changes) with path_a < path_b.
    pub pairs: Vec<(String, String, i64)>,
    /// (month, classification, commit_count).
    pub trends: Vec<(String, String, i64)>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RebuildSummary {
    pub commits: u64,
    pub files: u64,
    pub pairs: u64,
    pub trend_buckets: u64,
}

/// Bookkeeping stored with each rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateMeta {
    pub rebuilt_at: i64,
    pub commit_count: i64,
    pub enriched_count: i64,
    pub failed_count: i64,
}

// ============================================================================
// Pure computation
// ============================================================================

/// Compute all aggregates from a snapshot.
///
/// Each commit counts once per distinct path. Commits touching more than
/// `max_files_for_coupling` distinct paths still count toward file stats but
/// are left out of coupling pairs.
pub fn compute_aggregates(commits: &[CommitSnapshot], max_files_for_coupling: usize) -> ComputedAggregates {
    struct Acc {
        changes: i64,
        first: i64,
        last: i64,
        complexity: Option<(i64, String, u8)>,
        counts: BTreeMap<String, i64>,
    }

    let mut files: BTreeMap<&str, Acc> = BTreeMap::new();
    let mut pairs: BTreeMap<(&str, &str), i64> = BTreeMap::new();
    let mut trends: BTreeMap<(String, String), i64> = BTreeMap::new();

    for commit in commits {
        let class_name = commit
            .classification
            .map(|c| c.as_str().to_string())
            .unwrap_or_else(|| UNCLASSIFIED.to_string());

        let month = DateTime::from_timestamp(commit.timestamp, 0)
            .map(|d| d.format("%Y-%m").to_string())
            .unwrap_or_else(|| "0000-00".to_string());
        *trends.entry((month, class_name.clone())).or_default() += 1;

        let distinct: BTreeSet<&str> = commit.files.iter().map(String::as_str).collect();
        for &path in &distinct {
            let acc = files.entry(path).or_insert_with(|| Acc {
                changes: 0,
                first: commit.timestamp,
                last: commit.timestamp,
                complexity: None,
                counts: BTreeMap::new(),
            });
            acc.changes += 1;
            acc.first = acc.first.min(commit.timestamp);
            acc.last = acc.last.max(commit.timestamp);
            *acc.counts.entry(class_name.clone()).or_default() += 1;

            if let (Some(_), Some(cx)) = (commit.classification, commit.complexity) {
                let newer = match &acc.complexity {
                    None => true,
                    Some((ts, hash, _)) => (commit.timestamp, commit.hash.as_str()) > (*ts, hash.as_str()),
                };
                if newer {
                    acc.complexity = Some((commit.timestamp, commit.hash.clone(), cx));
                }
            }
        }

        if distinct.len() >= 2 && distinct.len() <= max_files_for_coupling {
            let paths: Vec<&str> = distinct.into_iter().collect();
            for (i, a) in paths.iter().enumerate() {
                for b in &paths[i + 1..] {
                    *pairs.entry((*a, *b)).or_default() += 1;
                }
            }
        }
    }

    let max_changes = files.values().map(|a| a.changes).max().unwrap_or(0);
    let max_complexity = files
        .values()
        .filter_map(|a| a.complexity.as_ref().map(|c| c.2))
        .max()
        .unwrap_or(0);

    let files = files
        .into_iter()
        .map(|(path, acc)| {
            let complexity = acc.complexity.map(|c| c.2);
            FileStats {
                path: path.to_string(),
                category: categorize_path(path),
                total_changes: acc.changes,
                complexity,
                hotspot_score: hotspot_score(acc.changes, max_changes, complexity, max_complexity),
                first_changed_at: acc.first,
                last_changed_at: acc.last,
                classification_counts: acc.counts,
            }
        })
        .collect();

    ComputedAggregates {
        files,
        pairs: pairs
            .into_iter()
            .map(|((a, b), n)| (a.to_string(), b.to_string(), n))
            .collect(),
        trends: trends.into_iter().map(|((m, c), n)| (m, c, n)).collect(),
    }
}

/// Score in [0, 1]; increases with both churn and complexity.
pub fn hotspot_score(changes: i64, max_changes: i64, complexity: Option<u8>, max_complexity: u8) -> f64 {
    let churn = if max_changes > 0 {
        changes as f64 / max_changes as f64
    } else {
        0.0
    };
    let cx = match complexity {
        Some(c) if max_complexity > 0 => c as f64 / max_complexity as f64,
        _ => 0.0,
    };
    HOTSPOT_CHURN_WEIGHT * churn + HOTSPOT_COMPLEXITY_WEIGHT * cx
}

// ============================================================================
// Engine
// ============================================================================

/// Recomputes and serves derived statistics.
#[derive(Debug, Clone)]
pub struct AggregateEngine {
    db: Database,
    max_files_for_coupling: usize,
}

impl AggregateEngine {
    pub fn new(db: Database, max_files_for_coupling: usize) -> Self {
        Self {
            db,
            max_files_for_coupling,
        }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn max_files_for_coupling(&self) -> usize {
        self.max_files_for_coupling
    }

    /// Recompute every aggregate table from scratch. Snapshot read, computation
    /// and replacement happen inside one transaction.
    pub async fn rebuild_all(&self) -> DbResult<RebuildSummary> {
        let mut tx = self.db.pool().begin().await?;

        let rows = sqlx::query(
            "SELECT hash, timestamp, classification, complexity FROM commits ORDER BY timestamp, hash",
        )
        .fetch_all(&mut *tx)
        .await?;
        let file_rows: Vec<(String, String)> =
            sqlx::query_as("SELECT hash, path FROM commit_files ORDER BY hash, ordinal")
                .fetch_all(&mut *tx)
                .await?;

        let mut files_by_hash: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (hash, path) in file_rows {
            files_by_hash.entry(hash).or_default().push(path);
        }

        let mut snapshot = Vec::with_capacity(rows.len());
        for row in rows {
            let hash: String = row.try_get("hash")?;
            let classification: Option<String> = row.try_get("classification")?;
            let complexity: Option<i64> = row.try_get("complexity")?;
            snapshot.push(CommitSnapshot {
                files: files_by_hash.remove(&hash).unwrap_or_default(),
                hash,
                timestamp: row.try_get("timestamp")?,
                classification: classification.as_deref().and_then(Classification::parse),
                complexity: complexity.and_then(|c| u8::try_from(c).ok()),
            });
        }

        let computed = compute_aggregates(&snapshot, self.max_files_for_coupling);

        for table in [
            "file_stats",
            "file_classification_counts",
            "coupling_pairs",
            "trend_buckets",
        ] {
            sqlx::query(&format!("DELETE FROM {table}"))
                .execute(&mut *tx)
                .await?;
        }

        for f in &computed.files {
            sqlx::query(
                r#"
                INSERT INTO file_stats
                    (path, category, total_changes, complexity, hotspot_score, first_changed_at, last_changed_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
            )
            .bind(&f.path)
            .bind(f.category.as_str())
            .bind(f.total_changes)
            .bind(f.complexity.map(i64::from))
            .bind(f.hotspot_score)
            .bind(f.first_changed_at)
            .bind(f.last_changed_at)
            .execute(&mut *tx)
            .await?;

            for (class, count) in &f.classification_counts {
                sqlx::query(
                    "INSERT INTO file_classification_counts (path, classification, count) VALUES (?1, ?2, ?3)",
                )
                .bind(&f.path)
                .bind(class)
                .bind(*count)
                .execute(&mut *tx)
                .await?;
            }
        }

        for (a, b, n) in &computed.pairs {
            sqlx::query("INSERT INTO coupling_pairs (path_a, path_b, co_changes) VALUES (?1, ?2, ?3)")
                .bind(a)
                .bind(b)
                .bind(*n)
                .execute(&mut *tx)
                .await?;
        }

        for (month, class, n) in &computed.trends {
            sqlx::query(
                "INSERT INTO trend_buckets (month, classification, commit_count) VALUES (?1, ?2, ?3)",
            )
            .bind(month)
            .bind(class)
            .bind(*n)
            .execute(&mut *tx)
            .await?;
        }

        let enriched = snapshot.iter().filter(|c| c.classification.is_some()).count() as i64;
        let (failed,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM commits WHERE classification IS NULL AND enrichment_failed_at IS NOT NULL",
        )
        .fetch_one(&mut *tx)
        .await?;
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO aggregate_meta (id, rebuilt_at, commit_count, enriched_count, failed_count)
            VALUES (1, ?1, ?2, ?3, ?4)
            "#,
        )
        .bind(now_secs())
        .bind(snapshot.len() as i64)
        .bind(enriched)
        .bind(failed)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        let summary = RebuildSummary {
            commits: snapshot.len() as u64,
            files: computed.files.len() as u64,
            pairs: computed.pairs.len() as u64,
            trend_buckets: computed.trends.len() as u64,
        };
        tracing::info!(
            commits = summary.commits,
            files = summary.files,
            pairs = summary.pairs,
            "aggregates rebuilt"
        );
        Ok(summary)
    }

    pub async fn get_file_stats(&self, path: &str) -> DbResult<Option<FileStats>> {
        let row = sqlx::query(
            r#"
            SELECT path, category, total_changes, complexity, hotspot_score, first_changed_at, last_changed_at
            FROM file_stats WHERE path = ?1
            "#,
        )
        .bind(path)
        .fetch_optional(self.db.pool())
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };

        let counts: Vec<(String, i64)> = sqlx::query_as(
            "SELECT classification, count FROM file_classification_counts WHERE path = ?1",
        )
        .bind(path)
        .fetch_all(self.db.pool())
        .await?;

        let category: String = row.try_get("category")?;
        let complexity: Option<i64> = row.try_get("complexity")?;
        Ok(Some(FileStats {
            path: row.try_get("path")?,
            category: FileCategory::parse(&category).unwrap_or(FileCategory::Source),
            total_changes: row.try_get("total_changes")?,
            complexity: complexity.and_then(|c| u8::try_from(c).ok()),
            hotspot_score: row.try_get("hotspot_score")?,
            first_changed_at: row.try_get("first_changed_at")?,
            last_changed_at: row.try_get("last_changed_at")?,
            classification_counts: counts.into_iter().collect(),
        }))
    }

    /// Files ranked by hotspot score, ties broken by path.
    pub async fn get_hotspots(&self, limit: i64, excluded: &[FileCategory]) -> DbResult<Vec<Hotspot>> {
        let mut qb = sqlx::QueryBuilder::<sqlx::Sqlite>::new(
            "SELECT path, category, total_changes, complexity, hotspot_score FROM file_stats WHERE 1=1",
        );
        push_category_filter(&mut qb, "category", excluded);
        qb.push(" ORDER BY hotspot_score DESC, path ASC LIMIT ");
        qb.push_bind(limit);

        let rows = qb.build().fetch_all(self.db.pool()).await?;
        rows.into_iter()
            .map(|row| -> DbResult<Hotspot> {
                let category: String = row.try_get("category")?;
                let complexity: Option<i64> = row.try_get("complexity")?;
                Ok(Hotspot {
                    path: row.try_get("path")?,
                    category: FileCategory::parse(&category).unwrap_or(FileCategory::Source),
                    total_changes: row.try_get("total_changes")?,
                    complexity: complexity.and_then(|c| u8::try_from(c).ok()),
                    score: row.try_get("hotspot_score")?,
                })
            })
            .collect()
    }

    pub async fn aggregate_meta(&self) -> DbResult<Option<AggregateMeta>> {
        let row: Option<(i64, i64, i64, i64)> = sqlx::query_as(
            "SELECT rebuilt_at, commit_count, enriched_count, failed_count FROM aggregate_meta WHERE id = 1",
        )
        .fetch_optional(self.db.pool())
        .await?;
        Ok(row.map(|(rebuilt_at, commit_count, enriched_count, failed_count)| AggregateMeta {
            rebuilt_at,
            commit_count,
            enriched_count,
            failed_count,
        }))
    }

    /// True when the commit table changed since the last rebuild (or there
    /// never was one).
    pub async fn aggregates_stale(&self) -> DbResult<bool> {
        let Some(meta) = self.aggregate_meta().await? else {
            return Ok(true);
        };
        let counts = self.db.commit_counts().await?;
        Ok(meta.commit_count != counts.total
            || meta.enriched_count != counts.enriched
            || meta.failed_count != counts.failed)
    }
}

/// Append `AND <column> NOT IN (...)` for the excluded categories.
pub(crate) fn push_category_filter(
    qb: &mut sqlx::QueryBuilder<'_, sqlx::Sqlite>,
    column: &str,
    excluded: &[FileCategory],
) {
    if excluded.is_empty() {
        return;
    }
    qb.push(format!(" AND {column} NOT IN ("));
    let mut sep = qb.separated(", ");
    for c in excluded {
        sep.push_bind(c.as_str());
    }
    qb.push(")");
}
