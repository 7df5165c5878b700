// crates/db/src/coupling.rs
//! Co-change queries over the materialized `coupling_pairs` table, plus a
//! directory-level variant computed from raw commit file lists.

use commitscope_core::FileCategory;
use serde::Serialize;
use sqlx::Row;

use crate::aggregates::{push_category_filter, AggregateEngine};
use crate::DbResult;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CouplingPair {
    pub path_a: String,
    pub path_b: String,
    pub co_changes: i64,
}

/// A file that changes together with some anchor (file or directory).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoupledFile {
    pub path: String,
    pub co_changes: i64,
    /// co_changes divided by the number of commits touching the anchor.
    pub ratio: f64,
}

impl AggregateEngine {
    /// Strongest co-change pairs, ordered by count then lexicographically.
    /// A pair is dropped when either side falls in an excluded category.
    pub async fn get_top_coupled_pairs(
        &self,
        limit: i64,
        excluded: &[FileCategory],
    ) -> DbResult<Vec<CouplingPair>> {
        let mut qb = sqlx::QueryBuilder::<sqlx::Sqlite>::new(
            r#"
            SELECT cp.path_a, cp.path_b, cp.co_changes
            FROM coupling_pairs cp
            JOIN file_stats fa ON fa.path = cp.path_a
            JOIN file_stats fb ON fb.path = cp.path_b
            WHERE 1=1
            "#,
        );
        push_category_filter(&mut qb, "fa.category", excluded);
        push_category_filter(&mut qb, "fb.category", excluded);
        qb.push(" ORDER BY cp.co_changes DESC, cp.path_a ASC, cp.path_b ASC LIMIT ");
        qb.push_bind(limit);

        let rows: Vec<(String, String, i64)> =
            qb.build_query_as().fetch_all(self.db().pool()).await?;
        Ok(rows
            .into_iter()
            .map(|(path_a, path_b, co_changes)| CouplingPair {
                path_a,
                path_b,
                co_changes,
            })
            .collect())
    }

    /// Files coupled to `path`, with the share of the anchor's commits that
    /// also touched them. Unknown paths yield an empty list.
    pub async fn get_coupled_files_with_ratio(
        &self,
        path: &str,
        limit: i64,
        excluded: &[FileCategory],
    ) -> DbResult<Vec<CoupledFile>> {
        let anchor: Option<(i64,)> =
            sqlx::query_as("SELECT total_changes FROM file_stats WHERE path = ?1")
                .bind(path)
                .fetch_optional(self.db().pool())
                .await?;
        let Some((anchor_changes,)) = anchor else {
            return Ok(Vec::new());
        };

        let mut qb = sqlx::QueryBuilder::<sqlx::Sqlite>::new(
            "SELECT other.path AS path, other.co_changes AS co_changes FROM (SELECT path_b AS path, co_changes FROM coupling_pairs WHERE path_a = ",
        );
        qb.push_bind(path);
        qb.push(" UNION ALL SELECT path_a AS path, co_changes FROM coupling_pairs WHERE path_b = ");
        qb.push_bind(path);
        qb.push(") other JOIN file_stats fs ON fs.path = other.path WHERE 1=1");
        push_category_filter(&mut qb, "fs.category", excluded);
        qb.push(" ORDER BY other.co_changes DESC, other.path ASC LIMIT ");
        qb.push_bind(limit);

        let rows = qb.build().fetch_all(self.db().pool()).await?;
        rows.into_iter()
            .map(|row| -> DbResult<CoupledFile> {
                let co_changes: i64 = row.try_get("co_changes")?;
                Ok(CoupledFile {
                    path: row.try_get("path")?,
                    co_changes,
                    ratio: ratio(co_changes, anchor_changes),
                })
            })
            .collect()
    }

    /// Files outside `dir` that change together with anything under it.
    ///
    /// Computed from raw commit file lists, so each commit counts once no
    /// matter how many files under `dir` it touched. Commits above the
    /// coupling file cap are ignored, same as for file pairs.
    pub async fn get_coupled_files_for_directory(
        &self,
        dir: &str,
        limit: i64,
        excluded: &[FileCategory],
    ) -> DbResult<Vec<CoupledFile>> {
        let prefix = dir.trim_end_matches('/');
        if prefix.is_empty() {
            return Ok(Vec::new());
        }
        let pattern = format!("{}/%", escape_like(prefix));
        let cap = self.max_files_for_coupling() as i64;

        let (anchor_commits,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(DISTINCT cf.hash)
            FROM commit_files cf JOIN commits c ON c.hash = cf.hash
            WHERE cf.path LIKE ?1 ESCAPE '\' AND c.file_count <= ?2
            "#,
        )
        .bind(&pattern)
        .bind(cap)
        .fetch_one(self.db().pool())
        .await?;
        if anchor_commits == 0 {
            return Ok(Vec::new());
        }

        let mut qb = sqlx::QueryBuilder::<sqlx::Sqlite>::new(
            r#"
            SELECT o.path AS path, COUNT(DISTINCT o.hash) AS co_changes
            FROM commit_files o
            JOIN file_stats fs ON fs.path = o.path
            WHERE o.hash IN (
                SELECT cf.hash FROM commit_files cf JOIN commits c ON c.hash = cf.hash
                WHERE cf.path LIKE "#,
        );
        qb.push_bind(pattern.clone());
        qb.push(" ESCAPE '\\' AND c.file_count <= ");
        qb.push_bind(cap);
        qb.push(") AND o.path NOT LIKE ");
        qb.push_bind(pattern);
        qb.push(" ESCAPE '\\'");
        push_category_filter(&mut qb, "fs.category", excluded);
        qb.push(" GROUP BY o.path ORDER BY co_changes DESC, o.path ASC LIMIT ");
        qb.push_bind(limit);

        let rows = qb.build().fetch_all(self.db().pool()).await?;
        rows.into_iter()
            .map(|row| -> DbResult<CoupledFile> {
                let co_changes: i64 = row.try_get("co_changes")?;
                Ok(CoupledFile {
                    path: row.try_get("path")?,
                    co_changes,
                    ratio: ratio(co_changes, anchor_commits),
                })
            })
            .collect()
    }
}

fn ratio(part: i64, whole: i64) -> f64 {
    if whole <= 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
