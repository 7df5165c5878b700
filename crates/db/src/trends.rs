// crates/db/src/trends.rs
//! Monthly classification trends, read from `trend_buckets`.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::aggregates::AggregateEngine;
use crate::DbResult;

/// One (month, classification) cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendBucket {
    /// `YYYY-MM`, UTC.
    pub month: String,
    pub classification: String,
    pub commit_count: i64,
}

/// All buckets of one month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthTrend {
    pub month: String,
    pub counts: BTreeMap<String, i64>,
    pub total: i64,
    /// Change in `total` relative to the previous calendar month.
    pub delta: Option<i64>,
}

impl AggregateEngine {
    /// Buckets of the last `months` calendar months ending at the newest month
    /// with commits, oldest first. The window never starts before the oldest
    /// month with commits.
    pub async fn get_trend_buckets(&self, months: i64) -> DbResult<Vec<TrendBucket>> {
        let Some((start, _)) = self.trend_window(months).await? else {
            return Ok(Vec::new());
        };
        let rows: Vec<(String, String, i64)> = sqlx::query_as(
            r#"
            SELECT month, classification, commit_count FROM trend_buckets
            WHERE month >= ?1
            ORDER BY month ASC, classification ASC
            "#,
        )
        .bind(month_label(start))
        .fetch_all(self.db().pool())
        .await?;

        Ok(rows
            .into_iter()
            .map(|(month, classification, commit_count)| TrendBucket {
                month,
                classification,
                commit_count,
            })
            .collect())
    }

    /// Same window as [`get_trend_buckets`](Self::get_trend_buckets), one entry
    /// per calendar month; months without commits have a zero total.
    pub async fn get_trends(&self, months: i64) -> DbResult<Vec<MonthTrend>> {
        let Some((start, end)) = self.trend_window(months).await? else {
            return Ok(Vec::new());
        };
        let buckets = self.get_trend_buckets(months).await?;
        Ok(group_by_month(buckets, start, end))
    }

    /// Month indices `(start, end)` of the window, or `None` when empty.
    async fn trend_window(&self, months: i64) -> DbResult<Option<(i64, i64)>> {
        if months <= 0 {
            return Ok(None);
        }
        let (oldest, newest): (Option<String>, Option<String>) =
            sqlx::query_as("SELECT MIN(month), MAX(month) FROM trend_buckets")
                .fetch_one(self.db().pool())
                .await?;
        let (Some(oldest), Some(newest)) = (
            oldest.as_deref().and_then(month_index),
            newest.as_deref().and_then(month_index),
        ) else {
            return Ok(None);
        };
        Ok(Some(((newest - months + 1).max(oldest), newest)))
    }
}

/// `YYYY-MM` as a count of months since year 0.
fn month_index(month: &str) -> Option<i64> {
    let (year, month) = month.split_once('-')?;
    let year: i64 = year.parse().ok()?;
    let month: i64 = month.parse().ok()?;
    (1..=12).contains(&month).then_some(year * 12 + month - 1)
}

fn month_label(index: i64) -> String {
    format!("{:04}-{:02}", index.div_euclid(12), index.rem_euclid(12) + 1)
}

fn group_by_month(buckets: Vec<TrendBucket>, start: i64, end: i64) -> Vec<MonthTrend> {
    let mut out: Vec<MonthTrend> = (start..=end)
        .map(|index| MonthTrend {
            month: month_label(index),
            counts: BTreeMap::new(),
            total: 0,
            delta: None,
        })
        .collect();
    for b in buckets {
        let Some(slot) = month_index(&b.month)
            .filter(|i| (start..=end).contains(i))
            .and_then(|i| out.get_mut((i - start) as usize))
        else {
            continue;
        };
        slot.total += b.commit_count;
        slot.counts.insert(b.classification, b.commit_count);
    }
    for i in 1..out.len() {
        out[i].delta = Some(out[i].total - out[i - 1].total);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn bucket(month: &str, class: &str, n: i64) -> TrendBucket {
        TrendBucket {
            month: month.into(),
            classification: class.into(),
            commit_count: n,
        }
    }

    #[test]
    fn test_group_by_month_fills_gaps() {
        let grouped = group_by_month(
            vec![
                bucket("2024-01", "bugfix", 2),
                bucket("2024-01", "feature", 3),
                bucket("2024-03", "feature", 1),
            ],
            month_index("2024-01").unwrap(),
            month_index("2024-03").unwrap(),
        );
        let months: Vec<&str> = grouped.iter().map(|m| m.month.as_str()).collect();
        assert_eq!(months, vec!["2024-01", "2024-02", "2024-03"]);
        assert_eq!(grouped[0].total, 5);
        assert_eq!(grouped[0].delta, None);
        assert_eq!(grouped[1].total, 0);
        assert!(grouped[1].counts.is_empty());
        assert_eq!(grouped[1].delta, Some(-5));
        assert_eq!(grouped[2].delta, Some(1));
    }

    #[test]
    fn test_month_index_round_trip_across_year() {
        let dec = month_index("2023-12").unwrap();
        assert_eq!(month_label(dec + 1), "2024-01");
        assert_eq!(month_label(dec - 11), "2023-01");
        assert_eq!(month_index("2024-13"), None);
        assert_eq!(month_index("unclassified"), None);
    }
}
