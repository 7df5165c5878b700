// crates/core/src/progress.rs
//! Progress records emitted by the enrichment cycle.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressPhase {
    Enriching,
    Aggregating,
    Indexing,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchProgressStatus {
    Submitted,
    InProgress,
    Importing,
}

/// One progress record, consumed by the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub phase: ProgressPhase,
    pub current: u64,
    pub total: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_status: Option<BatchProgressStatus>,
}

impl Progress {
    pub fn phase(phase: ProgressPhase) -> Self {
        Self {
            phase,
            current: 0,
            total: 0,
            batch_id: None,
            batch_status: None,
        }
    }

    pub fn batch(batch_id: &str, status: BatchProgressStatus, current: u64, total: u64) -> Self {
        Self {
            phase: ProgressPhase::Enriching,
            current,
            total,
            batch_id: Some(batch_id.to_string()),
            batch_status: Some(status),
        }
    }
}

impl std::fmt::Display for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.phase, &self.batch_status) {
            (ProgressPhase::Enriching, Some(status)) => {
                let verb = match status {
                    BatchProgressStatus::Submitted => "submitted",
                    BatchProgressStatus::InProgress => "processing",
                    BatchProgressStatus::Importing => "importing",
                };
                write!(f, "batch {}: {verb}", self.batch_id.as_deref().unwrap_or("?"))?;
                if self.total > 0 {
                    write!(f, " ({}/{})", self.current, self.total)?;
                }
                Ok(())
            }
            (ProgressPhase::Enriching, None) => f.write_str("enriching"),
            (ProgressPhase::Aggregating, _) => f.write_str("rebuilding aggregates"),
            (ProgressPhase::Indexing, _) => f.write_str("rebuilding search index"),
            (ProgressPhase::Done, _) => f.write_str("done"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serializes_without_empty_batch_fields() {
        let json = serde_json::to_value(Progress::phase(ProgressPhase::Done)).unwrap();
        assert_eq!(json["phase"], "done");
        assert!(json.get("batchId").is_none());

        let json = serde_json::to_value(Progress::batch(
            "msgbatch_1",
            BatchProgressStatus::InProgress,
            2,
            5,
        ))
        .unwrap();
        assert_eq!(json["phase"], "enriching");
        assert_eq!(json["batchStatus"], "in_progress");
        assert_eq!(json["batchId"], "msgbatch_1");
    }

    #[test]
    fn test_display() {
        let p = Progress::batch("b1", BatchProgressStatus::Importing, 3, 10);
        assert_eq!(p.to_string(), "batch b1: importing (3/10)");
        assert_eq!(Progress::phase(ProgressPhase::Indexing).to_string(), "rebuilding search index");
    }
}
