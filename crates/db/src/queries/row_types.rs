// crates/db/src/queries/row_types.rs
// Row structs decoded from SQLite and converted to domain types.

use commitscope_core::{BatchJob, BatchJobStatus, Classification, Commit};
use sqlx::Row;

#[derive(Debug, Clone)]
pub(crate) struct CommitRow {
    pub hash: String,
    pub author: String,
    pub author_email: String,
    pub timestamp: i64,
    pub message: String,
    pub classification: Option<String>,
    pub summary: Option<String>,
    pub complexity: Option<i64>,
    pub enrichment_error: Option<String>,
}

impl<'r> sqlx::FromRow<'r, sqlx::sqlite::SqliteRow> for CommitRow {
    fn from_row(row: &'r sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            hash: row.try_get("hash")?,
            author: row.try_get("author")?,
            author_email: row.try_get("author_email")?,
            timestamp: row.try_get("timestamp")?,
            message: row.try_get("message")?,
            classification: row.try_get("classification")?,
            summary: row.try_get("summary")?,
            complexity: row.try_get("complexity")?,
            enrichment_error: row.try_get("enrichment_error")?,
        })
    }
}

impl CommitRow {
    pub(crate) fn into_commit(self, files_changed: Vec<String>) -> Commit {
        let classification = self.classification.as_deref().and_then(|s| {
            let parsed = Classification::parse(s);
            if parsed.is_none() {
                tracing::warn!(hash = %self.hash, value = s, "unknown classification in store");
            }
            parsed
        });
        Commit {
            hash: self.hash,
            author: self.author,
            author_email: self.author_email,
            timestamp: self.timestamp,
            message: self.message,
            files_changed,
            classification,
            summary: self.summary,
            complexity: self.complexity.and_then(|c| u8::try_from(c).ok()),
            enrichment_error: self.enrichment_error,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct BatchJobRow {
    pub id: String,
    pub status: String,
    pub backend: String,
    pub model: String,
    pub succeeded_count: i64,
    pub failed_count: i64,
    pub error_message: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    pub completed_at: Option<i64>,
}

impl<'r> sqlx::FromRow<'r, sqlx::sqlite::SqliteRow> for BatchJobRow {
    fn from_row(row: &'r sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            status: row.try_get("status")?,
            backend: row.try_get("backend")?,
            model: row.try_get("model")?,
            succeeded_count: row.try_get("succeeded_count")?,
            failed_count: row.try_get("failed_count")?,
            error_message: row.try_get("error_message")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            completed_at: row.try_get("completed_at")?,
        })
    }
}

impl BatchJobRow {
    pub(crate) fn into_batch_job(self, member_hashes: Vec<String>) -> Result<BatchJob, sqlx::Error> {
        let status = BatchJobStatus::from_db_str(&self.status).ok_or_else(|| {
            sqlx::Error::Decode(format!("unknown batch job status {:?}", self.status).into())
        })?;
        Ok(BatchJob {
            id: self.id,
            status,
            backend: self.backend,
            model: self.model,
            member_hashes,
            succeeded_count: self.succeeded_count,
            failed_count: self.failed_count,
            error_message: self.error_message,
            created_at: self.created_at,
            updated_at: self.updated_at,
            completed_at: self.completed_at,
        })
    }
}
