// crates/core/src/llm/provider.rs
//! ClassificationService trait: the capability the enrichment cycle depends on.

use async_trait::async_trait;

use super::types::{ClassificationItem, ClassificationResult, JobPoll, ServiceError, Submission};

/// A service that classifies commits, either in bulk asynchronously or
/// one request at a time.
///
/// Implementations:
/// - `AnthropicBatchService`: Message Batches API, returns `Submission::Queued`
/// - `AnthropicMessagesService`: Messages API, returns `Submission::Completed`
#[async_trait]
pub trait ClassificationService: Send + Sync {
    /// Submit a set of commits. A failure here must leave no remote job the
    /// caller is expected to track.
    async fn submit(&self, items: Vec<ClassificationItem>) -> Result<Submission, ServiceError>;

    async fn poll_status(&self, job_id: &str) -> Result<JobPoll, ServiceError>;

    /// Results for a completed job, one per commit the service processed.
    async fn fetch_results(&self, job_id: &str) -> Result<Vec<ClassificationResult>, ServiceError>;

    /// Backend name recorded on jobs (e.g. "anthropic-batch").
    fn name(&self) -> &str;

    /// Model identifier.
    fn model(&self) -> &str;
}
