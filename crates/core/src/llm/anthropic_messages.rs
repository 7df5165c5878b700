// crates/core/src/llm/anthropic_messages.rs
//! Synchronous variant: one Messages API call per commit, results returned
//! from `submit` directly.

use async_trait::async_trait;

use crate::config::EnrichConfig;

use super::anthropic::{message_text, AnthropicClient};
use super::prompt::parse_verdict;
use super::provider::ClassificationService;
use super::types::{
    ClassificationItem, ClassificationResult, ItemError, JobPoll, RemoteJobStatus, RequestCounts,
    ServiceError, Submission,
};

pub const MESSAGES_SERVICE_NAME: &str = "anthropic-messages";

pub struct AnthropicMessagesService {
    client: AnthropicClient,
}

impl AnthropicMessagesService {
    pub fn new(config: &EnrichConfig, api_key: &str) -> Result<Self, ServiceError> {
        Ok(Self {
            client: AnthropicClient::new(config, api_key)?,
        })
    }

    async fn classify_one(&self, item: &ClassificationItem) -> Result<ClassificationResult, ServiceError> {
        let params = self.client.message_params(item);
        let message = match self.client.post_json("/v1/messages", &params).await {
            Ok(m) => m,
            // Request-specific rejection; the rest of the submission can proceed.
            Err(ServiceError::Status { status, body }) if status == 400 || status == 413 => {
                return Ok(ClassificationResult::error(
                    &item.hash,
                    ItemError::service(format!("{status}: {body}")),
                ));
            }
            Err(e) => return Err(e),
        };

        Ok(match message_text(&message) {
            Some(text) => match parse_verdict(&text) {
                Ok(verdict) => ClassificationResult::verdict(&item.hash, verdict),
                Err(reason) => ClassificationResult::error(&item.hash, ItemError::parse(reason)),
            },
            None => ClassificationResult::error(&item.hash, ItemError::parse("empty message")),
        })
    }
}

#[async_trait]
impl ClassificationService for AnthropicMessagesService {
    /// Evaluates every item before returning. Any transport, auth or rate
    /// limit failure aborts the whole submission so nothing is recorded.
    async fn submit(&self, items: Vec<ClassificationItem>) -> Result<Submission, ServiceError> {
        let job_id = format!("sync_{}", uuid::Uuid::new_v4().simple());
        tracing::info!(job_id = %job_id, count = items.len(), model = %self.client.model, "classifying synchronously");

        let mut results = Vec::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            let result = self.classify_one(item).await?;
            tracing::debug!(index = i, hash = %item.hash, "classified");
            results.push(result);
        }
        Ok(Submission::Completed { job_id, results })
    }

    async fn poll_status(&self, job_id: &str) -> Result<JobPoll, ServiceError> {
        Ok(JobPoll {
            status: RemoteJobStatus::Failed {
                reason: format!("{job_id} was evaluated synchronously and has no remote state"),
            },
            counts: RequestCounts::default(),
        })
    }

    async fn fetch_results(&self, job_id: &str) -> Result<Vec<ClassificationResult>, ServiceError> {
        Err(ServiceError::NotAvailable(format!(
            "{job_id}: synchronous results are only returned from submit"
        )))
    }

    fn name(&self) -> &str {
        MESSAGES_SERVICE_NAME
    }

    fn model(&self) -> &str {
        &self.client.model
    }
}
