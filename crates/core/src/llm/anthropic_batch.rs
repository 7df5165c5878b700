// crates/core/src/llm/anthropic_batch.rs
//! Message Batches API variant: one submission carries many commits, results
//! are fetched as JSONL once the batch has ended.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::EnrichConfig;

use super::anthropic::{check_status, message_text, AnthropicClient};
use super::prompt::parse_verdict;
use super::provider::ClassificationService;
use super::types::{
    ClassificationItem, ClassificationResult, ItemError, JobPoll, RemoteJobStatus, RequestCounts,
    ServiceError, Submission,
};

pub const BATCH_SERVICE_NAME: &str = "anthropic-batch";

#[derive(Debug, Deserialize)]
struct BatchObject {
    id: String,
    processing_status: String,
    #[serde(default)]
    request_counts: RequestCounts,
    #[serde(default)]
    results_url: Option<String>,
}

pub struct AnthropicBatchService {
    client: AnthropicClient,
}

impl AnthropicBatchService {
    pub fn new(config: &EnrichConfig, api_key: &str) -> Result<Self, ServiceError> {
        Ok(Self {
            client: AnthropicClient::new(config, api_key)?,
        })
    }

    async fn get_batch(&self, job_id: &str) -> Result<Option<BatchObject>, ServiceError> {
        let url = self.client.url(&format!("/v1/messages/batches/{job_id}"));
        let resp = self.client.get(&url).await?;
        if resp.status().as_u16() == 404 {
            return Ok(None);
        }
        let resp = check_status(resp).await?;
        let batch = resp
            .json::<BatchObject>()
            .await
            .map_err(|e| ServiceError::InvalidResponse(format!("batch object: {e}")))?;
        Ok(Some(batch))
    }
}

#[async_trait]
impl ClassificationService for AnthropicBatchService {
    async fn submit(&self, items: Vec<ClassificationItem>) -> Result<Submission, ServiceError> {
        if items.is_empty() {
            return Err(ServiceError::NotAvailable("empty batch".into()));
        }
        let requests: Vec<Value> = items
            .iter()
            .map(|item| {
                json!({
                    "custom_id": item.hash,
                    "params": self.client.message_params(item),
                })
            })
            .collect();

        tracing::info!(count = requests.len(), model = %self.client.model, "submitting message batch");
        let body = self
            .client
            .post_json("/v1/messages/batches", &json!({ "requests": requests }))
            .await?;

        let job_id = body
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ServiceError::InvalidResponse("batch response missing id".into()))?
            .to_string();
        tracing::info!(job_id = %job_id, "message batch created");
        Ok(Submission::Queued { job_id })
    }

    async fn poll_status(&self, job_id: &str) -> Result<JobPoll, ServiceError> {
        let Some(batch) = self.get_batch(job_id).await? else {
            return Ok(JobPoll {
                status: RemoteJobStatus::Failed {
                    reason: "batch not found (expired or deleted)".into(),
                },
                counts: RequestCounts::default(),
            });
        };

        let status = match batch.processing_status.as_str() {
            "in_progress" | "canceling" => RemoteJobStatus::InProgress,
            "ended" => RemoteJobStatus::Completed,
            other => {
                return Err(ServiceError::InvalidResponse(format!(
                    "unknown processing_status {other:?}"
                )))
            }
        };
        tracing::debug!(job_id = %batch.id, status = %batch.processing_status, "polled batch");
        Ok(JobPoll {
            status,
            counts: batch.request_counts,
        })
    }

    async fn fetch_results(&self, job_id: &str) -> Result<Vec<ClassificationResult>, ServiceError> {
        let batch = self
            .get_batch(job_id)
            .await?
            .ok_or_else(|| ServiceError::NotAvailable(format!("batch {job_id} not found")))?;
        if batch.processing_status != "ended" {
            return Err(ServiceError::NotAvailable(format!(
                "batch {job_id} has not ended ({})",
                batch.processing_status
            )));
        }
        let url = batch
            .results_url
            .ok_or_else(|| ServiceError::InvalidResponse("ended batch has no results_url".into()))?;

        let resp = check_status(self.client.get(&url).await?).await?;
        let body = resp.text().await?;
        Ok(parse_results_jsonl(&body))
    }

    fn name(&self) -> &str {
        BATCH_SERVICE_NAME
    }

    fn model(&self) -> &str {
        &self.client.model
    }
}

/// Parse the batch results file. Lines that cannot be attributed to a
/// commit are skipped; the caller treats missing members as failed.
pub fn parse_results_jsonl(body: &str) -> Vec<ClassificationResult> {
    let mut results = Vec::new();
    for (line_no, line) in body.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let value: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(line_no, error = %e, "skipping malformed results line");
                continue;
            }
        };
        let Some(hash) = value.get("custom_id").and_then(|v| v.as_str()) else {
            tracing::warn!(line_no, "results line without custom_id");
            continue;
        };
        let result = &value["result"];
        let outcome = match result.get("type").and_then(|v| v.as_str()) {
            Some("succeeded") => match message_text(&result["message"]) {
                Some(text) => match parse_verdict(&text) {
                    Ok(verdict) => ClassificationResult::verdict(hash, verdict),
                    Err(reason) => ClassificationResult::error(hash, ItemError::parse(reason)),
                },
                None => ClassificationResult::error(hash, ItemError::parse("empty message")),
            },
            Some("errored") => {
                let message = result
                    .pointer("/error/error/message")
                    .or_else(|| result.pointer("/error/message"))
                    .and_then(|v| v.as_str())
                    .unwrap_or("request errored");
                ClassificationResult::error(hash, ItemError::service(message))
            }
            Some(kind @ ("canceled" | "expired")) => {
                ClassificationResult::error(hash, ItemError::expired(format!("request {kind}")))
            }
            other => ClassificationResult::error(
                hash,
                ItemError::service(format!("unknown result type {other:?}")),
            ),
        };
        results.push(outcome);
    }
    results
}
