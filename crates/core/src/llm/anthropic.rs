// crates/core/src/llm/anthropic.rs
//! HTTP plumbing shared by the Anthropic service variants.

use std::time::Duration;

use serde_json::{json, Value};

use crate::config::EnrichConfig;

use super::prompt::build_classification_prompt;
use super::types::{ClassificationItem, ServiceError};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const REQUEST_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone)]
pub(crate) struct AnthropicClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    pub(crate) model: String,
    max_tokens: u32,
    max_diff_bytes: usize,
}

impl AnthropicClient {
    pub(crate) fn new(config: &EnrichConfig, api_key: &str) -> Result<Self, ServiceError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            http,
            base_url: config.api_base.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            max_diff_bytes: config.max_diff_bytes,
        })
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Accept", "application/json")
    }

    pub(crate) async fn post_json(&self, path: &str, body: &Value) -> Result<Value, ServiceError> {
        let resp = self
            .authed(self.http.post(self.url(path)))
            .json(body)
            .send()
            .await?;
        let resp = check_status(resp).await?;
        Ok(resp.json::<Value>().await?)
    }

    /// GET returning the raw response so callers can branch on status.
    pub(crate) async fn get(&self, url: &str) -> Result<reqwest::Response, ServiceError> {
        Ok(self.authed(self.http.get(url)).send().await?)
    }

    /// Messages API request parameters for one commit.
    pub(crate) fn message_params(&self, item: &ClassificationItem) -> Value {
        json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "messages": [
                { "role": "user", "content": build_classification_prompt(item, self.max_diff_bytes) }
            ],
        })
    }
}

/// Map non-success responses to `ServiceError`.
pub(crate) async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, ServiceError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    if status.as_u16() == 429 {
        let retry_after_secs = resp
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .unwrap_or(60);
        return Err(ServiceError::RateLimited { retry_after_secs });
    }
    let body = resp.text().await.unwrap_or_default();
    Err(ServiceError::Status {
        status: status.as_u16(),
        body: body.chars().take(500).collect(),
    })
}

/// Concatenated text blocks of a Messages API response.
pub(crate) fn message_text(message: &Value) -> Option<String> {
    let blocks = message.get("content")?.as_array()?;
    let text: String = blocks
        .iter()
        .filter(|b| b.get("type").and_then(|t| t.as_str()) == Some("text"))
        .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
        .collect();
    (!text.is_empty()).then_some(text)
}
