use serde::Serialize;

/// Response from a full-text search query.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub query: String,
    /// Number of matching commits before `limit` is applied.
    pub total_hits: usize,
    pub elapsed_ms: f64,
    /// Ranked by BM25 score, best first.
    pub hits: Vec<CommitHit>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitHit {
    pub hash: String,
    pub message: String,
    pub summary: Option<String>,
    pub classification: Option<String>,
    pub author: String,
    pub timestamp: i64,
    pub score: f32,
}
