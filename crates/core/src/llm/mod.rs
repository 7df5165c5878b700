// crates/core/src/llm/mod.rs
//! Classification service integration.
//!
//! Provides the `ClassificationService` trait, the Anthropic batch and
//! synchronous variants, and the prompt/verdict helpers they share.

mod anthropic;
pub mod anthropic_batch;
pub mod anthropic_messages;
pub mod factory;
pub mod prompt;
pub mod provider;
pub mod types;

pub use anthropic_batch::AnthropicBatchService;
pub use anthropic_messages::AnthropicMessagesService;
pub use factory::create_service;
pub use provider::ClassificationService;
pub use types::{
    ClassificationItem, ClassificationResult, ItemError, ItemErrorKind, JobPoll, RemoteJobStatus,
    RequestCounts, ResultOutcome, ServiceError, Submission,
};
