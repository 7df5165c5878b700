// crates/pipeline/src/lib.rs
//! Enrichment pipeline: commit sync, the enrichment cycle state machine and
//! index status, on top of the store, search index and service crates.

pub mod context;
pub mod error;
pub mod orchestrator;
pub mod status;
pub mod sync;

pub use context::IndexContext;
pub use error::{PipelineError, PipelineResult};
pub use orchestrator::{CycleOutcome, CycleResult, CycleSummary, EnrichmentOrchestrator};
pub use status::{status, IndexStatus};
pub use sync::{index_repository, sync_commits, IndexSummary, SyncSummary};
