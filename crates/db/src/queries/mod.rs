// crates/db/src/queries/mod.rs
// CommitStore and BatchJobStore operations on `Database`.

pub(crate) mod row_types;
pub mod batch_jobs;
mod commits;

/// Bound on host parameters per statement when binding IN lists.
pub(crate) const IN_CHUNK: usize = 500;
