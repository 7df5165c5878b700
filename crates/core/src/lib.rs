// crates/core/src/lib.rs
pub mod category;
pub mod config;
pub mod error;
pub mod git;
pub mod llm;
pub mod lock;
pub mod paths;
pub mod progress;
pub mod types;

pub use category::*;
pub use config::{Backend, EnrichConfig};
pub use error::*;
pub use git::{GitCli, GitCommit, VersionControl};
pub use lock::{LockHolder, WriteLock};
pub use progress::*;
pub use types::*;
