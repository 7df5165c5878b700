// crates/pipeline/src/context.rs
//! Opening and initializing the per-repository index directory.

use std::path::{Path, PathBuf};

use commitscope_core::{paths, EnrichConfig};
use commitscope_db::{AggregateEngine, Database};
use commitscope_search::CommitSearchIndex;

use crate::error::{PipelineError, PipelineResult};

/// Everything an invocation needs from `<repo>/.commitscope/`.
#[derive(Debug, Clone)]
pub struct IndexContext {
    pub repo_root: PathBuf,
    pub index_dir: PathBuf,
    pub db: Database,
    pub config: EnrichConfig,
}

impl IndexContext {
    /// Create the index directory and database if missing. Idempotent.
    pub async fn init(repo_root: &Path) -> PipelineResult<Self> {
        let index_dir = paths::index_dir(repo_root);
        std::fs::create_dir_all(&index_dir)?;
        let created = !paths::index_exists(&index_dir);
        let ctx = Self::open_dir(repo_root, index_dir).await?;
        if created {
            tracing::info!(index_dir = %ctx.index_dir.display(), "index initialized");
        }
        Ok(ctx)
    }

    /// Open an existing index; fails with `NotFound` when `init` never ran.
    pub async fn open(repo_root: &Path) -> PipelineResult<Self> {
        let index_dir = paths::index_dir(repo_root);
        if !paths::index_exists(&index_dir) {
            return Err(PipelineError::NotFound(index_dir));
        }
        Self::open_dir(repo_root, index_dir).await
    }

    async fn open_dir(repo_root: &Path, index_dir: PathBuf) -> PipelineResult<Self> {
        let config = EnrichConfig::load(&index_dir)?;
        let db = Database::new(&paths::db_path(&index_dir)).await?;
        Ok(Self {
            repo_root: repo_root.to_path_buf(),
            index_dir,
            db,
            config,
        })
    }

    pub fn aggregates(&self) -> AggregateEngine {
        AggregateEngine::new(self.db.clone(), self.config.max_files_for_coupling)
    }

    pub fn open_search(&self) -> PipelineResult<CommitSearchIndex> {
        Ok(CommitSearchIndex::open(&paths::search_index_dir(&self.index_dir))?)
    }
}
