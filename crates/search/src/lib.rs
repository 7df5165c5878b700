//! Full-text search over commit messages and enrichment summaries.
//!
//! Uses Tantivy to index one document per commit. The index is a derived
//! view: `rebuild` replaces its whole content from the commit store, so it
//! never needs incremental bookkeeping.
//!
//! - **Write path**: `CommitSearchIndex::rebuild` -> delete all -> add -> commit
//! - **Read path**: `CommitSearchIndex::search` -> qualifier parsing -> BooleanQuery
//! - **Storage**: `<repo>/.commitscope/search-index/` or in-RAM for tests

pub mod indexer;
pub mod query;
pub mod types;

use std::path::Path;
use std::sync::Mutex;

use tantivy::schema::{Field, Schema, FAST, STORED, STRING, TEXT};
use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy};

pub use types::{CommitHit, SearchResponse};

/// Bump when the schema changes. A mismatch wipes the index directory.
pub const SEARCH_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("Tantivy error: {0}")]
    Tantivy(#[from] tantivy::TantivyError),

    #[error("Query parse error: {0}")]
    QueryParse(#[from] tantivy::query::QueryParserError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Fields:
/// - `hash`: STRING | STORED, identity and delete key
/// - `message`, `summary`: TEXT | STORED, BM25 search
/// - `author`: TEXT | STORED, `author:` qualifier
/// - `classification`: STRING | STORED, `class:` qualifier
/// - `timestamp`: i64 FAST | STORED
/// - `files`: TEXT, changed paths (tokenized, not stored)
pub fn build_schema() -> Schema {
    let mut schema_builder = Schema::builder();
    schema_builder.add_text_field("hash", STRING | STORED);
    schema_builder.add_text_field("message", TEXT | STORED);
    schema_builder.add_text_field("summary", TEXT | STORED);
    schema_builder.add_text_field("author", TEXT | STORED);
    schema_builder.add_text_field("classification", STRING | STORED);
    schema_builder.add_i64_field("timestamp", FAST | STORED);
    schema_builder.add_text_field("files", TEXT);
    schema_builder.build()
}

pub struct CommitSearchIndex {
    pub index: Index,
    pub reader: IndexReader,
    /// `IndexWriter::commit` needs `&mut self`.
    pub writer: Mutex<IndexWriter>,
    pub schema: Schema,

    pub(crate) hash_field: Field,
    pub(crate) message_field: Field,
    pub(crate) summary_field: Field,
    pub(crate) author_field: Field,
    pub(crate) classification_field: Field,
    pub(crate) timestamp_field: Field,
    pub(crate) files_field: Field,
}

impl CommitSearchIndex {
    /// Open or create the index at `path`, wiping it first when its
    /// `schema_version` file does not match [`SEARCH_SCHEMA_VERSION`].
    pub fn open(path: &Path) -> Result<Self, SearchError> {
        std::fs::create_dir_all(path)?;

        let version_path = path.join("schema_version");
        let needs_rebuild = match std::fs::read_to_string(&version_path) {
            Ok(v) => v.trim().parse::<u32>().unwrap_or(0) != SEARCH_SCHEMA_VERSION,
            Err(_) => false,
        };

        if needs_rebuild {
            tracing::info!(path = %path.display(), "search schema version mismatch, wiping index");
            for entry in std::fs::read_dir(path)?.flatten() {
                let p = entry.path();
                if p.file_name().map(|n| n != "schema_version").unwrap_or(false) {
                    if p.is_dir() {
                        let _ = std::fs::remove_dir_all(&p);
                    } else {
                        let _ = std::fs::remove_file(&p);
                    }
                }
            }
        }

        let schema = build_schema();
        let index = match Index::open_in_dir(path) {
            Ok(idx) => idx,
            Err(_) => {
                tracing::info!(path = %path.display(), "creating new search index");
                Index::create_in_dir(path, schema.clone())?
            }
        };

        std::fs::write(&version_path, SEARCH_SCHEMA_VERSION.to_string())?;
        Self::from_index(index, schema)
    }

    pub fn open_in_ram() -> Result<Self, SearchError> {
        let schema = build_schema();
        let index = Index::create_in_ram(schema.clone());
        Self::from_index(index, schema)
    }

    fn from_index(index: Index, schema: Schema) -> Result<Self, SearchError> {
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::OnCommitWithDelay)
            .try_into()?;

        // 50MB writer heap
        let writer = index.writer(50_000_000)?;

        let hash_field = schema.get_field("hash").expect("schema missing hash field");
        let message_field = schema
            .get_field("message")
            .expect("schema missing message field");
        let summary_field = schema
            .get_field("summary")
            .expect("schema missing summary field");
        let author_field = schema
            .get_field("author")
            .expect("schema missing author field");
        let classification_field = schema
            .get_field("classification")
            .expect("schema missing classification field");
        let timestamp_field = schema
            .get_field("timestamp")
            .expect("schema missing timestamp field");
        let files_field = schema.get_field("files").expect("schema missing files field");

        Ok(Self {
            index,
            reader,
            writer: Mutex::new(writer),
            schema,
            hash_field,
            message_field,
            summary_field,
            author_field,
            classification_field,
            timestamp_field,
            files_field,
        })
    }

    /// Number of documents visible to the reader.
    pub fn num_docs(&self) -> u64 {
        self.reader.searcher().num_docs()
    }

    pub(crate) fn lock_writer(&self) -> Result<std::sync::MutexGuard<'_, IndexWriter>, SearchError> {
        self.writer.lock().map_err(|e| {
            SearchError::Io(std::io::Error::other(format!("writer lock poisoned: {e}")))
        })
    }
}
