//! Centralized path functions for the per-repository index directory.
//!
//! Single source of truth for where the database, search index, lock marker
//! and optional config file live under `<repo>/.commitscope/`.

use std::path::{Path, PathBuf};

/// Name of the index directory created at the repository root.
pub const INDEX_DIR_NAME: &str = ".commitscope";

/// Index directory for a repository root: `<repo>/.commitscope/`.
pub fn index_dir(repo_root: &Path) -> PathBuf {
    repo_root.join(INDEX_DIR_NAME)
}

/// SQLite database file: `<index_dir>/commitscope.db`.
pub fn db_path(index_dir: &Path) -> PathBuf {
    index_dir.join("commitscope.db")
}

/// Tantivy search index directory: `<index_dir>/search-index/`.
pub fn search_index_dir(index_dir: &Path) -> PathBuf {
    index_dir.join("search-index")
}

/// Write-lock marker file: `<index_dir>/write.lock`.
pub fn lock_path(index_dir: &Path) -> PathBuf {
    index_dir.join("write.lock")
}

/// Optional, user-maintained config: `<index_dir>/config.toml`.
pub fn config_path(index_dir: &Path) -> PathBuf {
    index_dir.join("config.toml")
}

/// True when `index_dir` holds an initialized database.
pub fn index_exists(index_dir: &Path) -> bool {
    db_path(index_dir).is_file()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_under_repo_root() {
        let dir = index_dir(Path::new("/work/repo"));
        assert_eq!(dir, PathBuf::from("/work/repo/.commitscope"));
        assert!(db_path(&dir).ends_with(".commitscope/commitscope.db"));
        assert!(search_index_dir(&dir).ends_with("search-index"));
        assert!(lock_path(&dir).ends_with("write.lock"));
        assert!(config_path(&dir).ends_with("config.toml"));
    }

    #[test]
    fn test_index_exists() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(!index_exists(tmp.path()));
        std::fs::write(db_path(tmp.path()), b"").unwrap();
        assert!(index_exists(tmp.path()));
    }
}
