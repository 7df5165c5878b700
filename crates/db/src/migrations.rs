/// Inline SQL migrations for the commitscope database schema.
///
/// One statement per entry; the runner in `lib.rs` records the 1-based index
/// of each applied entry in `_migrations`.

pub const MIGRATIONS: &[&str] = &[
    // Migration 1: commits table
    r#"
CREATE TABLE IF NOT EXISTS commits (
    hash TEXT PRIMARY KEY,
    author TEXT NOT NULL,
    author_email TEXT NOT NULL DEFAULT '',
    timestamp INTEGER NOT NULL,
    message TEXT NOT NULL,
    file_count INTEGER NOT NULL DEFAULT 0,
    classification TEXT,
    summary TEXT,
    complexity INTEGER CHECK (complexity IS NULL OR complexity BETWEEN 1 AND 5),
    enriched_at INTEGER,
    enrichment_error TEXT,
    enrichment_failed_at INTEGER,
    discovered_at INTEGER NOT NULL
);
"#,
    r#"
CREATE INDEX IF NOT EXISTS idx_commits_timestamp ON commits(timestamp);
"#,
    r#"
CREATE INDEX IF NOT EXISTS idx_commits_pending ON commits(timestamp)
    WHERE classification IS NULL AND enrichment_failed_at IS NULL;
"#,
    // Migration 4: ordered file-change history per commit
    r#"
CREATE TABLE IF NOT EXISTS commit_files (
    hash TEXT NOT NULL REFERENCES commits(hash),
    ordinal INTEGER NOT NULL,
    path TEXT NOT NULL,
    PRIMARY KEY (hash, ordinal)
);
"#,
    r#"
CREATE INDEX IF NOT EXISTS idx_commit_files_path ON commit_files(path);
"#,
    // Migration 6: batch submissions
    r#"
CREATE TABLE IF NOT EXISTS batch_jobs (
    id TEXT PRIMARY KEY,
    status TEXT NOT NULL CHECK (status IN ('submitted', 'in_progress', 'completed', 'failed')),
    backend TEXT NOT NULL,
    model TEXT NOT NULL,
    request_count INTEGER NOT NULL,
    succeeded_count INTEGER NOT NULL DEFAULT 0,
    failed_count INTEGER NOT NULL DEFAULT 0,
    error_message TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    completed_at INTEGER
);
"#,
    r#"
CREATE INDEX IF NOT EXISTS idx_batch_jobs_status ON batch_jobs(status);
"#,
    r#"
CREATE TABLE IF NOT EXISTS batch_job_members (
    job_id TEXT NOT NULL REFERENCES batch_jobs(id),
    hash TEXT NOT NULL,
    PRIMARY KEY (job_id, hash)
);
"#,
    r#"
CREATE INDEX IF NOT EXISTS idx_batch_job_members_hash ON batch_job_members(hash);
"#,
    // Migration 10: derived aggregates (rebuildable, never authoritative)
    r#"
CREATE TABLE IF NOT EXISTS file_stats (
    path TEXT PRIMARY KEY,
    category TEXT NOT NULL,
    total_changes INTEGER NOT NULL,
    complexity INTEGER,
    hotspot_score REAL NOT NULL DEFAULT 0,
    first_changed_at INTEGER NOT NULL,
    last_changed_at INTEGER NOT NULL
);
"#,
    r#"
CREATE INDEX IF NOT EXISTS idx_file_stats_score ON file_stats(hotspot_score DESC, path);
"#,
    r#"
CREATE TABLE IF NOT EXISTS file_classification_counts (
    path TEXT NOT NULL,
    classification TEXT NOT NULL,
    count INTEGER NOT NULL,
    PRIMARY KEY (path, classification)
);
"#,
    r#"
CREATE TABLE IF NOT EXISTS coupling_pairs (
    path_a TEXT NOT NULL,
    path_b TEXT NOT NULL,
    co_changes INTEGER NOT NULL,
    PRIMARY KEY (path_a, path_b),
    CHECK (path_a < path_b)
);
"#,
    r#"
CREATE INDEX IF NOT EXISTS idx_coupling_pairs_b ON coupling_pairs(path_b);
"#,
    r#"
CREATE TABLE IF NOT EXISTS trend_buckets (
    month TEXT NOT NULL,
    classification TEXT NOT NULL,
    commit_count INTEGER NOT NULL,
    PRIMARY KEY (month, classification)
);
"#,
    r#"
CREATE TABLE IF NOT EXISTS aggregate_meta (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    rebuilt_at INTEGER NOT NULL,
    commit_count INTEGER NOT NULL,
    enriched_count INTEGER NOT NULL,
    failed_count INTEGER NOT NULL
);
"#,
];
