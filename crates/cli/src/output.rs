// crates/cli/src/output.rs
//! Plain-text and JSON rendering of command results.

use std::fmt::Write as _;
use std::io::Write as _;

use chrono::DateTime;
use commitscope_core::BatchJob;
use commitscope_db::{CoupledFile, CouplingPair, FileStats, Hotspot, MonthTrend};
use commitscope_pipeline::{CycleOutcome, CycleResult, IndexStatus, IndexSummary};
use commitscope_search::SearchResponse;
use serde::Serialize;

/// Pretty JSON on stdout, newline-terminated.
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> std::io::Result<()> {
    let mut out = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut out, value)?;
    writeln!(out)
}

pub fn format_timestamp(ts: i64) -> String {
    DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}

fn format_complexity(c: Option<u8>) -> String {
    c.map(|c| c.to_string()).unwrap_or_else(|| "-".into())
}

// ============================================================================
// Pipeline commands
// ============================================================================

pub fn render_index(s: &IndexSummary) -> String {
    format!(
        "Scanned {} commits, {} new.\nAggregates: {} files, {} pairs, {} trend buckets.\nSearch index: {} commits.\n",
        s.sync.scanned,
        s.sync.inserted,
        s.rebuild.files,
        s.rebuild.pairs,
        s.rebuild.trend_buckets,
        s.indexed
    )
}

pub fn render_cycle(r: &CycleResult) -> String {
    let s = &r.summary;
    let mut out = String::new();
    match r.outcome {
        CycleOutcome::Submitted => {
            let _ = writeln!(
                out,
                "Submitted {} commits in {} batch job(s): {}",
                s.submitted_commits,
                s.submitted_jobs.len(),
                s.submitted_jobs.join(", ")
            );
        }
        CycleOutcome::InProgress => {
            let _ = writeln!(out, "{} batch job(s) still processing.", s.jobs_in_progress);
        }
        CycleOutcome::Imported => {
            let _ = writeln!(
                out,
                "Imported {} results from {} job(s).",
                s.imported, s.jobs_imported
            );
        }
        CycleOutcome::Done => {
            let _ = writeln!(out, "All commits enriched; aggregates and search index rebuilt.");
        }
    }
    if s.imported > 0 && r.outcome == CycleOutcome::Submitted {
        let _ = writeln!(out, "Imported {} results synchronously.", s.imported);
    }
    let failures = s.item_errors + s.parse_failures + s.missing;
    if failures > 0 {
        let _ = writeln!(
            out,
            "  {} failed ({} service errors, {} unparseable, {} missing)",
            failures, s.item_errors, s.parse_failures, s.missing
        );
    }
    if s.jobs_failed > 0 {
        let _ = writeln!(
            out,
            "  {} job(s) failed; {} commits marked failed (retry with --retry-failed)",
            s.jobs_failed, s.failed_commits
        );
    }
    for err in &s.service_errors {
        let _ = writeln!(out, "  stopped early: {err}");
    }
    if r.outcome.needs_reinvoke() {
        let _ = writeln!(out, "Run `commitscope enrich` again to continue.");
    }
    out
}

fn render_job(out: &mut String, job: &BatchJob) {
    let _ = writeln!(
        out,
        "  {:<28} {:<12} {:>5} commits  {}",
        job.id,
        job.status.as_db_str(),
        job.member_hashes.len(),
        format_timestamp(job.created_at)
    );
    if let Some(err) = &job.error_message {
        let _ = writeln!(out, "      error: {err}");
    }
}

pub fn render_status(s: &IndexStatus) -> String {
    let mut out = String::new();
    let c = &s.commits;
    let _ = writeln!(
        out,
        "Commits: {} total, {} enriched, {} pending, {} failed",
        c.total, c.enriched, c.unenriched, c.failed
    );

    if s.open_jobs.is_empty() {
        let _ = writeln!(out, "Open batch jobs: none");
    } else {
        let _ = writeln!(out, "Open batch jobs:");
        for job in &s.open_jobs {
            render_job(&mut out, job);
        }
    }

    match &s.aggregates {
        Some(meta) => {
            let _ = writeln!(
                out,
                "Aggregates: rebuilt {}{}",
                format_timestamp(meta.rebuilt_at),
                if s.aggregates_stale { " (stale)" } else { "" }
            );
        }
        None => {
            let _ = writeln!(out, "Aggregates: never built");
        }
    }

    if let Some(holder) = &s.lock {
        let _ = writeln!(
            out,
            "Lock: held by pid {} on {} since {}{}",
            holder.pid,
            holder.hostname,
            holder.acquired_at,
            if holder.alive { "" } else { " (process not running)" }
        );
    }

    if !s.recent_jobs.is_empty() {
        let _ = writeln!(out, "Recent batch jobs:");
        for job in &s.recent_jobs {
            render_job(&mut out, job);
        }
    }
    out
}

// ============================================================================
// Queries
// ============================================================================

pub fn render_hotspots(rows: &[Hotspot]) -> String {
    if rows.is_empty() {
        return "No files indexed.\n".into();
    }
    let mut out = format!("{:>6}  {:>7}  {:>10}  {}\n", "SCORE", "CHANGES", "COMPLEXITY", "PATH");
    for h in rows {
        let _ = writeln!(
            out,
            "{:>6.3}  {:>7}  {:>10}  {}",
            h.score,
            h.total_changes,
            format_complexity(h.complexity),
            h.path
        );
    }
    out
}

pub fn render_pairs(rows: &[CouplingPair]) -> String {
    if rows.is_empty() {
        return "No coupled files.\n".into();
    }
    let mut out = String::new();
    for p in rows {
        let _ = writeln!(out, "{:>5}  {} <-> {}", p.co_changes, p.path_a, p.path_b);
    }
    out
}

pub fn render_coupled(anchor: &str, rows: &[CoupledFile]) -> String {
    if rows.is_empty() {
        return format!("Nothing changes together with {anchor}.\n");
    }
    let mut out = format!("Changes together with {anchor}:\n");
    for f in rows {
        let _ = writeln!(
            out,
            "{:>5}  {:>5.1}%  {}",
            f.co_changes,
            f.ratio * 100.0,
            f.path
        );
    }
    out
}

pub fn render_file_stats(s: &FileStats) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} ({})", s.path, s.category.as_str());
    let _ = writeln!(out, "  changes:      {}", s.total_changes);
    let _ = writeln!(out, "  complexity:   {}", format_complexity(s.complexity));
    let _ = writeln!(out, "  hotspot:      {:.3}", s.hotspot_score);
    let _ = writeln!(out, "  first change: {}", format_timestamp(s.first_changed_at));
    let _ = writeln!(out, "  last change:  {}", format_timestamp(s.last_changed_at));
    if !s.classification_counts.is_empty() {
        let parts: Vec<String> = s
            .classification_counts
            .iter()
            .map(|(k, v)| format!("{k} {v}"))
            .collect();
        let _ = writeln!(out, "  by type:      {}", parts.join(", "));
    }
    out
}

pub fn render_trends(rows: &[MonthTrend]) -> String {
    if rows.is_empty() {
        return "No commits in range.\n".into();
    }
    let mut out = String::new();
    for m in rows {
        let delta = match m.delta {
            Some(d) if d >= 0 => format!("+{d}"),
            Some(d) => d.to_string(),
            None => String::new(),
        };
        let parts: Vec<String> = m.counts.iter().map(|(k, v)| format!("{k} {v}")).collect();
        let _ = writeln!(out, "{}  {:>4} {:>5}  {}", m.month, m.total, delta, parts.join(", "));
    }
    out
}

pub fn render_search(r: &SearchResponse) -> String {
    let mut out = format!(
        "{} matches for \"{}\" ({:.1} ms)\n",
        r.total_hits, r.query, r.elapsed_ms
    );
    for hit in &r.hits {
        let short = &hit.hash[..hit.hash.len().min(10)];
        let class = hit.classification.as_deref().unwrap_or("-");
        let _ = writeln!(
            out,
            "{short}  {}  {:<12} {}",
            format_timestamp(hit.timestamp),
            class,
            hit.message
        );
        if let Some(summary) = &hit.summary {
            let _ = writeln!(out, "            {summary}");
        }
    }
    out
}
