// crates/cli/src/commands.rs
//! Command dispatch: resolve the repository, open the index, run, render.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use commitscope_core::git::repo_root;
use commitscope_core::llm::create_service;
use commitscope_core::lock::{force_unlock, read_holder};
use commitscope_core::{config, GitCli, WriteLock};
use commitscope_pipeline::{
    index_repository, status, EnrichmentOrchestrator, IndexContext, PipelineError,
    PipelineResult,
};
use indicatif::{ProgressBar, ProgressStyle};

use crate::cli::{CategoryFilter, Cli, Commands};
use crate::output;

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let root = resolve_root(&cli.repo).await?;
    let json = cli.json;

    match cli.command {
        Commands::Init => init(&root, json).await?,
        Commands::Index { since } => {
            let ctx = IndexContext::open(&root).await?;
            let vcs = GitCli::new(&ctx.repo_root);
            let pb = spinner(json, "Indexing commits");
            let summary = index_repository(&ctx, &vcs, since).await;
            pb.finish_and_clear();
            let summary = summary?;
            emit(json, &summary, output::render_index)?;
        }
        Commands::Enrich { retry_failed } => enrich(&root, retry_failed, json).await?,
        Commands::Status => {
            let ctx = IndexContext::open(&root).await?;
            let s = status(&ctx).await?;
            emit(json, &s, output::render_status)?;
        }
        Commands::Hotspots { limit, filter } => {
            let ctx = IndexContext::open(&root).await?;
            let excluded = filter.resolve(&ctx.config.excluded_categories);
            let rows = ctx
                .aggregates()
                .get_hotspots(limit, &excluded)
                .await
                .map_err(PipelineError::from)?;
            emit(json, &rows, |r| output::render_hotspots(r))?;
        }
        Commands::Coupling {
            path,
            limit,
            filter,
        } => coupling(&root, path.as_deref(), limit, &filter, json).await?,
        Commands::Stats { path } => {
            let ctx = IndexContext::open(&root).await?;
            let path = normalize_path(&path);
            match ctx
                .aggregates()
                .get_file_stats(&path)
                .await
                .map_err(PipelineError::from)?
            {
                Some(stats) => emit(json, &stats, output::render_file_stats)?,
                None => bail!("no statistics for {path}; is it tracked and indexed?"),
            }
        }
        Commands::Trends { months } => {
            let ctx = IndexContext::open(&root).await?;
            let rows = ctx
                .aggregates()
                .get_trends(months)
                .await
                .map_err(PipelineError::from)?;
            emit(json, &rows, |r| output::render_trends(r))?;
        }
        Commands::Search { query, limit } => {
            let ctx = IndexContext::open(&root).await?;
            let index = ctx.open_search()?;
            let response = index.search(&query, limit).map_err(PipelineError::from)?;
            emit(json, &response, output::render_search)?;
        }
        Commands::Unlock { force } => {
            let index_dir = commitscope_core::paths::index_dir(&root);
            if !force {
                match read_holder(&index_dir).map_err(PipelineError::from)? {
                    Some(holder) => bail!(
                        "index is locked by pid {} on {} ({}); pass --force to remove the lock",
                        holder.pid,
                        holder.hostname,
                        if holder.alive { "running" } else { "not running" }
                    ),
                    None => {
                        println!("Index is not locked.");
                        return Ok(());
                    }
                }
            }
            let previous = force_unlock(&index_dir).map_err(PipelineError::from)?;
            if json {
                output::print_json(&previous)?;
            } else if let Some(holder) = previous {
                println!("Removed lock held by pid {}.", holder.pid);
            } else {
                println!("Index is not locked.");
            }
        }
    }
    Ok(())
}

async fn resolve_root(repo: &Path) -> PipelineResult<PathBuf> {
    Ok(repo_root(repo).await?)
}

async fn init(root: &Path, json: bool) -> PipelineResult<()> {
    let ctx = IndexContext::init(root).await?;
    if json {
        output::print_json(&serde_json::json!({ "indexDir": ctx.index_dir }))?;
    } else {
        println!("Initialized index at {}", ctx.index_dir.display());
    }
    Ok(())
}

async fn enrich(root: &Path, retry_failed: bool, json: bool) -> PipelineResult<()> {
    let ctx = IndexContext::open(root).await?;
    // Credentials are checked before the lock is taken or anything is written.
    let api_key = config::api_key()?;
    let service = create_service(&ctx.config, &api_key)?;

    if retry_failed {
        let lock = WriteLock::acquire(&ctx.index_dir)?;
        let reset = ctx.db.retry_failed_enrichments().await?;
        lock.release();
        tracing::info!(commits = reset, "failed enrichments reset");
        if !json && reset > 0 {
            println!("Marked {reset} failed commits for retry.");
        }
    }

    let orchestrator = EnrichmentOrchestrator::new(
        ctx.index_dir.clone(),
        ctx.db.clone(),
        Arc::new(ctx.open_search()?),
        Arc::new(GitCli::new(&ctx.repo_root)),
        service,
        ctx.config.clone(),
    );

    let pb = spinner(json, "Enriching");
    let result = orchestrator
        .run_cycle(|progress| pb.set_message(progress.to_string()))
        .await;
    pb.finish_and_clear();
    let result = result?;

    emit(json, &result, output::render_cycle)
}

async fn coupling(
    root: &Path,
    path: Option<&str>,
    limit: i64,
    filter: &CategoryFilter,
    json: bool,
) -> PipelineResult<()> {
    let ctx = IndexContext::open(root).await?;
    let engine = ctx.aggregates();
    let excluded = filter.resolve(&ctx.config.excluded_categories);

    let Some(raw) = path else {
        let pairs = engine.get_top_coupled_pairs(limit, &excluded).await?;
        return emit(json, &pairs, |p| output::render_pairs(p));
    };

    let anchor = normalize_path(raw);
    let is_file = !raw.ends_with('/') && engine.get_file_stats(&anchor).await?.is_some();
    let rows = if is_file {
        engine
            .get_coupled_files_with_ratio(&anchor, limit, &excluded)
            .await?
    } else {
        engine
            .get_coupled_files_for_directory(&anchor, limit, &excluded)
            .await?
    };
    emit(json, &rows, |r| output::render_coupled(&anchor, r))
}

/// Repository-relative form of a user-supplied path.
fn normalize_path(raw: &str) -> String {
    raw.trim()
        .trim_start_matches("./")
        .trim_end_matches('/')
        .to_string()
}

fn emit<T, F>(json: bool, value: &T, render: F) -> PipelineResult<()>
where
    T: serde::Serialize + ?Sized,
    F: FnOnce(&T) -> String,
{
    if json {
        output::print_json(value)?;
    } else {
        print!("{}", render(value));
    }
    Ok(())
}

/// Spinner on stderr; hidden in JSON mode so stdout stays parseable.
fn spinner(json: bool, prefix: &str) -> ProgressBar {
    if json {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("  {spinner} {prefix} {msg}")
            .expect("valid spinner template"),
    );
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}
