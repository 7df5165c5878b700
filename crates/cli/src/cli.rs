// crates/cli/src/cli.rs

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use commitscope_core::config::parse_since;
use commitscope_core::FileCategory;

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    parse_since(s).ok_or_else(|| format!("'{s}' is not a YYYY-MM-DD date"))
}

fn parse_category(s: &str) -> Result<FileCategory, String> {
    FileCategory::parse(s)
        .ok_or_else(|| format!("'{s}' is not one of: source, test, docs, generated, config"))
}

/// commitscope - commit history analytics with AI enrichment
#[derive(Parser, Debug)]
#[command(name = "commitscope", version, about)]
#[command(after_help = "\
Examples:
  commitscope init                     Create .commitscope/ in the current repository
  commitscope index                    Import new commits and rebuild statistics
  commitscope enrich                   Advance enrichment by one step (re-run until done)
  commitscope hotspots --limit 10      Files with the most churn and complexity
  commitscope coupling src/db          Files that change together with src/db/")]
pub struct Cli {
    /// Path inside the repository (default: current directory)
    #[arg(long, global = true, default_value = ".")]
    pub repo: PathBuf,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the index directory and database
    Init,

    /// Import new commits from git and rebuild aggregates and search index
    Index {
        /// Only import commits on or after this date (YYYY-MM-DD)
        #[arg(long, value_parser = parse_date)]
        since: Option<NaiveDate>,
    },

    /// Run one enrichment cycle (submit, poll, import, or rebuild)
    Enrich {
        /// Make commits whose enrichment failed eligible again first
        #[arg(long)]
        retry_failed: bool,
    },

    /// Show commit totals, batch jobs, aggregate freshness and lock holder
    Status,

    /// Rank files by churn and complexity
    Hotspots {
        #[arg(long, default_value_t = 20)]
        limit: i64,
        #[command(flatten)]
        filter: CategoryFilter,
    },

    /// Show co-change coupling, globally or for a file or directory
    Coupling {
        /// File or directory to anchor on
        path: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: i64,
        #[command(flatten)]
        filter: CategoryFilter,
    },

    /// Show statistics for one file
    Stats { path: String },

    /// Monthly commit counts per classification
    Trends {
        #[arg(long, default_value_t = 12)]
        months: i64,
    },

    /// Full-text search over commit messages and summaries
    Search {
        query: String,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Remove the write lock left by a crashed process
    Unlock {
        /// Remove the lock even if its holder looks alive
        #[arg(long)]
        force: bool,
    },
}

#[derive(clap::Args, Debug, Clone)]
pub struct CategoryFilter {
    /// File categories to leave out (repeatable); defaults to the configured set
    #[arg(long = "exclude", value_parser = parse_category)]
    pub exclude: Vec<FileCategory>,

    /// Do not exclude any category
    #[arg(long, conflicts_with = "exclude")]
    pub all: bool,
}

impl CategoryFilter {
    pub fn resolve(&self, configured: &[FileCategory]) -> Vec<FileCategory> {
        if self.all {
            Vec::new()
        } else if self.exclude.is_empty() {
            configured.to_vec()
        } else {
            self.exclude.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_hotspots_with_excludes() {
        let cli = Cli::parse_from([
            "commitscope", "hotspots", "--limit", "5", "--exclude", "test", "--exclude", "docs",
        ]);
        let Commands::Hotspots { limit, filter } = cli.command else {
            panic!("expected hotspots");
        };
        assert_eq!(limit, 5);
        assert_eq!(filter.exclude, vec![FileCategory::Test, FileCategory::Docs]);
    }

    #[test]
    fn test_filter_resolution() {
        let configured = [FileCategory::Generated];
        let default = CategoryFilter {
            exclude: vec![],
            all: false,
        };
        assert_eq!(default.resolve(&configured), vec![FileCategory::Generated]);
        let all = CategoryFilter {
            exclude: vec![],
            all: true,
        };
        assert!(all.resolve(&configured).is_empty());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["commitscope", "status", "--json", "--repo", "/tmp/r"]);
        assert!(cli.json);
        assert_eq!(cli.repo, PathBuf::from("/tmp/r"));
    }

    #[test]
    fn test_rejects_bad_date() {
        assert!(Cli::try_parse_from(["commitscope", "index", "--since", "yesterday"]).is_err());
    }
}
