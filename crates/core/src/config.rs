// crates/core/src/config.rs
//! Enrichment configuration.
//!
//! Resolution order: built-in defaults, then `<index_dir>/config.toml` if the
//! user created one, then `COMMITSCOPE_*` environment variables. The tool only
//! reads the file; it never writes it.

use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::category::FileCategory;
use crate::error::ConfigError;
use crate::paths;

pub const API_KEY_VAR: &str = "ANTHROPIC_API_KEY";
pub const DEFAULT_MODEL: &str = "claude-haiku-4-5-20251001";
pub const DEFAULT_API_BASE: &str = "https://api.anthropic.com";

/// Which classification service variant to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Message Batches API: submit, then poll across invocations.
    #[default]
    Batch,
    /// One request per commit, results available at submit time.
    Sync,
}

impl Backend {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "batch" => Some(Self::Batch),
            "sync" | "messages" => Some(Self::Sync),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichConfig {
    pub model: String,
    pub max_tokens: u32,
    /// Maximum commits per submitted batch.
    pub batch_size: usize,
    /// Ignore commits authored before this date.
    pub since: Option<NaiveDate>,
    pub backend: Backend,
    pub api_base: String,
    /// Diffs are cut to this many bytes before submission.
    pub max_diff_bytes: usize,
    /// Commits touching more files than this are skipped for coupling.
    pub max_files_for_coupling: usize,
    pub excluded_categories: Vec<FileCategory>,
}

impl Default for EnrichConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.into(),
            max_tokens: 512,
            batch_size: 100,
            since: None,
            backend: Backend::Batch,
            api_base: DEFAULT_API_BASE.into(),
            max_diff_bytes: 12_000,
            max_files_for_coupling: 100,
            excluded_categories: vec![FileCategory::Generated],
        }
    }
}

impl EnrichConfig {
    /// Load config for an index directory, applying environment overrides.
    pub fn load(index_dir: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::from_file(&paths::config_path(index_dir))?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Parse a config file. A missing file yields the defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        };
        let config: Self = toml::from_str(&contents).map_err(|e| ConfigError::InvalidFile {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `COMMITSCOPE_*` overrides from `lookup` (normally the process env).
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(model) = lookup("COMMITSCOPE_MODEL").filter(|s| !s.trim().is_empty()) {
            self.model = model.trim().to_string();
        }
        if let Some(raw) = lookup("COMMITSCOPE_BATCH_SIZE") {
            self.batch_size = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: "COMMITSCOPE_BATCH_SIZE",
                value: raw.clone(),
            })?;
        }
        if let Some(raw) = lookup("COMMITSCOPE_SINCE") {
            self.since = Some(parse_since(&raw).ok_or_else(|| ConfigError::InvalidValue {
                key: "COMMITSCOPE_SINCE",
                value: raw.clone(),
            })?);
        }
        if let Some(raw) = lookup("COMMITSCOPE_BACKEND") {
            self.backend = Backend::parse(&raw).ok_or_else(|| ConfigError::InvalidValue {
                key: "COMMITSCOPE_BACKEND",
                value: raw.clone(),
            })?;
        }
        self.validate()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "batch_size",
                value: "0".into(),
            });
        }
        Ok(())
    }
}

/// Parse a `YYYY-MM-DD` start date.
pub fn parse_since(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}

/// Start of the `since` day as Unix seconds, UTC. Both commit sync and
/// enrichment discovery compare author time against this value.
pub fn since_timestamp(date: NaiveDate) -> i64 {
    date.and_time(chrono::NaiveTime::MIN).and_utc().timestamp()
}

/// Read the classification-service key from the environment.
pub fn api_key() -> Result<String, ConfigError> {
    api_key_from(|key| std::env::var(key).ok())
}

fn api_key_from(lookup: impl Fn(&str) -> Option<String>) -> Result<String, ConfigError> {
    lookup(API_KEY_VAR)
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .ok_or(ConfigError::MissingApiKey { var: API_KEY_VAR })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let config = EnrichConfig::from_file(&tmp.path().join("config.toml")).unwrap();
        assert_eq!(config, EnrichConfig::default());
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.backend, Backend::Batch);
    }

    #[test]
    fn test_file_values_merge_with_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
batch_size = 25
since = "2024-03-01"
backend = "sync"
excluded_categories = ["test", "docs"]
"#,
        )
        .unwrap();

        let config = EnrichConfig::from_file(&path).unwrap();
        assert_eq!(config.batch_size, 25);
        assert_eq!(config.since, NaiveDate::from_ymd_opt(2024, 3, 1));
        assert_eq!(config.backend, Backend::Sync);
        assert_eq!(
            config.excluded_categories,
            vec![FileCategory::Test, FileCategory::Docs]
        );
        assert_eq!(config.model, DEFAULT_MODEL);
    }

    #[test]
    fn test_invalid_file_is_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "batch_size = \"lots\"").unwrap();
        assert!(matches!(
            EnrichConfig::from_file(&path),
            Err(ConfigError::InvalidFile { .. })
        ));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = EnrichConfig::default();
        config
            .apply_overrides(env(&[
                ("COMMITSCOPE_MODEL", "claude-sonnet-4-5"),
                ("COMMITSCOPE_BATCH_SIZE", "7"),
                ("COMMITSCOPE_SINCE", "2025-01-15"),
                ("COMMITSCOPE_BACKEND", "SYNC"),
            ]))
            .unwrap();
        assert_eq!(config.model, "claude-sonnet-4-5");
        assert_eq!(config.batch_size, 7);
        assert_eq!(config.since, NaiveDate::from_ymd_opt(2025, 1, 15));
        assert_eq!(config.backend, Backend::Sync);
    }

    #[test]
    fn test_env_override_rejects_garbage() {
        let mut config = EnrichConfig::default();
        let err = config
            .apply_overrides(env(&[("COMMITSCOPE_SINCE", "last tuesday")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                key: "COMMITSCOPE_SINCE",
                ..
            }
        ));

        let err = config
            .apply_overrides(env(&[("COMMITSCOPE_BATCH_SIZE", "0")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "batch_size", .. }));
    }

    #[test]
    fn test_api_key_lookup() {
        assert!(matches!(
            api_key_from(env(&[])),
            Err(ConfigError::MissingApiKey { .. })
        ));
        assert!(matches!(
            api_key_from(env(&[(API_KEY_VAR, "   ")])),
            Err(ConfigError::MissingApiKey { .. })
        ));
        assert_eq!(api_key_from(env(&[(API_KEY_VAR, "sk-test")])).unwrap(), "sk-test");
    }

    #[test]
    fn test_since_timestamp_is_utc_midnight() {
        let date = parse_since("2024-03-01").unwrap();
        assert_eq!(since_timestamp(date), 1_709_251_200);
    }
}
