// crates/core/src/category.rs
//! Path-based file categories used to filter aggregate queries.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileCategory {
    Source,
    Test,
    Docs,
    Generated,
    Config,
}

impl FileCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::Test => "test",
            Self::Docs => "docs",
            Self::Generated => "generated",
            Self::Config => "config",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "source" | "src" => Some(Self::Source),
            "test" | "tests" => Some(Self::Test),
            "docs" | "doc" => Some(Self::Docs),
            "generated" | "gen" => Some(Self::Generated),
            "config" => Some(Self::Config),
            _ => None,
        }
    }
}

const GENERATED_DIRS: &[&str] = &[
    "dist", "build", "out", "target", "vendor", "node_modules", "generated", "__generated__",
];
const GENERATED_FILES: &[&str] = &[
    "package-lock.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    "bun.lockb",
    "cargo.lock",
    "poetry.lock",
    "gemfile.lock",
    "composer.lock",
    "go.sum",
];
const TEST_DIRS: &[&str] = &["test", "tests", "__tests__", "spec", "specs", "e2e", "fixtures", "testdata"];
const DOC_DIRS: &[&str] = &["doc", "docs", "documentation"];
const DOC_EXTENSIONS: &[&str] = &["md", "mdx", "rst", "adoc", "txt"];
const CONFIG_FILES: &[&str] = &[
    "package.json",
    "cargo.toml",
    "pyproject.toml",
    "tsconfig.json",
    "makefile",
    "dockerfile",
    "go.mod",
];
const CONFIG_EXTENSIONS: &[&str] = &["toml", "yaml", "yml", "ini", "cfg", "conf"];

/// Categorize a repository-relative path.
///
/// Precedence: generated > test > docs > config > source, so a lockfile
/// under `docs/` is still generated and `tests/README.md` is a test file.
pub fn categorize_path(path: &str) -> FileCategory {
    let lower = path.to_ascii_lowercase();
    let segments: Vec<&str> = lower.split('/').filter(|s| !s.is_empty()).collect();
    let Some(file_name) = segments.last().copied() else {
        return FileCategory::Source;
    };
    let dirs = &segments[..segments.len() - 1];
    let extension = file_name.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("");

    if dirs.iter().any(|d| GENERATED_DIRS.contains(d))
        || GENERATED_FILES.contains(&file_name)
        || file_name.ends_with(".min.js")
        || file_name.ends_with(".min.css")
        || file_name.ends_with(".map")
        || file_name.ends_with(".snap")
        || file_name.contains(".generated.")
        || file_name.ends_with(".pb.go")
    {
        return FileCategory::Generated;
    }

    if dirs.iter().any(|d| TEST_DIRS.contains(d)) || is_test_file_name(file_name) {
        return FileCategory::Test;
    }

    if dirs.iter().any(|d| DOC_DIRS.contains(d))
        || DOC_EXTENSIONS.contains(&extension)
        || file_name.starts_with("readme")
        || file_name.starts_with("changelog")
        || file_name == "license"
    {
        return FileCategory::Docs;
    }

    if CONFIG_FILES.contains(&file_name)
        || CONFIG_EXTENSIONS.contains(&extension)
        || (file_name.starts_with('.') && !file_name[1..].contains('.'))
        || dirs.first() == Some(&".github")
    {
        return FileCategory::Config;
    }

    FileCategory::Source
}

fn is_test_file_name(name: &str) -> bool {
    let stem = name.rsplit_once('.').map(|(s, _)| s).unwrap_or(name);
    stem.ends_with(".test")
        || stem.ends_with(".spec")
        || stem.ends_with("_test")
        || stem.starts_with("test_")
        || stem.ends_with("_spec")
        || stem.ends_with("_tests")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_files() {
        assert_eq!(categorize_path("src/main.rs"), FileCategory::Source);
        assert_eq!(categorize_path("a.ts"), FileCategory::Source);
        assert_eq!(categorize_path("lib/parser/lexer.py"), FileCategory::Source);
    }

    #[test]
    fn test_test_files() {
        assert_eq!(categorize_path("src/app.test.ts"), FileCategory::Test);
        assert_eq!(categorize_path("tests/integration.rs"), FileCategory::Test);
        assert_eq!(categorize_path("pkg/server_test.go"), FileCategory::Test);
        assert_eq!(categorize_path("test_utils.py"), FileCategory::Test);
        assert_eq!(categorize_path("src/__tests__/button.tsx"), FileCategory::Test);
        assert_eq!(categorize_path("tests/README.md"), FileCategory::Test);
    }

    #[test]
    fn test_docs_files() {
        assert_eq!(categorize_path("README.md"), FileCategory::Docs);
        assert_eq!(categorize_path("docs/guide/setup.html"), FileCategory::Docs);
        assert_eq!(categorize_path("CHANGELOG"), FileCategory::Docs);
    }

    #[test]
    fn test_generated_files() {
        assert_eq!(categorize_path("package-lock.json"), FileCategory::Generated);
        assert_eq!(categorize_path("Cargo.lock"), FileCategory::Generated);
        assert_eq!(categorize_path("dist/bundle.js"), FileCategory::Generated);
        assert_eq!(categorize_path("static/app.min.js"), FileCategory::Generated);
        assert_eq!(categorize_path("docs/yarn.lock"), FileCategory::Generated);
    }

    #[test]
    fn test_config_files() {
        assert_eq!(categorize_path("Cargo.toml"), FileCategory::Config);
        assert_eq!(categorize_path(".gitignore"), FileCategory::Config);
        assert_eq!(categorize_path(".github/workflows/ci.yml"), FileCategory::Config);
        assert_eq!(categorize_path("deploy/values.yaml"), FileCategory::Config);
    }

    #[test]
    fn test_parse_roundtrip() {
        for c in [
            FileCategory::Source,
            FileCategory::Test,
            FileCategory::Docs,
            FileCategory::Generated,
            FileCategory::Config,
        ] {
            assert_eq!(FileCategory::parse(c.as_str()), Some(c));
        }
        assert_eq!(FileCategory::parse("tests"), Some(FileCategory::Test));
        assert_eq!(FileCategory::parse("binary"), None);
    }
}
