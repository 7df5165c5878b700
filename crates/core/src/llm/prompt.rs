// crates/core/src/llm/prompt.rs
//! Prompt construction and verdict parsing shared by all service variants.

use crate::types::{Classification, Verdict};

use super::types::ClassificationItem;

/// Longest summary kept from a model answer, in characters.
const MAX_SUMMARY_CHARS: usize = 300;
/// Changed-file list is cut after this many entries.
const MAX_LISTED_FILES: usize = 50;

/// Build the user prompt for one commit. The diff is cut to `max_diff_bytes`
/// on a character boundary.
pub fn build_classification_prompt(item: &ClassificationItem, max_diff_bytes: usize) -> String {
    let taxonomy = Classification::ALL
        .iter()
        .map(|c| c.as_str())
        .collect::<Vec<_>>()
        .join(" | ");

    let mut files = item
        .files_changed
        .iter()
        .take(MAX_LISTED_FILES)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    if item.files_changed.len() > MAX_LISTED_FILES {
        files.push_str(&format!(
            ", ... ({} more)",
            item.files_changed.len() - MAX_LISTED_FILES
        ));
    }

    let (diff, truncated) = truncate_at_char_boundary(&item.diff, max_diff_bytes);
    let truncation_note = if truncated { "\n[diff truncated]" } else { "" };

    format!(
        r#"You are a JSON classifier. Output ONLY a JSON object, no other text.

Classify this git commit. The diff may be truncated; classify using your best judgment from whatever is provided. Never refuse or ask for more context.

Commit message: {message}
Author: {author}
Files changed: {files}

Diff:
{diff}{truncation_note}

classification: {taxonomy}
summary: one sentence describing what the commit does
complexity: integer 1 (trivial) to 5 (very complex)

{{"classification":"...","summary":"...","complexity":1}}"#,
        message = item.message,
        author = item.author,
    )
}

/// Parse a model answer into a verdict. Text around the JSON object is
/// tolerated. Errors are human-readable reasons recorded against the commit.
pub fn parse_verdict(text: &str) -> Result<Verdict, String> {
    let json = extract_json_from_text(text).ok_or_else(|| {
        format!(
            "no JSON object found in answer: {}",
            truncate_at_char_boundary(text.trim(), 200).0
        )
    })?;

    let raw_class = json
        .get("classification")
        .and_then(|v| v.as_str())
        .ok_or("answer missing \"classification\"")?;
    let classification = Classification::parse(raw_class)
        .ok_or_else(|| format!("unknown classification {raw_class:?}"))?;

    let summary = json
        .get("summary")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or("answer missing \"summary\"")?;
    let summary: String = summary.chars().take(MAX_SUMMARY_CHARS).collect();

    let complexity = json
        .get("complexity")
        .and_then(complexity_value)
        .ok_or("answer missing integer \"complexity\"")?;
    if !(1..=5).contains(&complexity) {
        return Err(format!("complexity {complexity} outside 1..=5"));
    }

    Ok(Verdict {
        classification,
        summary,
        complexity: complexity as u8,
    })
}

fn complexity_value(v: &serde_json::Value) -> Option<i64> {
    if let Some(n) = v.as_i64() {
        return Some(n);
    }
    if let Some(f) = v.as_f64() {
        return (f.fract() == 0.0).then_some(f as i64);
    }
    v.as_str().and_then(|s| s.trim().parse().ok())
}

/// Extract the first balanced JSON object `{...}` from a text string.
/// Braces inside JSON strings are ignored.
pub fn extract_json_from_text(text: &str) -> Option<serde_json::Value> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    let mut end = None;
    for (i, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    end = Some(start + i + 1);
                    break;
                }
            }
            _ => {}
        }
    }
    serde_json::from_str(&text[start..end?]).ok()
}

/// Cut `s` to at most `max_bytes`, backing off to a char boundary.
/// Returns the slice and whether anything was dropped.
pub fn truncate_at_char_boundary(s: &str, max_bytes: usize) -> (&str, bool) {
    if s.len() <= max_bytes {
        return (s, false);
    }
    let mut cut = max_bytes;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    (&s[..cut], true)
}
