use std::time::Instant;

use tantivy::collector::{Count, TopDocs};
use tantivy::query::{BooleanQuery, FuzzyTermQuery, Occur, Query, QueryParser, TermQuery};
use tantivy::schema::{IndexRecordOption, Value};
use tantivy::{TantivyDocument, Term};
use tracing::debug;

use commitscope_core::Classification;

use crate::types::{CommitHit, SearchResponse};
use crate::{CommitSearchIndex, SearchError};

#[derive(Debug, Clone, PartialEq)]
enum Qualifier {
    Classification(String),
    Author(String),
}

/// Split a raw query into free text and `key:value` qualifiers.
///
/// Keys: `class` / `classification` and `author`. Unknown keys stay part of
/// the text.
fn parse_query_string(raw: &str) -> (String, Vec<Qualifier>) {
    let mut qualifiers = Vec::new();
    let mut text_parts = Vec::new();

    for token in tokenize_query(raw) {
        if let Some((key, value)) = token.split_once(':') {
            if !value.is_empty() {
                match key {
                    "class" | "classification" => {
                        let value = Classification::parse(value)
                            .map(|c| c.as_str().to_string())
                            .unwrap_or_else(|| value.to_string());
                        qualifiers.push(Qualifier::Classification(value));
                        continue;
                    }
                    "author" => {
                        qualifiers.push(Qualifier::Author(value.to_string()));
                        continue;
                    }
                    _ => {}
                }
            }
        }
        text_parts.push(token);
    }

    (text_parts.join(" "), qualifiers)
}

/// Whitespace split that keeps `"quoted phrases"` as one token.
fn tokenize_query(raw: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut chars = raw.chars();

    while let Some(ch) = chars.next() {
        match ch {
            '"' => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
                let mut phrase = String::from("\"");
                for c in chars.by_ref() {
                    if c == '"' {
                        break;
                    }
                    phrase.push(c);
                }
                phrase.push('"');
                tokens.push(phrase);
            }
            c if c.is_whitespace() => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// Lowercased alphanumeric runs, mirroring Tantivy's default tokenizer.
fn text_tokens(s: &str) -> Vec<String> {
    s.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

impl CommitSearchIndex {
    fn text_fields(&self) -> Vec<tantivy::schema::Field> {
        vec![self.message_field, self.summary_field, self.files_field]
    }

    /// Search commits by message, summary and changed paths.
    ///
    /// Unquoted terms match fuzzily (edit distance 1) and must all appear in
    /// at least one text field. A fully quoted query is an exact phrase.
    pub fn search(&self, query_str: &str, limit: usize) -> Result<SearchResponse, SearchError> {
        let start = Instant::now();
        let (text_query, qualifiers) = parse_query_string(query_str);
        let mut sub_queries: Vec<(Occur, Box<dyn Query>)> = Vec::new();

        let trimmed = text_query.trim();
        if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
            let parser = QueryParser::for_index(&self.index, self.text_fields());
            sub_queries.push((Occur::Must, parser.parse_query(trimmed)?));
        } else {
            for token in text_tokens(trimmed) {
                let per_field: Vec<(Occur, Box<dyn Query>)> = self
                    .text_fields()
                    .into_iter()
                    .map(|field| {
                        let term = Term::from_field_text(field, &token);
                        let q: Box<dyn Query> = Box::new(FuzzyTermQuery::new(term, 1, true));
                        (Occur::Should, q)
                    })
                    .collect();
                sub_queries.push((Occur::Must, Box::new(BooleanQuery::new(per_field))));
            }
        }

        for qualifier in &qualifiers {
            match qualifier {
                Qualifier::Classification(value) => {
                    let term = Term::from_field_text(self.classification_field, value);
                    sub_queries.push((
                        Occur::Must,
                        Box::new(TermQuery::new(term, IndexRecordOption::Basic)),
                    ));
                }
                Qualifier::Author(value) => {
                    for token in text_tokens(value) {
                        let term = Term::from_field_text(self.author_field, &token);
                        sub_queries.push((
                            Occur::Must,
                            Box::new(TermQuery::new(term, IndexRecordOption::Basic)),
                        ));
                    }
                }
            }
        }

        if sub_queries.is_empty() || limit == 0 {
            return Ok(SearchResponse {
                query: query_str.to_string(),
                total_hits: 0,
                elapsed_ms: start.elapsed().as_secs_f64() * 1000.0,
                hits: vec![],
            });
        }

        let combined = BooleanQuery::new(sub_queries);
        let searcher = self.reader.searcher();
        let (total_hits, top_docs) =
            searcher.search(&combined, &(Count, TopDocs::with_limit(limit)))?;

        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, addr) in top_docs {
            let doc: TantivyDocument = searcher.doc(addr)?;
            let text = |field| {
                doc.get_first(field)
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
            };
            hits.push(CommitHit {
                hash: text(self.hash_field).unwrap_or_default(),
                message: text(self.message_field).unwrap_or_default(),
                summary: text(self.summary_field),
                classification: text(self.classification_field),
                author: text(self.author_field).unwrap_or_default(),
                timestamp: doc
                    .get_first(self.timestamp_field)
                    .and_then(|v| v.as_i64())
                    .unwrap_or(0),
                score,
            });
        }

        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        debug!(query = query_str, total_hits, elapsed_ms, "search completed");

        Ok(SearchResponse {
            query: query_str.to_string(),
            total_hits,
            elapsed_ms,
            hits,
        })
    }
}
