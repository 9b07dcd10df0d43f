#![allow(clippy::missing_docs_in_private_items)]

pub mod fields;
pub mod pipeline;
pub mod report;
pub mod rewrite;
pub mod scoring;

use common::storage::search::SearchHit;
use serde::Serialize;
use serde_json::{Map, Value};

pub use pipeline::{QueryPipeline, RetrievalConfig, SearchStrategy};

// One ranked hit; fields exclude the service's `@search.*` annotations.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    pub fields: Map<String, Value>,
    pub raw_score: f64,
    pub normalized_score: Option<f64>,
    pub original_score: Option<f64>,
}

impl QueryResult {
    pub fn new(fields: Map<String, Value>, raw_score: f64) -> Self {
        Self {
            fields,
            raw_score,
            normalized_score: None,
            original_score: None,
        }
    }

    /// Display text of a field: strings as-is, other JSON values rendered compactly.
    pub fn field_text(&self, name: &str) -> Option<String> {
        self.fields.get(name).map(|value| match value {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        })
    }

    pub fn score(&self) -> f64 {
        self.normalized_score.unwrap_or(self.raw_score)
    }
}

impl From<SearchHit> for QueryResult {
    fn from(hit: SearchHit) -> Self {
        let fields = hit
            .fields()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        Self::new(fields, hit.score)
    }
}

/// Results of one strategy run, in the order the service ranked them.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchStrategyOutcome {
    pub strategy: SearchStrategy,
    pub label: String,
    /// The text actually sent to the service.
    pub query_text: String,
    /// Set when the query was rewritten before searching.
    pub original_query: Option<String>,
    pub fallback: bool,
    pub results: Vec<QueryResult>,
}

impl SearchStrategyOutcome {
    /// Query as shown in reports: both texts for rewritten queries.
    pub fn display_query(&self) -> String {
        match &self.original_query {
            Some(original) => format!("Original: '{original}'\nRewritten: '{}'", self.query_text),
            None => self.query_text.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use common::test_utils::hit;

    use super::*;

    #[test]
    fn hit_conversion_keeps_document_fields_and_score() {
        let mut search_hit = hit(2.5, &[("ChunkText", "body"), ("URL", "a.docx")]);
        search_hit
            .document
            .insert("@search.captions".into(), Value::Null);

        let result = QueryResult::from(search_hit);

        assert!((result.raw_score - 2.5).abs() < f64::EPSILON);
        assert_eq!(result.fields.len(), 2);
        assert_eq!(result.field_text("URL").as_deref(), Some("a.docx"));
        assert!(result.normalized_score.is_none());
    }

    #[test]
    fn non_string_fields_render_as_json() {
        let mut fields = Map::new();
        fields.insert("ChunkSequence".into(), Value::from(3));
        let result = QueryResult::new(fields, 1.0);
        assert_eq!(result.field_text("ChunkSequence").as_deref(), Some("3"));
        assert_eq!(result.field_text("missing"), None);
    }

    #[test]
    fn rewritten_queries_show_both_texts() {
        let outcome = SearchStrategyOutcome {
            strategy: SearchStrategy::SemanticRewrite,
            label: SearchStrategy::SemanticRewrite.label().to_string(),
            query_text: "primary care manager duties".into(),
            original_query: Some("What do PCMs do?".into()),
            fallback: false,
            results: Vec::new(),
        };
        assert_eq!(
            outcome.display_query(),
            "Original: 'What do PCMs do?'\nRewritten: 'primary care manager duties'"
        );
    }
}
