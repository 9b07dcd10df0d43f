use serde::{Deserialize, Serialize};
use std::fmt;

pub const FALLBACK_SUFFIX: &str = " (Fallback to Standard)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum SearchStrategy {
    /// Lexical match over the searchable text fields
    Keyword,
    /// Nearest neighbours of the query embedding
    Vector,
    /// Lexical query and vector query in one call, fused by the service
    Hybrid,
    /// Service-side semantic reranking under a named configuration
    Semantic,
    /// Semantic reranking of a chat-rewritten query
    SemanticRewrite,
}

impl SearchStrategy {
    /// Every strategy, in the order a batch runs them.
    pub const ALL: [Self; 5] = [
        Self::Keyword,
        Self::Vector,
        Self::Hybrid,
        Self::Semantic,
        Self::SemanticRewrite,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            Self::Keyword => "Keyword Search",
            Self::Vector => "Vector Search",
            Self::Hybrid => "Hybrid Search (Keyword + Vector)",
            Self::Semantic => "Hybrid Search + Semantic Ranker",
            Self::SemanticRewrite => "Hybrid Search + Semantic Ranker + Query Rewriting",
        }
    }

    pub fn fallback_label(self) -> String {
        format!("{}{FALLBACK_SUFFIX}", self.label())
    }

    pub const fn uses_semantic_ranker(self) -> bool {
        matches!(self, Self::Semantic | Self::SemanticRewrite)
    }
}

impl std::str::FromStr for SearchStrategy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().replace('-', "_").as_str() {
            "keyword" => Ok(Self::Keyword),
            "vector" => Ok(Self::Vector),
            "hybrid" => Ok(Self::Hybrid),
            "semantic" => Ok(Self::Semantic),
            "semantic_rewrite" => Ok(Self::SemanticRewrite),
            other => Err(format!("unknown search strategy '{other}'")),
        }
    }
}

impl fmt::Display for SearchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SearchStrategy::Keyword => "keyword",
            SearchStrategy::Vector => "vector",
            SearchStrategy::Hybrid => "hybrid",
            SearchStrategy::Semantic => "semantic",
            SearchStrategy::SemanticRewrite => "semantic_rewrite",
        };
        f.write_str(name)
    }
}

/// Request shape shared by every strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    pub top: usize,
    pub k_nearest: usize,
    pub vector_field: String,
    pub semantic_configuration: String,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top: 5,
            k_nearest: 5,
            vector_field: "ChunkVector".to_string(),
            semantic_configuration: "default-semantic-config".to_string(),
        }
    }
}

impl RetrievalConfig {
    pub fn new(vector_field: &str, semantic_configuration: &str) -> Self {
        Self {
            vector_field: vector_field.to_string(),
            semantic_configuration: semantic_configuration.to_string(),
            ..Self::default()
        }
    }
}
