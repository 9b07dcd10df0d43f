use common::storage::search::{SearchRequest, SearchService};
use tracing::{info, warn};

/// Used when the index cannot be queried or holds no documents.
pub const DEFAULT_FIELDS: [&str; 3] = ["id", "content", "title"];

/// Fields the query batch asks for, in report order.
pub const DESIRED_FIELDS: [&str; 10] = [
    "ChunkSequence",
    "chunk_id",
    "id",
    "ChunkText",
    "ChunkVector",
    "chunk",
    "content",
    "DocumentTitle",
    "title",
    "URL",
];

/// Field names known to exist on the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDiscovery {
    available: Vec<String>,
}

impl FieldDiscovery {
    /// An empty set falls back to [`DEFAULT_FIELDS`].
    pub fn new(available: Vec<String>) -> Self {
        if available.is_empty() {
            return Self::defaults();
        }
        Self { available }
    }

    pub fn defaults() -> Self {
        Self {
            available: DEFAULT_FIELDS.iter().map(ToString::to_string).collect(),
        }
    }

    /// Queries the index for a single wildcard hit and records its field names.
    pub async fn discover(search: &dyn SearchService) -> Self {
        match search.search(&SearchRequest::text("*", 1)).await {
            Ok(response) => match response.value.first() {
                Some(hit) => {
                    let available: Vec<String> = hit.fields().map(|(name, _)| name.clone()).collect();
                    info!(fields = %available.join(", "), "available fields in index");
                    Self::new(available)
                }
                None => {
                    warn!("no documents found in index to determine available fields");
                    Self::defaults()
                }
            },
            Err(err) => {
                warn!(error = %err, "field discovery failed; using default fields");
                Self::defaults()
            }
        }
    }

    pub fn available(&self) -> &[String] {
        &self.available
    }

    /// The desired fields that exist, in desired order; all known fields if none do.
    pub fn safe_select_fields(&self, desired: &[&str]) -> Vec<String> {
        let valid: Vec<String> = desired
            .iter()
            .filter(|field| self.available.iter().any(|known| known == *field))
            .map(ToString::to_string)
            .collect();

        if valid.is_empty() {
            warn!(
                requested = %desired.join(", "),
                "none of the requested fields exist in the index; using all available fields"
            );
            return self.available.clone();
        }

        info!(fields = %valid.join(", "), "using fields");
        valid
    }
}

#[cfg(test)]
mod tests {
    use common::test_utils::{hit, server_error, MockSearchService};
    use common::storage::search::SearchResponse;

    use super::*;

    fn names(fields: &[String]) -> Vec<&str> {
        fields.iter().map(String::as_str).collect()
    }

    #[tokio::test]
    async fn discovery_reads_field_names_from_one_hit() {
        let search = MockSearchService::with_hits(vec![hit(
            1.0,
            &[("ChunkText", "a"), ("URL", "b.docx")],
        )]);

        let discovery = FieldDiscovery::discover(&search).await;

        let mut available = names(discovery.available());
        available.sort_unstable();
        assert_eq!(available, vec!["ChunkText", "URL"]);

        let request = &search.search_requests()[0];
        assert_eq!(request.search.as_deref(), Some("*"));
        assert_eq!(request.top, 1);
        assert!(request.select.is_empty());
    }

    #[tokio::test]
    async fn empty_index_falls_back_to_defaults() {
        let search = MockSearchService::new(|_| Ok(SearchResponse::default()));
        let discovery = FieldDiscovery::discover(&search).await;
        assert_eq!(names(discovery.available()), vec!["id", "content", "title"]);
    }

    #[tokio::test]
    async fn failed_discovery_falls_back_to_defaults() {
        let search = MockSearchService::new(|_| Err(server_error("index unavailable")));
        let discovery = FieldDiscovery::discover(&search).await;
        assert_eq!(discovery, FieldDiscovery::defaults());
    }

    #[test]
    fn safe_select_keeps_desired_order() {
        let discovery = FieldDiscovery::new(vec![
            "URL".into(),
            "ChunkText".into(),
            "ChunkSequence".into(),
            "Extra".into(),
        ]);
        let selected = discovery.safe_select_fields(&DESIRED_FIELDS);
        assert_eq!(names(&selected), vec!["ChunkSequence", "ChunkText", "URL"]);
    }

    #[test]
    fn empty_discovery_never_selects_nothing() {
        let discovery = FieldDiscovery::new(Vec::new());
        let selected = discovery.safe_select_fields(&["a", "b"]);
        assert_eq!(names(&selected), vec!["id", "content", "title"]);
    }

    #[test]
    fn no_overlap_selects_every_known_field() {
        let discovery = FieldDiscovery::new(vec!["x".into(), "y".into()]);
        let selected = discovery.safe_select_fields(&["a", "b"]);
        assert_eq!(names(&selected), vec!["x", "y"]);
        assert!(!selected.iter().any(|f| f.starts_with('@')));
    }
}
