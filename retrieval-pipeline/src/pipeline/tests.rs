use std::sync::Arc;

use common::{
    error::{AppError, TransportError},
    storage::search::{QueryType, SearchRequest, SearchResponse},
    test_utils::{bad_request, hit, server_error, MockSearchService, ScriptedChat, StaticEmbedder},
    utils::{embedding::EmbeddingClient, retry::RetryPolicy},
};

use super::{classify_semantic_error, QueryPipeline, RetrievalConfig, SearchStrategy};
use crate::{fields::DESIRED_FIELDS, rewrite::QueryRewriter};

const QUERY: &str = "What do primary care managers do?";
const MISSING_SEMANTIC: &str =
    "Semantic search is not enabled: no semantic configurations are defined for this index.";

fn default_hits() -> Vec<common::storage::search::SearchHit> {
    vec![
        hit(4.0, &[("ChunkText", "managers coordinate care"), ("URL", "a.docx")]),
        hit(2.0, &[("ChunkText", "appointments"), ("URL", "b.docx")]),
        hit(3.0, &[("ChunkText", "referrals"), ("URL", "c.docx")]),
    ]
}

fn pipeline(
    search: Arc<MockSearchService>,
    embedder: Arc<StaticEmbedder>,
    chat: Arc<ScriptedChat>,
) -> QueryPipeline {
    QueryPipeline::new(
        search,
        EmbeddingClient::new(embedder, RetryPolicy::resilient()),
        QueryRewriter::new(chat, RetryPolicy::resilient()),
        RetrievalConfig::default(),
    )
}

fn select() -> Vec<String> {
    vec!["ChunkText".into(), "URL".into()]
}

fn is_semantic(request: &SearchRequest) -> bool {
    request.query_type == Some(QueryType::Semantic)
}

#[tokio::test]
async fn keyword_search_requests_five_selected_results() {
    let search = Arc::new(MockSearchService::with_hits(default_hits()));
    let embedder = Arc::new(StaticEmbedder::new(vec![0.1; 4]));
    let pipeline = pipeline(search.clone(), embedder.clone(), Arc::new(ScriptedChat::failing()));

    let outcome = pipeline
        .run(SearchStrategy::Keyword, QUERY, &select())
        .await
        .expect("keyword");

    assert_eq!(outcome.label, "Keyword Search");
    assert!(!outcome.fallback);
    assert_eq!(outcome.results.len(), 3);
    assert_eq!(embedder.call_count(), 0);

    let request = &search.search_requests()[0];
    assert_eq!(request.search.as_deref(), Some(QUERY));
    assert_eq!(request.top, 5);
    assert_eq!(request.select, select());
    assert!(request.vector_queries.is_empty());
}

#[tokio::test]
async fn results_are_normalized_in_service_order() {
    let search = Arc::new(MockSearchService::with_hits(default_hits()));
    let pipeline = pipeline(
        search,
        Arc::new(StaticEmbedder::new(vec![0.1; 4])),
        Arc::new(ScriptedChat::failing()),
    );

    let outcome = pipeline
        .run(SearchStrategy::Keyword, QUERY, &select())
        .await
        .expect("keyword");

    let normalized: Vec<f64> = outcome
        .results
        .iter()
        .map(|r| r.normalized_score.unwrap_or(f64::NAN))
        .collect();
    assert_eq!(normalized, vec![1.0, 0.0, 0.5]);
    assert_eq!(outcome.results[0].original_score, Some(4.0));
}

#[tokio::test]
async fn vector_search_embeds_the_query() {
    let search = Arc::new(MockSearchService::with_hits(default_hits()));
    let embedder = Arc::new(StaticEmbedder::new(vec![0.25; 4]));
    let pipeline = pipeline(search.clone(), embedder.clone(), Arc::new(ScriptedChat::failing()));

    let outcome = pipeline
        .run(SearchStrategy::Vector, QUERY, &select())
        .await
        .expect("vector");

    assert_eq!(outcome.label, "Vector Search");
    assert_eq!(embedder.call_count(), 1);
    let request = &search.search_requests()[0];
    assert!(request.search.is_none());
    let vector = &request.vector_queries[0];
    assert_eq!(vector.k, 5);
    assert_eq!(vector.fields, "ChunkVector");
    assert_eq!(vector.vector, vec![0.25; 4]);
}

#[tokio::test]
async fn hybrid_search_sends_text_and_vector_together() {
    let search = Arc::new(MockSearchService::with_hits(default_hits()));
    let pipeline = pipeline(
        search.clone(),
        Arc::new(StaticEmbedder::new(vec![0.5; 4])),
        Arc::new(ScriptedChat::failing()),
    );

    let outcome = pipeline
        .run(SearchStrategy::Hybrid, QUERY, &select())
        .await
        .expect("hybrid");

    assert_eq!(outcome.label, "Hybrid Search (Keyword + Vector)");
    let requests = search.search_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].search.as_deref(), Some(QUERY));
    assert_eq!(requests[0].vector_queries.len(), 1);
}

#[tokio::test]
async fn semantic_search_names_its_configuration() {
    let search = Arc::new(MockSearchService::with_hits(default_hits()));
    let pipeline = pipeline(
        search.clone(),
        Arc::new(StaticEmbedder::new(vec![0.5; 4])),
        Arc::new(ScriptedChat::failing()),
    );

    let outcome = pipeline
        .run(SearchStrategy::Semantic, QUERY, &select())
        .await
        .expect("semantic");

    assert_eq!(outcome.label, "Hybrid Search + Semantic Ranker");
    let request = &search.search_requests()[0];
    assert!(is_semantic(request));
    assert_eq!(
        request.semantic_configuration.as_deref(),
        Some("default-semantic-config")
    );
}

#[tokio::test]
async fn missing_semantic_configuration_falls_back_to_keyword() {
    let search = Arc::new(MockSearchService::new(|request| {
        if request.query_type == Some(QueryType::Semantic) {
            Err(bad_request(MISSING_SEMANTIC))
        } else {
            Ok(SearchResponse {
                value: vec![hit(1.5, &[("ChunkText", "fallback hit")])],
            })
        }
    }));
    let pipeline = pipeline(
        search.clone(),
        Arc::new(StaticEmbedder::new(vec![0.5; 4])),
        Arc::new(ScriptedChat::failing()),
    );

    let outcome = pipeline
        .run(SearchStrategy::Semantic, QUERY, &select())
        .await
        .expect("fallback");

    assert!(outcome.fallback);
    assert_eq!(
        outcome.label,
        "Hybrid Search + Semantic Ranker (Fallback to Standard)"
    );
    assert_eq!(outcome.results.len(), 1);

    let requests = search.search_requests();
    assert_eq!(requests.len(), 2);
    assert!(is_semantic(&requests[0]));
    assert!(!is_semantic(&requests[1]));
    assert_eq!(requests[1].search.as_deref(), Some(QUERY));
}

#[tokio::test]
async fn rewrite_strategy_searches_with_the_rewritten_query() {
    let search = Arc::new(MockSearchService::with_hits(default_hits()));
    let chat = Arc::new(ScriptedChat::replying("primary care manager responsibilities"));
    let pipeline = pipeline(
        search.clone(),
        Arc::new(StaticEmbedder::new(vec![0.5; 4])),
        chat.clone(),
    );

    let outcome = pipeline
        .run(SearchStrategy::SemanticRewrite, QUERY, &select())
        .await
        .expect("rewrite");

    assert_eq!(
        outcome.label,
        "Hybrid Search + Semantic Ranker + Query Rewriting"
    );
    assert_eq!(outcome.query_text, "primary care manager responsibilities");
    assert_eq!(outcome.original_query.as_deref(), Some(QUERY));
    assert_eq!(chat.call_count(), 1);
    let request = &search.search_requests()[0];
    assert_eq!(
        request.search.as_deref(),
        Some("primary care manager responsibilities")
    );
    assert!(is_semantic(request));
}

#[tokio::test]
async fn rewrite_fallback_keeps_the_rewritten_query() {
    let search = Arc::new(MockSearchService::new(|request| {
        if request.query_type == Some(QueryType::Semantic) {
            Err(bad_request(MISSING_SEMANTIC))
        } else {
            Ok(SearchResponse::default())
        }
    }));
    let pipeline = pipeline(
        search.clone(),
        Arc::new(StaticEmbedder::new(vec![0.5; 4])),
        Arc::new(ScriptedChat::replying("rewritten text")),
    );

    let outcome = pipeline
        .run(SearchStrategy::SemanticRewrite, QUERY, &select())
        .await
        .expect("fallback");

    assert!(outcome.fallback);
    assert_eq!(
        outcome.label,
        "Hybrid Search + Semantic Ranker + Query Rewriting (Fallback to Standard)"
    );
    assert_eq!(
        search.search_requests()[1].search.as_deref(),
        Some("rewritten text")
    );
    assert!(outcome.display_query().contains("Rewritten: 'rewritten text'"));
}

#[tokio::test(start_paused = true)]
async fn failed_rewrite_searches_with_the_original_query() {
    let search = Arc::new(MockSearchService::with_hits(default_hits()));
    let pipeline = pipeline(
        search.clone(),
        Arc::new(StaticEmbedder::new(vec![0.5; 4])),
        Arc::new(ScriptedChat::failing()),
    );

    let outcome = pipeline
        .run(SearchStrategy::SemanticRewrite, QUERY, &select())
        .await
        .expect("rewrite");

    assert_eq!(outcome.query_text, QUERY);
    assert_eq!(search.search_requests()[0].search.as_deref(), Some(QUERY));
}

#[test]
fn only_bad_requests_about_semantic_configuration_are_classified() {
    assert!(matches!(
        classify_semantic_error(bad_request(MISSING_SEMANTIC), "cfg"),
        AppError::SemanticUnavailable(name) if name == "cfg"
    ));
    assert!(matches!(
        classify_semantic_error(bad_request("Invalid expression in $select"), "cfg"),
        AppError::Transport(_)
    ));
    assert!(matches!(
        classify_semantic_error(server_error("semantic configuration"), "cfg"),
        AppError::Transport(_)
    ));
    assert!(matches!(
        classify_semantic_error(TransportError::Decode("bad".into()), "cfg"),
        AppError::Transport(_)
    ));
}

#[tokio::test]
async fn a_failing_strategy_does_not_stop_the_batch() {
    let search = Arc::new(MockSearchService::new(|request| {
        if request.vector_queries.is_empty() || request.search.is_some() {
            Ok(SearchResponse {
                value: vec![hit(1.0, &[("ChunkText", "hit")])],
            })
        } else {
            Err(server_error("vector index offline"))
        }
    }));
    let pipeline = pipeline(
        search,
        Arc::new(StaticEmbedder::new(vec![0.5; 4])),
        Arc::new(ScriptedChat::replying("rewritten")),
    );

    let outcomes = pipeline
        .run_all(QUERY, &SearchStrategy::ALL, &select())
        .await;

    let strategies: Vec<SearchStrategy> = outcomes.iter().map(|o| o.strategy).collect();
    assert_eq!(
        strategies,
        vec![
            SearchStrategy::Keyword,
            SearchStrategy::Hybrid,
            SearchStrategy::Semantic,
            SearchStrategy::SemanticRewrite,
        ]
    );
}

#[tokio::test]
async fn discovered_fields_drive_the_selection() {
    let search = Arc::new(MockSearchService::with_hits(vec![hit(
        1.0,
        &[("ChunkText", "x"), ("DocumentTitle", "t"), ("ChunkSequence", "0")],
    )]));
    let pipeline = pipeline(
        search,
        Arc::new(StaticEmbedder::new(vec![0.5; 4])),
        Arc::new(ScriptedChat::failing()),
    );

    let selected = pipeline
        .discover_fields()
        .await
        .safe_select_fields(&DESIRED_FIELDS);

    assert_eq!(selected, vec!["ChunkSequence", "ChunkText", "DocumentTitle"]);
}
