use common::{
    error::{AppError, TransportError},
    storage::search::{SearchRequest, SearchService, VectorQuery},
    utils::embedding::EmbeddingClient,
};
use tracing::{info, warn};

use super::config::{RetrievalConfig, SearchStrategy};
use crate::{rewrite::QueryRewriter, QueryResult, SearchStrategyOutcome};

const SEMANTIC_CONFIGURATION_MARKER: &str = "semantic configuration";

/// Collaborators borrowed for a single strategy run.
pub struct StrategyContext<'a> {
    pub search: &'a dyn SearchService,
    pub embeddings: &'a EmbeddingClient,
    pub rewriter: &'a QueryRewriter,
    pub config: &'a RetrievalConfig,
}

/// Runs one strategy; results are in service order and not yet normalized.
pub async fn run_strategy(
    strategy: SearchStrategy,
    ctx: &StrategyContext<'_>,
    query: &str,
    select: &[String],
) -> Result<SearchStrategyOutcome, AppError> {
    match strategy {
        SearchStrategy::Keyword => {
            let results = keyword(ctx, query, select).await?;
            Ok(outcome(strategy, query, None, false, results))
        }
        SearchStrategy::Vector => {
            let embedding = ctx.embeddings.embed(query).await?;
            let request = SearchRequest::vector(vector_query(ctx, embedding), ctx.config.top)
                .with_select(select);
            let results = execute(ctx, &request).await?;
            Ok(outcome(strategy, query, None, false, results))
        }
        SearchStrategy::Hybrid => {
            let embedding = ctx.embeddings.embed(query).await?;
            let request = SearchRequest::text(query, ctx.config.top)
                .with_vector(vector_query(ctx, embedding))
                .with_select(select);
            let results = execute(ctx, &request).await?;
            Ok(outcome(strategy, query, None, false, results))
        }
        SearchStrategy::Semantic => semantic_with_fallback(strategy, ctx, query, None, select).await,
        SearchStrategy::SemanticRewrite => {
            let rewritten = ctx.rewriter.rewrite(query).await;
            semantic_with_fallback(strategy, ctx, &rewritten, Some(query), select).await
        }
    }
}

async fn semantic_with_fallback(
    strategy: SearchStrategy,
    ctx: &StrategyContext<'_>,
    query: &str,
    original_query: Option<&str>,
    select: &[String],
) -> Result<SearchStrategyOutcome, AppError> {
    match semantic(ctx, query, select).await {
        Ok(results) => Ok(outcome(strategy, query, original_query, false, results)),
        Err(AppError::SemanticUnavailable(configuration)) => {
            warn!(
                strategy = %strategy,
                %configuration,
                "semantic configuration missing on index; falling back to keyword search"
            );
            let results = keyword(ctx, query, select).await?;
            Ok(outcome(strategy, query, original_query, true, results))
        }
        Err(err) => Err(err),
    }
}

async fn keyword(
    ctx: &StrategyContext<'_>,
    query: &str,
    select: &[String],
) -> Result<Vec<QueryResult>, AppError> {
    let request = SearchRequest::text(query, ctx.config.top).with_select(select);
    execute(ctx, &request).await
}

async fn semantic(
    ctx: &StrategyContext<'_>,
    query: &str,
    select: &[String],
) -> Result<Vec<QueryResult>, AppError> {
    let configuration = ctx.config.semantic_configuration.as_str();
    let request = SearchRequest::text(query, ctx.config.top)
        .with_select(select)
        .with_semantic(configuration);

    let response = ctx
        .search
        .search(&request)
        .await
        .map_err(|err| classify_semantic_error(err, configuration))?;

    Ok(response.value.into_iter().map(QueryResult::from).collect())
}

/// A 400 naming the semantic configuration means the index has none by that name.
pub fn classify_semantic_error(err: TransportError, configuration: &str) -> AppError {
    let missing_configuration = err.is_bad_request()
        && err.body().is_some_and(|body| {
            body.to_ascii_lowercase()
                .contains(SEMANTIC_CONFIGURATION_MARKER)
        });

    if missing_configuration {
        AppError::SemanticUnavailable(configuration.to_string())
    } else {
        AppError::Transport(err)
    }
}

async fn execute(
    ctx: &StrategyContext<'_>,
    request: &SearchRequest,
) -> Result<Vec<QueryResult>, AppError> {
    let response = ctx.search.search(request).await?;
    Ok(response.value.into_iter().map(QueryResult::from).collect())
}

fn vector_query(ctx: &StrategyContext<'_>, embedding: Vec<f32>) -> VectorQuery {
    VectorQuery::new(embedding, ctx.config.k_nearest, &ctx.config.vector_field)
}

fn outcome(
    strategy: SearchStrategy,
    query: &str,
    original_query: Option<&str>,
    fallback: bool,
    results: Vec<QueryResult>,
) -> SearchStrategyOutcome {
    let label = if fallback {
        strategy.fallback_label()
    } else {
        strategy.label().to_string()
    };
    info!(strategy = %strategy, fallback, result_count = results.len(), "strategy finished");

    SearchStrategyOutcome {
        strategy,
        label,
        query_text: query.to_string(),
        original_query: original_query.map(ToString::to_string),
        fallback,
        results,
    }
}
