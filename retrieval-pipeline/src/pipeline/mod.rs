mod config;
mod strategies;

pub use config::{RetrievalConfig, SearchStrategy, FALLBACK_SUFFIX};
pub use strategies::classify_semantic_error;

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use common::{error::AppError, storage::search::SearchService, utils::embedding::EmbeddingClient};
use tracing::{error, info};

use crate::{fields::FieldDiscovery, rewrite::QueryRewriter, scoring, SearchStrategyOutcome};

use strategies::{run_strategy, StrategyContext};

/// Runs query strategies against one index and normalizes their scores.
pub struct QueryPipeline {
    search: Arc<dyn SearchService>,
    embeddings: EmbeddingClient,
    rewriter: QueryRewriter,
    config: RetrievalConfig,
}

impl QueryPipeline {
    pub fn new(
        search: Arc<dyn SearchService>,
        embeddings: EmbeddingClient,
        rewriter: QueryRewriter,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            search,
            embeddings,
            rewriter,
            config,
        }
    }

    pub async fn discover_fields(&self) -> FieldDiscovery {
        FieldDiscovery::discover(self.search.as_ref()).await
    }

    /// Runs a single strategy and normalizes its result set.
    pub async fn run(
        &self,
        strategy: SearchStrategy,
        query: &str,
        select: &[String],
    ) -> Result<SearchStrategyOutcome, AppError> {
        let ctx = StrategyContext {
            search: self.search.as_ref(),
            embeddings: &self.embeddings,
            rewriter: &self.rewriter,
            config: &self.config,
        };

        let mut outcome = run_strategy(strategy, &ctx, query, select).await?;
        scoring::normalize(&mut outcome.results);
        Ok(outcome)
    }

    /// Runs `strategies` one after another. A failing strategy is logged and
    /// contributes no outcome; the remaining strategies still run.
    #[tracing::instrument(skip_all, fields(query = %query, strategy_count = strategies.len()))]
    pub async fn run_all(
        &self,
        query: &str,
        strategies: &[SearchStrategy],
        select: &[String],
    ) -> Vec<SearchStrategyOutcome> {
        let mut outcomes = Vec::with_capacity(strategies.len());
        let batch_started = Instant::now();

        for &strategy in strategies {
            let started = Instant::now();
            info!(strategy = %strategy, label = strategy.label(), "running strategy");

            match self.run(strategy, query, select).await {
                Ok(outcome) => {
                    info!(
                        strategy = %strategy,
                        label = %outcome.label,
                        result_count = outcome.results.len(),
                        elapsed_ms = Self::duration_millis(started.elapsed()),
                        "strategy completed"
                    );
                    outcomes.push(outcome);
                }
                Err(err) => {
                    error!(
                        strategy = %strategy,
                        label = strategy.label(),
                        error = %err,
                        "strategy failed"
                    );
                }
            }
        }

        info!(
            completed = outcomes.len(),
            failed = strategies.len().saturating_sub(outcomes.len()),
            total_ms = Self::duration_millis(batch_started.elapsed()),
            "query batch finished"
        );

        outcomes
    }

    fn duration_millis(duration: Duration) -> u64 {
        u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
    }
}

#[cfg(test)]
mod tests;
