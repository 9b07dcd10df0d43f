use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::Parser;
use common::{
    storage::search::AzureSearchClient,
    utils::{
        chat::AzureOpenAiChat,
        config::get_config,
        embedding::{azure_openai_client, AzureOpenAiEmbedder, EmbeddingClient},
        retry::RetryPolicy,
    },
};
use retrieval_pipeline::{
    fields::DESIRED_FIELDS,
    report::{publish, ConsoleReportSink, MarkdownReportSink, ReportRecord, ReportSink},
    rewrite::QueryRewriter,
    QueryPipeline, RetrievalConfig, SearchStrategy,
};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Run the query strategies against the index and report normalized results.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Query text
    #[arg(default_value = "What do primary care managers do?")]
    query: String,

    /// Strategy to run; repeat to run several in order (defaults to all five)
    #[arg(long = "strategy", value_enum)]
    strategies: Vec<SearchStrategy>,

    /// Directory for Markdown reports (defaults to REPORT_DIR)
    #[arg(long)]
    report_dir: Option<PathBuf>,

    /// Only print results to the console
    #[arg(long)]
    no_markdown: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init()
        .ok();

    let args = Args::parse();
    let config = get_config().context("failed to load configuration")?;
    let search_settings = config.search_settings()?;
    let openai = config.openai_settings()?;
    let embeddings_deployment = config.embeddings_deployment()?;
    let chat_deployment = config.chat_deployment()?;

    let embedder = AzureOpenAiEmbedder::new(
        Arc::new(azure_openai_client(&openai, embeddings_deployment)),
        embeddings_deployment,
    );
    let chat = AzureOpenAiChat::new(
        Arc::new(azure_openai_client(&openai, chat_deployment)),
        chat_deployment,
    );

    let pipeline = QueryPipeline::new(
        Arc::new(AzureSearchClient::new(&search_settings)?),
        EmbeddingClient::new(Arc::new(embedder), RetryPolicy::resilient()),
        QueryRewriter::new(Arc::new(chat), RetryPolicy::resilient()),
        RetrievalConfig::new(&config.vector_field_name, &config.semantic_config_name),
    );

    let mut sinks: Vec<Box<dyn ReportSink>> = vec![Box::new(ConsoleReportSink)];
    if !args.no_markdown {
        let report_dir = args.report_dir.unwrap_or_else(|| config.report_dir());
        sinks.push(Box::new(MarkdownReportSink::new(report_dir)?));
    }

    let select = pipeline
        .discover_fields()
        .await
        .safe_select_fields(&DESIRED_FIELDS);

    let strategies = if args.strategies.is_empty() {
        SearchStrategy::ALL.to_vec()
    } else {
        args.strategies
    };

    let outcomes = pipeline.run_all(&args.query, &strategies, &select).await;
    for outcome in &outcomes {
        publish(&ReportRecord::from_outcome(outcome), &sinks).await;
    }

    info!(
        requested = strategies.len(),
        reported = outcomes.len(),
        "query run finished"
    );
    Ok(())
}
