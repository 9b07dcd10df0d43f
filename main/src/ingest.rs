use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Context;
use clap::Parser;
use common::{
    storage::{
        schema::{load_fields, IndexDefinition},
        search::AzureSearchClient,
    },
    utils::{
        config::get_config,
        embedding::{AzureRestEmbedder, EmbeddingClient},
        retry::RetryPolicy,
    },
};
use ingestion_pipeline::{DocxDirectory, IngestionConfig, IngestionPipeline, IngestionTuning};
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Chunk, embed and upload every .docx file in a directory.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory of .docx files (defaults to DOCS_DIR)
    #[arg(long)]
    docs_dir: Option<PathBuf>,

    /// Maximum whitespace-delimited words per chunk
    #[arg(long, default_value_t = 7_000)]
    max_tokens: usize,

    /// Drop chunks whose embedding keeps failing instead of aborting the run
    #[arg(long)]
    skip_failed_embeddings: bool,

    /// Reject embeddings whose length differs from this
    /// (defaults to the vector field's dimensions in FIELDS_PATH, when that file exists)
    #[arg(long)]
    expected_dimensions: Option<usize>,
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
    let openai = config.openai_settings()?;
    let deployment = config.embeddings_deployment()?;
    let search_settings = config.search_settings()?;

    let expected_dimensions = match args.expected_dimensions {
        Some(dimensions) => Some(dimensions),
        None => schema_dimensions(
            &config.fields_path(),
            &search_settings.index_name,
            &config.vector_field_name,
        )?,
    };

    let embedder = AzureRestEmbedder::new(&openai, deployment)?;
    let mut embeddings = EmbeddingClient::new(Arc::new(embedder), RetryPolicy::rate_limited());
    if let Some(dimensions) = expected_dimensions {
        embeddings = embeddings.with_expected_dimensions(dimensions);
    }

    let search = Arc::new(AzureSearchClient::new(&search_settings)?);
    let pipeline = IngestionPipeline::new(
        search,
        embeddings,
        IngestionConfig {
            tuning: IngestionTuning {
                chunk_max_tokens: args.max_tokens,
                ..IngestionTuning::default()
            },
            skip_failed_embeddings: args.skip_failed_embeddings,
        },
    );

    let docs_dir = args.docs_dir.unwrap_or_else(|| config.docs_dir());
    let uploaded = pipeline
        .ingest_from(&DocxDirectory::new(&docs_dir))
        .await
        .with_context(|| format!("ingestion of {} failed", docs_dir.display()))?;

    info!(
        uploaded,
        index = %search_settings.index_name,
        "documents uploaded"
    );
    Ok(())
}

/// Dimensions declared for `vector_field` in the fields file, if there is one.
fn schema_dimensions(
    fields_path: &Path,
    index_name: &str,
    vector_field: &str,
) -> anyhow::Result<Option<usize>> {
    if !fields_path.exists() {
        debug!(path = %fields_path.display(), "no fields file; embedding dimensions unchecked");
        return Ok(None);
    }

    let fields = load_fields(fields_path)
        .with_context(|| format!("failed to load fields from {}", fields_path.display()))?;
    let dimensions = IndexDefinition::new(index_name, fields)
        .vector_dimensions(vector_field)
        .map(usize::try_from)
        .transpose()?;
    if let Some(dimensions) = dimensions {
        info!(vector_field, dimensions, "embedding dimensions taken from the fields file");
    }
    Ok(dimensions)
}
