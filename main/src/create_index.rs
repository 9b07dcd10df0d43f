use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use common::{
    storage::{
        schema::{load_fields, IndexDefinition},
        search::{AzureSearchClient, SearchService},
    },
    utils::config::get_config,
};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Create or update the search index from a field definition file.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Field definition file (defaults to FIELDS_PATH)
    #[arg(long)]
    fields: Option<PathBuf>,
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
    let settings = config.search_settings()?;

    let fields_path = args.fields.unwrap_or_else(|| config.fields_path());
    let fields = load_fields(&fields_path)
        .with_context(|| format!("failed to load fields from {}", fields_path.display()))?;
    let index = IndexDefinition::new(&settings.index_name, fields);

    let missing = index.missing_record_fields();
    if !missing.is_empty() {
        warn!(
            missing = %missing.join(", "),
            "index does not declare every field the ingest binary writes"
        );
    }

    let client = AzureSearchClient::new(&settings)?;
    client
        .create_or_update_index(&index)
        .await
        .with_context(|| format!("failed to create or update index '{}'", index.name))?;

    info!(
        index = %index.name,
        field_count = index.fields.len(),
        "index created or updated"
    );
    Ok(())
}
