mod config;
mod context;
mod services;
mod stages;
mod state;

pub use config::{IngestionConfig, IngestionTuning};
#[allow(clippy::module_name_repetitions)]
pub use services::{DefaultPipelineServices, PipelineServices};

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use common::{
    error::AppError,
    storage::{search::SearchService, types::document::Document},
    utils::embedding::EmbeddingClient,
};
use tracing::info;

use crate::documents::DocumentSource;

use self::{
    context::PipelineContext,
    stages::{embed_chunks, prepare_chunks, upload_records},
    state::ready,
};

#[allow(clippy::module_name_repetitions)]
pub struct IngestionPipeline {
    pipeline_config: IngestionConfig,
    services: Arc<dyn PipelineServices>,
}

impl IngestionPipeline {
    pub fn new(
        search: Arc<dyn SearchService>,
        embeddings: EmbeddingClient,
        pipeline_config: IngestionConfig,
    ) -> Self {
        let services = DefaultPipelineServices::new(search, embeddings);
        Self::with_services(pipeline_config, Arc::new(services))
    }

    pub fn with_services(
        pipeline_config: IngestionConfig,
        services: Arc<dyn PipelineServices>,
    ) -> Self {
        Self {
            pipeline_config,
            services,
        }
    }

    /// Loads every document from `source` and ingests them as one run.
    pub async fn ingest_from(&self, source: &dyn DocumentSource) -> Result<usize, AppError> {
        let documents = source.load().await?;
        self.ingest(documents).await
    }

    /// Chunks, embeds and uploads `documents`, returning the number of records uploaded.
    ///
    /// Any embedding failure aborts the run before anything is uploaded, unless
    /// `skip_failed_embeddings` is set. An empty record set skips the upload.
    #[tracing::instrument(skip_all, fields(document_count = documents.len()))]
    pub async fn ingest(&self, documents: Vec<Document>) -> Result<usize, AppError> {
        let mut ctx = PipelineContext::new(
            documents,
            &self.pipeline_config,
            self.services.as_ref(),
        );

        let machine = ready();
        let pipeline_started = Instant::now();

        let stage_start = Instant::now();
        let machine = prepare_chunks(machine, &mut ctx)?;
        let prepare_duration = stage_start.elapsed();

        let stage_start = Instant::now();
        let machine = embed_chunks(machine, &mut ctx).await?;
        let embed_duration = stage_start.elapsed();

        let stage_start = Instant::now();
        let _machine = upload_records(machine, &mut ctx).await?;
        let upload_duration = stage_start.elapsed();

        info!(
            run_id = %ctx.run_id,
            uploaded = ctx.uploaded,
            skipped_chunks = ctx.skipped_chunks,
            total_ms = Self::duration_millis(pipeline_started.elapsed()),
            prepare_ms = Self::duration_millis(prepare_duration),
            embed_ms = Self::duration_millis(embed_duration),
            upload_ms = Self::duration_millis(upload_duration),
            "ingestion pipeline finished"
        );

        Ok(ctx.uploaded)
    }

    fn duration_millis(duration: Duration) -> u64 {
        u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
    }
}
