use chrono::{DateTime, Utc};
use common::{
    error::AppError,
    storage::types::{
        document::{Chunk, Document},
        index_record::IndexRecord,
    },
};
use tracing::error;
use uuid::Uuid;

use super::{config::IngestionConfig, services::PipelineServices};

/// A chunk waiting for its embedding, with the title of the document it came from.
#[derive(Debug, Clone)]
pub struct PendingChunk {
    pub chunk: Chunk,
    pub document_title: String,
}

pub struct PipelineContext<'a> {
    pub run_id: String,
    pub pipeline_config: &'a IngestionConfig,
    pub services: &'a dyn PipelineServices,
    pub processed_at: DateTime<Utc>,
    pub documents: Vec<Document>,
    pub pending: Vec<PendingChunk>,
    pub records: Vec<IndexRecord>,
    pub skipped_chunks: usize,
    pub uploaded: usize,
    /// Stage whose failure moved the run to `Failed`.
    pub failed_stage: Option<&'static str>,
}

impl<'a> PipelineContext<'a> {
    pub fn new(
        documents: Vec<Document>,
        pipeline_config: &'a IngestionConfig,
        services: &'a dyn PipelineServices,
    ) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            pipeline_config,
            services,
            processed_at: Utc::now(),
            documents,
            pending: Vec::new(),
            records: Vec::new(),
            skipped_chunks: 0,
            uploaded: 0,
            failed_stage: None,
        }
    }

    pub fn abort(&mut self, stage: &'static str, err: AppError) -> AppError {
        self.failed_stage = Some(stage);
        error!(
            run_id = %self.run_id,
            stage,
            pending_chunks = self.pending.len(),
            records = self.records.len(),
            error = %err,
            "ingestion pipeline aborted"
        );
        err
    }
}
