use std::{collections::HashSet, sync::Arc};

use async_trait::async_trait;
use common::{
    error::AppError,
    storage::{
        search::SearchService,
        types::{index_record::IndexRecord, StoredObject},
    },
    utils::embedding::EmbeddingClient,
};
use tracing::warn;

#[async_trait]
pub trait PipelineServices: Send + Sync {
    async fn embed_chunk(&self, text: &str) -> Result<Vec<f32>, AppError>;

    /// Sends every record in one batch and returns how many the index accepted.
    async fn upload_records(&self, records: &[IndexRecord]) -> Result<usize, AppError>;
}

pub struct DefaultPipelineServices {
    search: Arc<dyn SearchService>,
    embeddings: EmbeddingClient,
}

impl DefaultPipelineServices {
    pub fn new(search: Arc<dyn SearchService>, embeddings: EmbeddingClient) -> Self {
        Self { search, embeddings }
    }
}

#[async_trait]
impl PipelineServices for DefaultPipelineServices {
    async fn embed_chunk(&self, text: &str) -> Result<Vec<f32>, AppError> {
        self.embeddings.embed(text).await
    }

    async fn upload_records(&self, records: &[IndexRecord]) -> Result<usize, AppError> {
        let mut seen = HashSet::with_capacity(records.len());
        if let Some(duplicate) = records.iter().find(|r| !seen.insert(r.get_id())) {
            return Err(AppError::Ingestion(format!(
                "duplicate {} '{}' in upload batch",
                IndexRecord::key_field(),
                duplicate.get_id()
            )));
        }

        let summary = self
            .search
            .upload_documents(records)
            .await
            .map_err(|e| AppError::Ingestion(format!("bulk upload failed: {e}")))?;

        if !summary.is_complete() {
            for (key, reason) in &summary.failed {
                warn!(
                    key_field = IndexRecord::key_field(),
                    %key,
                    %reason,
                    "index rejected record"
                );
            }
            return Err(AppError::Ingestion(format!(
                "{} of {} records were rejected by the index",
                summary.failed.len(),
                records.len()
            )));
        }

        Ok(summary.succeeded)
    }
}
