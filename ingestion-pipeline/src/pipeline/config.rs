#[derive(Debug, Clone)]
pub struct IngestionTuning {
    /// Upper bound on whitespace-delimited words per chunk.
    pub chunk_max_tokens: usize,
    pub manual_type: String,
}

impl Default for IngestionTuning {
    fn default() -> Self {
        Self {
            chunk_max_tokens: 7_000,
            manual_type: "docx".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct IngestionConfig {
    pub tuning: IngestionTuning,
    /// Drop chunks whose embedding exhausted its retries instead of failing the run.
    /// Surviving chunks keep their original sequence numbers, so gaps are possible.
    pub skip_failed_embeddings: bool,
}
