#![allow(clippy::missing_docs_in_private_items, clippy::result_large_err)]

pub mod chunker;
pub mod documents;
pub mod pipeline;

pub use documents::{DocumentSource, DocxDirectory};
pub use pipeline::{IngestionConfig, IngestionPipeline, IngestionTuning};
