use serde::{Deserialize, Serialize};

/// A source unit read once per ingestion run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub title: String,
    pub text: String,
}

impl Document {
    pub fn new(title: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            text: text.into(),
        }
    }
}

/// A bounded segment of a document; the unit of embedding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub parent_id: String,
    /// Zero-based and contiguous per parent over non-blank chunks.
    pub sequence_number: u32,
    pub text: String,
}
