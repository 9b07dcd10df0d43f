use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize, Serializer};
use uuid::Uuid;

use super::{document::Chunk, StoredObject};

/// Placeholder written into descriptive fields the source documents do not provide.
pub const NOT_AVAILABLE: &str = "N/A";

/// Index field names for every `IndexRecord` member, in declaration order.
pub const INDEX_RECORD_FIELDS: [&str; 12] = [
    "ChunkId",
    "ParentChunkId",
    "ChunkSequence",
    "DocumentTitle",
    "CitationTitle",
    "ChunkText",
    "ChunkVector",
    "URL",
    "PublicationDate",
    "ManualType",
    "MetaData",
    "ContractType",
];

/// The unit uploaded to the search index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRecord {
    #[serde(rename = "ChunkId")]
    pub chunk_id: String,
    #[serde(rename = "ParentChunkId")]
    pub parent_chunk_id: String,
    #[serde(rename = "ChunkSequence")]
    pub sequence_number: u32,
    #[serde(rename = "DocumentTitle")]
    pub document_title: String,
    #[serde(rename = "CitationTitle")]
    pub citation_title: String,
    #[serde(rename = "ChunkText")]
    pub chunk_text: String,
    #[serde(rename = "ChunkVector")]
    pub embedding: Vec<f32>,
    #[serde(rename = "URL")]
    pub url: String,
    #[serde(rename = "PublicationDate", serialize_with = "serialize_rfc3339")]
    pub publication_date: DateTime<Utc>,
    #[serde(rename = "ManualType")]
    pub manual_type: String,
    #[serde(rename = "MetaData")]
    pub metadata: String,
    #[serde(rename = "ContractType")]
    pub contract_type: String,
}

fn serialize_rfc3339<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&date.to_rfc3339_opts(SecondsFormat::Millis, true))
}

impl IndexRecord {
    /// Assembles a record for an embedded chunk with a fresh `ChunkId`.
    pub fn new(
        chunk: Chunk,
        document_title: &str,
        embedding: Vec<f32>,
        manual_type: &str,
        publication_date: DateTime<Utc>,
    ) -> Self {
        Self {
            chunk_id: Uuid::new_v4().to_string(),
            parent_chunk_id: chunk.parent_id,
            sequence_number: chunk.sequence_number,
            document_title: document_title.to_string(),
            citation_title: NOT_AVAILABLE.to_string(),
            chunk_text: chunk.text,
            embedding,
            url: document_title.to_string(),
            publication_date,
            manual_type: manual_type.to_string(),
            metadata: NOT_AVAILABLE.to_string(),
            contract_type: NOT_AVAILABLE.to_string(),
        }
    }
}

impl StoredObject for IndexRecord {
    fn key_field() -> &'static str {
        "ChunkId"
    }

    fn get_id(&self) -> &str {
        &self.chunk_id
    }
}
