use std::{fmt, path::Path, str::FromStr};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{error::AppError, storage::types::index_record::INDEX_RECORD_FIELDS};

/// Field data types the index definition accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdmType {
    String,
    Int32,
    DateTimeOffset,
    Single,
    StringCollection,
    SingleCollection,
}

impl EdmType {
    pub fn is_collection(self) -> bool {
        matches!(self, Self::StringCollection | Self::SingleCollection)
    }
}

impl FromStr for EdmType {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "Edm.String" => Ok(Self::String),
            "Edm.Int32" => Ok(Self::Int32),
            "Edm.DateTimeOffset" => Ok(Self::DateTimeOffset),
            "Edm.Single" => Ok(Self::Single),
            "Collection(Edm.String)" => Ok(Self::StringCollection),
            "Collection(Edm.Single)" => Ok(Self::SingleCollection),
            other => Err(AppError::Validation(format!(
                "Data type '{other}' is not supported."
            ))),
        }
    }
}

impl fmt::Display for EdmType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::String => "Edm.String",
            Self::Int32 => "Edm.Int32",
            Self::DateTimeOffset => "Edm.DateTimeOffset",
            Self::Single => "Edm.Single",
            Self::StringCollection => "Collection(Edm.String)",
            Self::SingleCollection => "Collection(Edm.Single)",
        };
        f.write_str(label)
    }
}

impl Serialize for EdmType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// One entry of the `fields` array in the schema file.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FieldDefinition {
    name: Option<String>,
    #[serde(rename = "type")]
    data_type: Option<String>,
    key: Option<bool>,
    searchable: Option<bool>,
    filterable: Option<bool>,
    sortable: Option<bool>,
    facetable: Option<bool>,
    dimensions: Option<u32>,
    vector_search_profile: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FieldsFile {
    fields: Vec<serde_json::Value>,
}

/// A field as sent to the index management API.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchField {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: EdmType,
    pub key: bool,
    pub searchable: bool,
    pub filterable: bool,
    pub sortable: bool,
    pub facetable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector_search_profile: Option<String>,
}

fn flag(value: Option<bool>, field: &str, property: &str) -> Result<bool, AppError> {
    value.ok_or_else(|| {
        AppError::Validation(format!(
            "Error processing field '{field}': missing boolean '{property}'"
        ))
    })
}

impl TryFrom<FieldDefinition> for SearchField {
    type Error = AppError;

    fn try_from(def: FieldDefinition) -> Result<Self, Self::Error> {
        let name = def
            .name
            .ok_or_else(|| AppError::Validation("Error processing field: missing 'name'".into()))?;
        let declared: EdmType = def
            .data_type
            .as_deref()
            .ok_or_else(|| {
                AppError::Validation(format!("Error processing field '{name}': missing 'type'"))
            })?
            .parse()?;

        let key = flag(def.key, &name, "key")?;
        let searchable = flag(def.searchable, &name, "searchable")?;
        let filterable = flag(def.filterable, &name, "filterable")?;
        let sortable = flag(def.sortable, &name, "sortable")?;
        let facetable = flag(def.facetable, &name, "facetable")?;

        // Vector fields keep their declared collection type; other searchable
        // non-key fields are full-text string fields.
        let is_vector = def.dimensions.is_some();
        let (data_type, searchable) = if is_vector {
            (EdmType::SingleCollection, true)
        } else if searchable && !key {
            let text_type = if declared.is_collection() {
                EdmType::StringCollection
            } else {
                EdmType::String
            };
            (text_type, true)
        } else {
            (declared, false)
        };

        Ok(Self {
            name,
            data_type,
            key,
            searchable,
            filterable,
            sortable,
            facetable,
            dimensions: def.dimensions,
            vector_search_profile: def.vector_search_profile,
        })
    }
}

/// Parses a schema document of the form `{ "fields": [...] }`.
pub fn parse_fields(json: &str) -> Result<Vec<SearchField>, AppError> {
    let file: FieldsFile = serde_json::from_str(json)?;
    file.fields
        .into_iter()
        .map(|raw| {
            let def: FieldDefinition = serde_json::from_value(raw.clone()).map_err(|e| {
                AppError::Validation(format!("Error processing field: {raw}. Exception: {e}"))
            })?;
            SearchField::try_from(def)
        })
        .collect()
}

pub fn load_fields(path: &Path) -> Result<Vec<SearchField>, AppError> {
    let json = std::fs::read_to_string(path)?;
    let fields = parse_fields(&json)?;
    debug!(path = %path.display(), field_count = fields.len(), "loaded index fields");
    Ok(fields)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    Cosine,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricParameters {
    pub metric: DistanceMetric,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind")]
pub enum VectorAlgorithm {
    #[serde(rename = "hnsw")]
    Hnsw {
        name: String,
        #[serde(rename = "hnswParameters")]
        parameters: MetricParameters,
    },
    #[serde(rename = "exhaustiveKnn")]
    ExhaustiveKnn {
        name: String,
        #[serde(rename = "exhaustiveKnnParameters")]
        parameters: MetricParameters,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VectorProfile {
    pub name: String,
    pub algorithm: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VectorSearchConfig {
    pub algorithms: Vec<VectorAlgorithm>,
    pub profiles: Vec<VectorProfile>,
}

impl Default for VectorSearchConfig {
    fn default() -> Self {
        let cosine = || MetricParameters {
            metric: DistanceMetric::Cosine,
        };
        Self {
            algorithms: vec![
                VectorAlgorithm::Hnsw {
                    name: "default-HNSW".into(),
                    parameters: cosine(),
                },
                VectorAlgorithm::ExhaustiveKnn {
                    name: "default".into(),
                    parameters: cosine(),
                },
            ],
            profiles: vec![
                VectorProfile {
                    name: "default".into(),
                    algorithm: "default".into(),
                },
                VectorProfile {
                    name: "default-HNSW".into(),
                    algorithm: "default-HNSW".into(),
                },
            ],
        }
    }
}

/// Full index definition sent on create-or-update.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexDefinition {
    pub name: String,
    pub fields: Vec<SearchField>,
    pub vector_search: VectorSearchConfig,
}

impl IndexDefinition {
    pub fn new(name: &str, fields: Vec<SearchField>) -> Self {
        Self {
            name: name.to_string(),
            fields,
            vector_search: VectorSearchConfig::default(),
        }
    }

    /// Record fields the ingestion pipeline writes that this schema does not declare.
    pub fn missing_record_fields(&self) -> Vec<&'static str> {
        INDEX_RECORD_FIELDS
            .iter()
            .copied()
            .filter(|wanted| !self.fields.iter().any(|f| f.name == *wanted))
            .collect()
    }

    pub fn vector_dimensions(&self, field: &str) -> Option<u32> {
        self.fields
            .iter()
            .find(|f| f.name == field)
            .and_then(|f| f.dimensions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIELDS: &str = r#"{
        "fields": [
            {"name": "ChunkId", "type": "Edm.String", "key": true, "searchable": false, "filterable": true, "sortable": false, "facetable": false},
            {"name": "ChunkSequence", "type": "Edm.Int32", "key": false, "searchable": false, "filterable": true, "sortable": true, "facetable": false},
            {"name": "ChunkText", "type": "Edm.String", "key": false, "searchable": true, "filterable": false, "sortable": false, "facetable": false},
            {"name": "Tags", "type": "Collection(Edm.String)", "key": false, "searchable": true, "filterable": true, "sortable": false, "facetable": true},
            {"name": "ChunkVector", "type": "Collection(Edm.Single)", "key": false, "searchable": true, "filterable": false, "sortable": false, "facetable": false, "dimensions": 3072, "vectorSearchProfile": "default-HNSW"},
            {"name": "PublicationDate", "type": "Edm.DateTimeOffset", "key": false, "searchable": false, "filterable": true, "sortable": true, "facetable": false}
        ]
    }"#;

    #[test]
    fn fields_are_mapped_to_index_fields() {
        let fields = parse_fields(FIELDS).expect("parse");
        assert_eq!(fields.len(), 6);

        let key = &fields[0];
        assert!(key.key);
        assert!(!key.searchable);

        let tags = &fields[3];
        assert_eq!(tags.data_type, EdmType::StringCollection);
        assert!(tags.searchable);

        let vector = &fields[4];
        assert_eq!(vector.data_type, EdmType::SingleCollection);
        assert_eq!(vector.dimensions, Some(3072));
        assert_eq!(vector.vector_search_profile.as_deref(), Some("default-HNSW"));
    }

    #[test]
    fn unsupported_type_is_rejected() {
        let json = r#"{"fields": [{"name": "Price", "type": "Edm.Double", "key": false, "searchable": false, "filterable": true, "sortable": true, "facetable": false}]}"#;
        match parse_fields(json) {
            Err(AppError::Validation(msg)) => {
                assert_eq!(msg, "Data type 'Edm.Double' is not supported.");
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn missing_flag_names_the_field() {
        let json = r#"{"fields": [{"name": "Title", "type": "Edm.String", "key": false, "searchable": true}]}"#;
        match parse_fields(json) {
            Err(AppError::Validation(msg)) => {
                assert!(msg.contains("Title"));
                assert!(msg.contains("filterable"));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn index_definition_serializes_vector_configuration() {
        let definition = IndexDefinition::new("manuals", parse_fields(FIELDS).expect("parse"));
        let value = serde_json::to_value(&definition).expect("serialize");

        assert_eq!(value["name"], "manuals");
        assert_eq!(value["fields"][4]["type"], "Collection(Edm.Single)");
        assert_eq!(value["fields"][4]["vectorSearchProfile"], "default-HNSW");
        assert!(value["fields"][0].get("dimensions").is_none());

        let algorithms = &value["vectorSearch"]["algorithms"];
        assert_eq!(algorithms[0]["kind"], "hnsw");
        assert_eq!(algorithms[0]["hnswParameters"]["metric"], "cosine");
        assert_eq!(algorithms[1]["kind"], "exhaustiveKnn");
        assert_eq!(algorithms[1]["name"], "default");
        assert_eq!(value["vectorSearch"]["profiles"][1]["algorithm"], "default-HNSW");
    }

    #[test]
    fn missing_record_fields_are_reported() {
        let definition = IndexDefinition::new("manuals", parse_fields(FIELDS).expect("parse"));
        let missing = definition.missing_record_fields();

        assert!(missing.contains(&"DocumentTitle"));
        assert!(!missing.contains(&"ChunkVector"));
        assert_eq!(definition.vector_dimensions("ChunkVector"), Some(3072));
    }
}
