use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;
use url::Url;

use crate::{
    error::{AppError, TransportError},
    storage::{schema::IndexDefinition, types::index_record::IndexRecord},
    utils::config::SearchSettings,
};

/// Prefix the service uses for result annotations such as the relevance score.
pub const ANNOTATION_PREFIX: char = '@';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryType {
    Simple,
    Semantic,
}

/// A nearest-neighbour clause over one vector field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VectorQuery {
    pub kind: &'static str,
    pub vector: Vec<f32>,
    pub k: usize,
    pub fields: String,
}

impl VectorQuery {
    pub fn new(vector: Vec<f32>, k: usize, field: &str) -> Self {
        Self {
            kind: "vector",
            vector,
            k,
            fields: field.to_string(),
        }
    }
}

/// Body of a search call. `search: None` means a pure vector query.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    pub top: usize,
    #[serde(
        skip_serializing_if = "Vec::is_empty",
        serialize_with = "serialize_select"
    )]
    pub select: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub vector_queries: Vec<VectorQuery>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_type: Option<QueryType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub semantic_configuration: Option<String>,
}

fn serialize_select<S>(select: &[String], serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(&select.join(","))
}

impl SearchRequest {
    pub fn text(query: &str, top: usize) -> Self {
        Self {
            search: Some(query.to_string()),
            top,
            select: Vec::new(),
            vector_queries: Vec::new(),
            query_type: None,
            semantic_configuration: None,
        }
    }

    pub fn vector(query: VectorQuery, top: usize) -> Self {
        Self {
            search: None,
            top,
            select: Vec::new(),
            vector_queries: vec![query],
            query_type: None,
            semantic_configuration: None,
        }
    }

    #[must_use]
    pub fn with_vector(mut self, query: VectorQuery) -> Self {
        self.vector_queries.push(query);
        self
    }

    #[must_use]
    pub fn with_select(mut self, fields: &[String]) -> Self {
        self.select = fields.to_vec();
        self
    }

    #[must_use]
    pub fn with_semantic(mut self, configuration: &str) -> Self {
        self.query_type = Some(QueryType::Semantic);
        self.semantic_configuration = Some(configuration.to_string());
        self
    }
}

/// One ranked hit; `@search.*` annotations are split from the document fields.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SearchHit {
    #[serde(rename = "@search.score")]
    pub score: f64,
    #[serde(rename = "@search.rerankerScore", default)]
    pub reranker_score: Option<f64>,
    #[serde(flatten)]
    pub document: Map<String, Value>,
}

impl SearchHit {
    pub fn new(score: f64, document: Map<String, Value>) -> Self {
        Self {
            score,
            reranker_score: None,
            document,
        }
    }

    /// Document fields without service annotations.
    pub fn fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.document
            .iter()
            .filter(|(name, _)| !name.starts_with(ANNOTATION_PREFIX))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub value: Vec<SearchHit>,
}

#[derive(Serialize)]
struct UploadAction<'a> {
    #[serde(rename = "@search.action")]
    action: &'static str,
    #[serde(flatten)]
    record: &'a IndexRecord,
}

#[derive(Serialize)]
struct UploadBatch<'a> {
    value: Vec<UploadAction<'a>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IndexingResult {
    key: String,
    status: bool,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IndexingResponse {
    #[serde(default)]
    value: Vec<IndexingResult>,
}

/// Outcome of a bulk upload, with the keys the service refused.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadSummary {
    pub succeeded: usize,
    pub failed: Vec<(String, String)>,
}

impl UploadSummary {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// The managed search index, as the pipelines see it.
#[async_trait]
pub trait SearchService: Send + Sync {
    async fn create_or_update_index(&self, index: &IndexDefinition) -> Result<(), TransportError>;

    async fn upload_documents(
        &self,
        records: &[IndexRecord],
    ) -> Result<UploadSummary, TransportError>;

    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, TransportError>;
}

/// REST client for one index of a managed search service.
pub struct AzureSearchClient {
    http: reqwest::Client,
    endpoint: Url,
    index_name: String,
    api_key: String,
    api_version: String,
}

impl AzureSearchClient {
    pub fn new(settings: &SearchSettings) -> Result<Self, AppError> {
        let endpoint = Url::parse(&settings.endpoint).map_err(|e| {
            AppError::Validation(format!(
                "invalid search endpoint '{}': {e}",
                settings.endpoint
            ))
        })?;
        let http = reqwest::Client::builder()
            .build()
            .map_err(TransportError::from)?;
        Ok(Self {
            http,
            endpoint,
            index_name: settings.index_name.clone(),
            api_key: settings.api_key.clone(),
            api_version: settings.api_version.clone(),
        })
    }

    fn url(&self, segments: &[&str]) -> Result<Url, TransportError> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|()| TransportError::Decode("search endpoint cannot be a base URL".into()))?
            .pop_if_empty()
            .extend(segments);
        url.query_pairs_mut()
            .append_pair("api-version", &self.api_version);
        Ok(url)
    }

    async fn send<B: Serialize + Sync>(
        &self,
        method: Method,
        url: Url,
        body: &B,
    ) -> Result<reqwest::Response, TransportError> {
        let response = self
            .http
            .request(method, url)
            .header("api-key", &self.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(TransportError::Status { status, body })
    }
}

#[async_trait]
impl SearchService for AzureSearchClient {
    async fn create_or_update_index(&self, index: &IndexDefinition) -> Result<(), TransportError> {
        let url = self.url(&["indexes", &index.name])?;
        self.send(Method::PUT, url, index).await?;
        Ok(())
    }

    async fn upload_documents(
        &self,
        records: &[IndexRecord],
    ) -> Result<UploadSummary, TransportError> {
        let url = self.url(&["indexes", &self.index_name, "docs", "index"])?;
        let batch = UploadBatch {
            value: records
                .iter()
                .map(|record| UploadAction {
                    action: "upload",
                    record,
                })
                .collect(),
        };

        let response = self.send(Method::POST, url, &batch).await?;
        let multi_status = response.status() == StatusCode::MULTI_STATUS;
        let parsed: IndexingResponse = response.json().await?;

        let mut summary = UploadSummary::default();
        for result in parsed.value {
            if result.status {
                summary.succeeded = summary.succeeded.saturating_add(1);
            } else {
                summary.failed.push((
                    result.key,
                    result.error_message.unwrap_or_else(|| "unknown error".into()),
                ));
            }
        }
        debug!(
            succeeded = summary.succeeded,
            failed = summary.failed.len(),
            multi_status,
            "bulk upload answered"
        );
        Ok(summary)
    }

    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, TransportError> {
        let url = self.url(&["indexes", &self.index_name, "docs", "search"])?;
        let response = self.send(Method::POST, url, request).await?;
        Ok(response.json().await?)
    }
}
