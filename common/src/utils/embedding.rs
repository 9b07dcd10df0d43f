use std::{sync::Arc, time::Duration};

use async_openai::{
    config::AzureConfig,
    types::{CreateEmbeddingRequestArgs, EmbeddingInput},
    Client,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    error::{AppError, TransportError},
    utils::{config::OpenAiSettings, retry::RetryPolicy},
};

/// A single call to a hosted embedding model.
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, TransportError>;
}

/// Calls the deployment's REST embeddings route directly so the HTTP status
/// (and therefore rate limiting) stays visible to the retry predicate.
pub struct AzureRestEmbedder {
    http: reqwest::Client,
    url: String,
    api_key: String,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

impl AzureRestEmbedder {
    pub fn new(settings: &OpenAiSettings, deployment: &str) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(TransportError::from)?;
        let url = format!(
            "{}/openai/deployments/{}/embeddings?api-version={}",
            settings.endpoint.trim_end_matches('/'),
            deployment,
            settings.api_version
        );
        Ok(Self {
            http,
            url,
            api_key: settings.api_key.clone(),
        })
    }
}

#[async_trait]
impl EmbeddingService for AzureRestEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, TransportError> {
        let response = self
            .http
            .post(&self.url)
            .header("api-key", &self.api_key)
            .json(&EmbeddingRequest { input: text })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status { status, body });
        }

        let parsed: EmbeddingResponse = response.json().await?;
        parsed
            .data
            .into_iter()
            .next()
            .map(|entry| entry.embedding)
            .ok_or_else(|| TransportError::Decode("No embedding data received".into()))
    }
}

/// Embeddings through the `async-openai` client configured for an Azure deployment.
pub struct AzureOpenAiEmbedder {
    client: Arc<Client<AzureConfig>>,
    deployment: String,
}

impl AzureOpenAiEmbedder {
    pub fn new(client: Arc<Client<AzureConfig>>, deployment: &str) -> Self {
        Self {
            client,
            deployment: deployment.to_string(),
        }
    }
}

#[async_trait]
impl EmbeddingService for AzureOpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, TransportError> {
        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.deployment)
            .input(EmbeddingInput::String(text.to_string()))
            .build()?;

        let response = self.client.embeddings().create(request).await?;

        let embedding = response
            .data
            .into_iter()
            .next()
            .ok_or_else(|| TransportError::Decode("No embedding data received from API".into()))?
            .embedding;

        debug!(dimensions = embedding.len(), "embedding created");
        Ok(embedding)
    }
}

/// Builds an Azure-flavoured `async-openai` client for the query-side calls.
///
/// The client's own backoff is disabled so every call is a single request and
/// the caller's `RetryPolicy` alone decides how often it is repeated.
pub fn azure_openai_client(settings: &OpenAiSettings, deployment: &str) -> Client<AzureConfig> {
    Client::with_config(
        AzureConfig::new()
            .with_api_base(settings.endpoint.trim_end_matches('/'))
            .with_api_key(&settings.api_key)
            .with_api_version(&settings.api_version)
            .with_deployment_id(deployment),
    )
    .with_backoff(single_attempt_backoff())
}

fn single_attempt_backoff() -> backoff::ExponentialBackoff {
    backoff::ExponentialBackoffBuilder::new()
        .with_max_elapsed_time(Some(Duration::ZERO))
        .build()
}

/// An embedding service paired with the retry policy of its call site.
#[derive(Clone)]
pub struct EmbeddingClient {
    service: Arc<dyn EmbeddingService>,
    policy: RetryPolicy,
    expected_dimensions: Option<usize>,
}

impl EmbeddingClient {
    pub fn new(service: Arc<dyn EmbeddingService>, policy: RetryPolicy) -> Self {
        Self {
            service,
            policy,
            expected_dimensions: None,
        }
    }

    #[must_use]
    pub fn with_expected_dimensions(mut self, dimensions: usize) -> Self {
        self.expected_dimensions = Some(dimensions);
        self
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, AppError> {
        let embedding = self
            .policy
            .run(|| self.service.embed(text))
            .await
            .map_err(|err| AppError::Embedding(err.to_string()))?;

        if let Some(expected) = self.expected_dimensions {
            if embedding.len() != expected {
                return Err(AppError::Embedding(format!(
                    "embedding has {} dimensions, index expects {expected}",
                    embedding.len()
                )));
            }
        }

        Ok(embedding)
    }
}
