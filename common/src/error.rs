use async_openai::error::OpenAIError;
use reqwest::StatusCode;
use thiserror::Error;

/// Failures raised by a single outbound call to an external service.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("HTTP {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("OpenAI error: {0}")]
    OpenAI(#[from] OpenAIError),
    #[error("Response decoding error: {0}")]
    Decode(String),
}

impl TransportError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Request(err) => err.status(),
            Self::OpenAI(_) | Self::Decode(_) => None,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        self.status() == Some(StatusCode::TOO_MANY_REQUESTS)
    }

    pub fn is_bad_request(&self) -> bool {
        self.status() == Some(StatusCode::BAD_REQUEST)
    }

    /// Response body of a failed status, if the service sent one.
    pub fn body(&self) -> Option<&str> {
        match self {
            Self::Status { body, .. } => Some(body),
            _ => None,
        }
    }
}

// Core internal errors
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Missing required configuration value: {0}")]
    Configuration(String),
    #[error("Embedding error: {0}")]
    Embedding(String),
    #[error("Ingestion error: {0}")]
    Ingestion(String),
    #[error("Semantic configuration '{0}' is not available on the index")]
    SemanticUnavailable(String),
    #[error("Query rewrite error: {0}")]
    Rewrite(String),
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Document error: {0}")]
    Document(String),
    #[error("IoError: {0}")]
    Io(#[from] std::io::Error),
    #[error("Json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("Internal service error: {0}")]
    InternalError(String),
}
