//! In-memory stand-ins for the external services, shared by the pipeline tests.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::missing_panics_doc,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects
)]

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{Map, Value};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};

use crate::{
    error::TransportError,
    storage::{
        schema::IndexDefinition,
        search::{SearchHit, SearchRequest, SearchResponse, SearchService, UploadSummary},
        types::index_record::IndexRecord,
    },
    utils::{chat::ChatService, embedding::EmbeddingService},
};

type Responder = Box<dyn Fn(&SearchRequest) -> Result<SearchResponse, TransportError> + Send + Sync>;

/// Records every call and answers searches through a caller-supplied closure.
pub struct MockSearchService {
    responder: Responder,
    fail_upload: bool,
    pub searches: Mutex<Vec<SearchRequest>>,
    pub uploads: Mutex<Vec<Vec<IndexRecord>>>,
    pub indexes: Mutex<Vec<IndexDefinition>>,
}

impl MockSearchService {
    pub fn new(
        responder: impl Fn(&SearchRequest) -> Result<SearchResponse, TransportError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            responder: Box::new(responder),
            fail_upload: false,
            searches: Mutex::new(Vec::new()),
            uploads: Mutex::new(Vec::new()),
            indexes: Mutex::new(Vec::new()),
        }
    }

    /// Answers every search with the same hits.
    pub fn with_hits(hits: Vec<SearchHit>) -> Self {
        Self::new(move |_| {
            Ok(SearchResponse {
                value: hits.clone(),
            })
        })
    }

    #[must_use]
    pub fn failing_uploads(mut self) -> Self {
        self.fail_upload = true;
        self
    }

    pub fn search_requests(&self) -> Vec<SearchRequest> {
        self.searches.lock().unwrap().clone()
    }

    pub fn uploaded_batches(&self) -> Vec<Vec<IndexRecord>> {
        self.uploads.lock().unwrap().clone()
    }
}

#[async_trait]
impl SearchService for MockSearchService {
    async fn create_or_update_index(&self, index: &IndexDefinition) -> Result<(), TransportError> {
        self.indexes.lock().unwrap().push(index.clone());
        Ok(())
    }

    async fn upload_documents(
        &self,
        records: &[IndexRecord],
    ) -> Result<UploadSummary, TransportError> {
        self.uploads.lock().unwrap().push(records.to_vec());
        if self.fail_upload {
            return Err(server_error("upload rejected"));
        }
        Ok(UploadSummary {
            succeeded: records.len(),
            failed: Vec::new(),
        })
    }

    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, TransportError> {
        self.searches.lock().unwrap().push(request.clone());
        (self.responder)(request)
    }
}

/// Returns a fixed vector and counts calls.
pub struct StaticEmbedder {
    vector: Vec<f32>,
    pub calls: AtomicUsize,
}

impl StaticEmbedder {
    pub fn new(vector: Vec<f32>) -> Self {
        Self {
            vector,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingService for StaticEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.vector.clone())
    }
}

/// Chat stub answering with a fixed reply, or failing every call.
pub struct ScriptedChat {
    reply: Option<String>,
    pub calls: AtomicUsize,
}

impl ScriptedChat {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatService for ScriptedChat {
    async fn complete(
        &self,
        _system_prompt: &str,
        _user_text: &str,
    ) -> Result<String, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.reply
            .clone()
            .ok_or_else(|| server_error("chat deployment unavailable"))
    }
}

pub fn server_error(body: &str) -> TransportError {
    TransportError::Status {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        body: body.to_string(),
    }
}

pub fn bad_request(body: &str) -> TransportError {
    TransportError::Status {
        status: StatusCode::BAD_REQUEST,
        body: body.to_string(),
    }
}

/// A hit with the given score and string fields.
pub fn hit(score: f64, fields: &[(&str, &str)]) -> SearchHit {
    let document: Map<String, Value> = fields
        .iter()
        .map(|(name, value)| ((*name).to_string(), Value::String((*value).to_string())))
        .collect();
    SearchHit::new(score, document)
}

/// A loopback HTTP server giving the same answer to every request.
///
/// Each response closes its connection, so the recorded requests count the
/// calls a client really made.
pub struct HttpStub {
    pub base_url: String,
    requests: Arc<Mutex<Vec<String>>>,
}

impl HttpStub {
    pub async fn start(status: u16, body: &str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind stub");
        let addr = listener.local_addr().expect("stub address");
        let reason = StatusCode::from_u16(status)
            .ok()
            .and_then(|code| code.canonical_reason())
            .unwrap_or("Unknown");
        let response = format!(
            "HTTP/1.1 {status} {reason}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );

        let requests = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&requests);
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let request = read_request(&mut socket).await;
                recorded.lock().unwrap().push(request);
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        Self {
            base_url: format!("http://{addr}"),
            requests,
        }
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Raw requests as received: request line, headers and body.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

async fn read_request(socket: &mut TcpStream) -> String {
    let mut received = Vec::new();
    let mut buf = [0_u8; 4096];
    loop {
        let read = socket.read(&mut buf).await.unwrap_or(0);
        if read == 0 {
            break;
        }
        received.extend_from_slice(&buf[..read]);

        if let Some(header_end) = received.windows(4).position(|w| w == b"\r\n\r\n") {
            let headers = String::from_utf8_lossy(&received[..header_end]).to_ascii_lowercase();
            let content_length = headers
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|value| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if received.len() >= header_end + 4 + content_length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&received).into_owned()
}
