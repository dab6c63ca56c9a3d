//! Embedding client for an OpenAI-compatible `/embeddings` endpoint.

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::error::{ConfigError, EmbeddingError};
use crate::models::EmbeddingConfig;

/// A remote service turning texts into vectors.
///
/// Implementations return exactly one vector per input, in input order.
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Model identifier, recorded in checkpoints.
    fn model(&self) -> &str;
}

/// Request body for the /embeddings endpoint.
#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
    encoding_format: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

/// Response from the /embeddings endpoint.
#[derive(Debug, Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedData>,
}

#[derive(Debug, Deserialize)]
struct EmbedData {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

/// Put vectors in input order.
///
/// Indices must be a permutation of `0..data.len()`. A response without any index is taken
/// in positional order.
fn order_by_index(data: Vec<EmbedData>) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    if data.iter().all(|d| d.index.is_none()) {
        return Ok(data.into_iter().map(|d| d.embedding).collect());
    }

    let len = data.len();
    let mut slots: Vec<Option<Vec<f32>>> = vec![None; len];
    for item in data {
        let index = item.index.ok_or_else(|| {
            EmbeddingError::InvalidResponse("some embeddings carry no index".into())
        })?;
        let slot = slots.get_mut(index).ok_or_else(|| {
            EmbeddingError::InvalidResponse(format!(
                "embedding index {index} out of range for {len} inputs"
            ))
        })?;
        if slot.is_some() {
            return Err(EmbeddingError::InvalidResponse(format!(
                "duplicate embedding index {index}"
            )));
        }
        *slot = Some(item.embedding);
    }

    // every slot is filled: len distinct indices below len
    Ok(slots.into_iter().flatten().collect())
}

/// Client for interacting with the embedding service.
#[derive(Debug, Clone)]
pub struct EmbeddingClient {
    client: Client,
    endpoint: String,
    model: String,
    dimensions: Option<usize>,
}

impl EmbeddingClient {
    /// Create a client, reading the API key from the environment variable named in `config`.
    pub fn from_env(config: &EmbeddingConfig) -> Result<Self, ConfigError> {
        let api_key = std::env::var(&config.api_key_env).unwrap_or_default();
        Self::new(config, &api_key)
    }

    /// Create a client with an explicit API key. A blank key is a configuration error.
    pub fn new(config: &EmbeddingConfig, api_key: &str) -> Result<Self, ConfigError> {
        config.validate()?;
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(ConfigError::MissingCredential(config.api_key_env.clone()));
        }

        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bearer {api_key}"))
            .map_err(|_| ConfigError::ValidationError("API key is not a valid header value".into()))?;
        headers.insert(AUTHORIZATION, auth);

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| ConfigError::ValidationError(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: config.endpoint(),
            model: config.model.clone(),
            dimensions: config.dimensions,
        })
    }

}

#[async_trait]
impl EmbeddingService for EmbeddingClient {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = EmbedRequest {
            model: &self.model,
            input: texts,
            encoding_format: "float",
            dimensions: self.dimensions,
        };

        debug!(inputs = texts.len(), endpoint = %self.endpoint, "sending embedding request");

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    EmbeddingError::Timeout
                } else if e.is_connect() {
                    EmbeddingError::ConnectionError(e.to_string())
                } else {
                    EmbeddingError::RequestError(e)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::ServerError(format!(
                "status {}: {}",
                status, body
            )));
        }

        let embed_response: EmbedResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::InvalidResponse(e.to_string()))?;

        if embed_response.data.len() != texts.len() {
            return Err(EmbeddingError::CountMismatch {
                got: embed_response.data.len(),
                want: texts.len(),
            });
        }

        order_by_index(embed_response.data)
    }

    fn model(&self) -> &str {
        &self.model
    }
}
