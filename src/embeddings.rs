//! # Embedding client
//!
//! Turns a text string into a dense `Vec<f32>` through a remote embeddings endpoint.
//!
//! The [`Embedder`] trait is the only thing the index builder and retriever depend on, so
//! tests can substitute an in-process fake. [`OpenAiEmbedder`] is the production
//! implementation: it speaks the OpenAI-compatible `POST {api_base}/embeddings` shape and
//! retries transient failures (timeouts, connection errors, 429 and 5xx) with exponential
//! backoff.
//!
//! There is no caching at this layer; embeddings are reused because whole indexes are
//! persisted one level up (see [`crate::index`]).

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::{ProviderKind, RetrievalConfig};
use crate::error::EmbedError;

/// Something that can embed a single string.
pub trait Embedder {
    /// Embed `text` into a fixed-dimensionality vector.
    fn embed(&self, text: &str) -> impl Future<Output = Result<Vec<f32>, EmbedError>> + Send;
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
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

/// Client for an OpenAI-compatible embeddings endpoint.
#[derive(Clone)]
pub struct OpenAiEmbedder {
    http: reqwest::Client,
    api_key: String,
    api_base: String,
    model: String,
    max_retries: u32,
    retry_base_delay: Duration,
}

impl fmt::Debug for OpenAiEmbedder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiEmbedder")
            .field("api_key", &"<redacted>")
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl OpenAiEmbedder {
    /// Create a client with no retries.
    ///
    /// A trailing `/` on `api_base` is ignored.
    pub fn new(
        api_key: impl Into<String>,
        api_base: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        let api_base: String = api_base.into();

        Self {
            http,
            api_key: api_key.into(),
            api_base: api_base.trim_end_matches('/').to_string(),
            model: model.into(),
            max_retries: 0,
            retry_base_delay: Duration::from_millis(500),
        }
    }

    /// Build a client from the retrieval section of the config.
    ///
    /// The key is read from `OPENAI_API_KEY`.
    ///
    /// # Errors
    /// Returns an error if the environment variable is not set.
    pub fn from_config(config: &RetrievalConfig) -> Result<Self, Box<dyn Error>> {
        let api_key = crate::config::api_key_for(ProviderKind::OpenAi)?;
        Ok(Self::new(
            api_key,
            config.embedding_api_base.clone(),
            config.embedding_model.clone(),
        )
        .with_retries(config.max_retries, Duration::from_millis(500)))
    }

    /// Retry transient failures up to `max_retries` times, sleeping `base_delay * 2^attempt`
    /// between attempts.
    pub fn with_retries(mut self, max_retries: u32, base_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_base_delay = base_delay;
        self
    }

    async fn embed_once(&self, input: &str) -> Result<Vec<f32>, EmbedError> {
        let body = EmbeddingRequest {
            model: &self.model,
            input,
        };

        let response = self
            .http
            .post(format!("{}/embeddings", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(EmbedError::Status { status, body: text });
        }

        let parsed: EmbeddingResponse =
            serde_json::from_str(&text).map_err(|e| EmbedError::Malformed(e.to_string()))?;

        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| EmbedError::Malformed("no embedding in response".to_string()))
    }
}

/// Replace line breaks with spaces; some providers reject or degrade on raw newlines.
pub fn normalize_input(text: &str) -> String {
    text.replace(['\r', '\n'], " ")
}

impl Embedder for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        if text.is_empty() {
            return Err(EmbedError::EmptyInput);
        }
        let input = normalize_input(text);

        let mut attempt = 0u32;
        loop {
            match self.embed_once(&input).await {
                Ok(embedding) => {
                    debug!(dim = embedding.len(), "embedded {} chars", input.len());
                    return Ok(embedding);
                }
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    let delay = self
                        .retry_base_delay
                        .saturating_mul(2u32.saturating_pow(attempt));
                    attempt += 1;
                    warn!(attempt, ?delay, "embedding request failed, retrying: {e}");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    #[test]
    fn newlines_become_spaces() {
        assert_eq!(normalize_input("a\nb\r\nc"), "a b  c");
    }

    #[test]
    fn debug_output_hides_the_key() {
        let embedder = OpenAiEmbedder::new("sk-secret", "http://localhost", "m");
        assert!(!format!("{embedder:?}").contains("sk-secret"));
    }

    #[tokio::test]
    async fn embeds_text_with_normalized_input() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/embeddings")
                    .header("authorization", "Bearer test-key")
                    .json_body(json!({
                        "model": "text-embedding-3-small",
                        "input": "line one line two"
                    }));
                then.status(200)
                    .json_body(json!({"data": [{"embedding": [0.25, -0.5, 1.0]}]}));
            })
            .await;

        let embedder = OpenAiEmbedder::new(
            "test-key",
            format!("{}/", server.base_url()),
            "text-embedding-3-small",
        );
        let vector = embedder.embed("line one\nline two").await.unwrap();

        assert_eq!(vector, vec![0.25, -0.5, 1.0]);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn empty_text_is_rejected_locally() {
        let embedder = OpenAiEmbedder::new("k", "http://127.0.0.1:1", "m");
        assert!(matches!(
            embedder.embed("").await,
            Err(EmbedError::EmptyInput)
        ));
    }

    #[tokio::test]
    async fn server_errors_are_retried_then_reported() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/embeddings");
                then.status(500).body("overloaded");
            })
            .await;

        let embedder = OpenAiEmbedder::new("k", server.base_url(), "m")
            .with_retries(2, Duration::from_millis(1));
        let err = embedder.embed("hello").await.unwrap_err();

        assert!(matches!(err, EmbedError::Status { status, .. } if status.as_u16() == 500));
        mock.assert_calls_async(3).await;
    }

    #[tokio::test]
    async fn auth_errors_are_not_retried() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/embeddings");
                then.status(401).body("bad key");
            })
            .await;

        let embedder = OpenAiEmbedder::new("k", server.base_url(), "m")
            .with_retries(3, Duration::from_millis(1));
        let err = embedder.embed("hello").await.unwrap_err();

        assert!(!err.is_transient());
        mock.assert_calls_async(1).await;
    }

    #[tokio::test]
    async fn missing_embedding_is_malformed() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/embeddings");
                then.status(200).json_body(json!({"data": []}));
            })
            .await;

        let embedder = OpenAiEmbedder::new("k", server.base_url(), "m");
        assert!(matches!(
            embedder.embed("hello").await,
            Err(EmbedError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn unreachable_endpoint_errors() {
        let embedder = OpenAiEmbedder::new("k", "http://127.0.0.1:1", "m");
        assert!(embedder.embed("hello").await.is_err());
    }
}
