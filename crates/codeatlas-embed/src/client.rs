//! Embedder client (C5): one request/response codec, two backends, a
//! shared token-bucket rate limiter, and retry-with-backoff that only
//! retries transient failures.

use crate::error::{EmbedError, Result};
use crate::wire::{EmbedRequest, EmbedResponse};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use reqwest::{Client, StatusCode};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_BATCH_SIZE: usize = 50;
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_BASE_RETRY_DELAY: Duration = Duration::from_millis(500);
const DEFAULT_MAX_RETRY_DELAY: Duration = Duration::from_secs(30);
const DEFAULT_REQUESTS_PER_SECOND: u32 = 10;

type TokenBucket = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Distinguishes the two accepted backends (spec §4.5). They differ only in
/// endpoint URL and auth header shape — the request/response schema is
/// shared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedderBackend {
    OpenAi,
    Local,
}

#[derive(Debug, Clone)]
pub struct EmbedderConfig {
    pub backend: EmbedderBackend,
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub dimensions: usize,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub base_retry_delay: Duration,
    pub max_retry_delay: Duration,
    pub batch_size: usize,
    pub requests_per_second: u32,
}

impl EmbedderConfig {
    pub fn new(backend: EmbedderBackend, base_url: impl Into<String>, model: impl Into<String>, dimensions: usize) -> Self {
        Self {
            backend,
            base_url: base_url.into(),
            api_key: None,
            model: model.into(),
            dimensions,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
            base_retry_delay: DEFAULT_BASE_RETRY_DELAY,
            max_retry_delay: DEFAULT_MAX_RETRY_DELAY,
            batch_size: DEFAULT_BATCH_SIZE,
            requests_per_second: DEFAULT_REQUESTS_PER_SECOND,
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }
}

pub struct EmbedderClient {
    http: Client,
    config: EmbedderConfig,
    rate_limiter: Arc<TokenBucket>,
}

impl EmbedderClient {
    pub fn new(config: EmbedderConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EmbedError::Permanent(format!("HTTP client build failed: {e}")))?;

        let rps = NonZeroU32::new(config.requests_per_second)
            .unwrap_or_else(|| NonZeroU32::new(DEFAULT_REQUESTS_PER_SECOND).unwrap());
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_second(rps)));

        Ok(Self {
            http,
            config,
            rate_limiter,
        })
    }

    fn endpoint_url(&self) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        if base.ends_with("/v1") {
            format!("{base}/embeddings")
        } else {
            format!("{base}/v1/embeddings")
        }
    }

    /// `embed(texts) → vectors`, position-preserving, internally chunked at
    /// `batch_size` (spec §4.5 "Batching").
    pub async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.config.batch_size.max(1)) {
            let mut embeddings = self.request_with_retry(chunk.to_vec()).await?;
            out.append(&mut embeddings);
        }
        Ok(out)
    }

    async fn request_with_retry(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let mut delay = self.config.base_retry_delay;
        let mut last_err = None;

        for attempt in 0..=self.config.max_retries {
            self.rate_limiter.until_ready().await;

            match self.send_request(texts.clone()).await {
                Ok(v) => return Ok(v),
                Err(e) => {
                    if !e.retryable() || attempt == self.config.max_retries {
                        return Err(e);
                    }
                    warn!(attempt, delay_ms = delay.as_millis() as u64, "retrying transient embedder error");
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(self.config.max_retry_delay);
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| EmbedError::Transient("exhausted retries".into())))
    }

    async fn send_request(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let url = self.endpoint_url();
        let body = EmbedRequest {
            model: self.config.model.clone(),
            input: texts,
        };

        let mut req = self.http.post(&url).json(&body);
        if let Some(key) = &self.config.api_key {
            req = match self.config.backend {
                EmbedderBackend::OpenAi => req.header("Authorization", format!("Bearer {key}")),
                EmbedderBackend::Local => req.header("Authorization", format!("Bearer {key}")),
            };
        }

        let response = req.send().await.map_err(|e| {
            if e.is_timeout() || e.is_connect() {
                EmbedError::Transient(format!("request failed: {e}"))
            } else {
                EmbedError::Transient(format!("request error: {e}"))
            }
        })?;

        let status = response.status();
        match status {
            StatusCode::OK => {
                let parsed: EmbedResponse = response
                    .json()
                    .await
                    .map_err(|e| EmbedError::Permanent(format!("invalid response body: {e}")))?;
                let vectors: Vec<Vec<f32>> = parsed.data.into_iter().map(|d| d.embedding).collect();
                for v in &vectors {
                    if v.len() != self.config.dimensions {
                        return Err(EmbedError::DimensionMismatch {
                            expected: self.config.dimensions,
                            actual: v.len(),
                        });
                    }
                }
                debug!(count = vectors.len(), "embedded batch");
                Ok(vectors)
            }
            StatusCode::TOO_MANY_REQUESTS | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT => {
                Err(EmbedError::Transient(format!("backend returned {status}")))
            }
            other if other.is_server_error() => Err(EmbedError::Transient(format!("backend returned {other}"))),
            other => {
                let body = response.text().await.unwrap_or_default();
                Err(EmbedError::Permanent(format!("backend returned {other}: {body}")))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer, dimensions: usize, batch_size: usize) -> EmbedderConfig {
        let mut cfg = EmbedderConfig::new(EmbedderBackend::Local, server.uri(), "embed-model-v1", dimensions);
        cfg.batch_size = batch_size;
        cfg.max_retries = 0;
        cfg
    }

    fn embed_response(vectors: &[Vec<f32>]) -> serde_json::Value {
        let data: Vec<_> = vectors.iter().map(|v| serde_json::json!({ "embedding": v })).collect();
        serde_json::json!({ "data": data })
    }

    #[tokio::test]
    async fn embed_single_text_returns_vector_of_configured_dimension() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .and(body_json(&crate::wire::EmbedRequest {
                model: "embed-model-v1".to_string(),
                input: vec!["hello world".to_string()],
            }))
            .respond_with(ResponseTemplate::new(200).set_body_json(embed_response(&[vec![0.1, 0.2, 0.3]])))
            .mount(&server)
            .await;

        let client = EmbedderClient::new(config_for(&server, 3, 50)).unwrap();
        let result = client.embed(vec!["hello world".to_string()]).await.unwrap();

        assert_eq!(result, vec![vec![0.1, 0.2, 0.3]]);
    }

    #[tokio::test]
    async fn embed_chunks_requests_at_batch_size() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .and(body_json(&crate::wire::EmbedRequest {
                model: "embed-model-v1".to_string(),
                input: vec!["a".to_string()],
            }))
            .respond_with(ResponseTemplate::new(200).set_body_json(embed_response(&[vec![1.0, 0.0]])))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .and(body_json(&crate::wire::EmbedRequest {
                model: "embed-model-v1".to_string(),
                input: vec!["b".to_string()],
            }))
            .respond_with(ResponseTemplate::new(200).set_body_json(embed_response(&[vec![0.0, 1.0]])))
            .mount(&server)
            .await;

        // batch_size 1 forces one request per input instead of one request
        // for both.
        let client = EmbedderClient::new(config_for(&server, 2, 1)).unwrap();
        let result = client.embed(vec!["a".to_string(), "b".to_string()]).await.unwrap();

        assert_eq!(result, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[tokio::test]
    async fn embed_surfaces_dimension_mismatch_without_retrying() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(embed_response(&[vec![0.1, 0.2]])))
            .mount(&server)
            .await;

        let client = EmbedderClient::new(config_for(&server, 5, 50)).unwrap();
        let err = client.embed(vec!["x".to_string()]).await.unwrap_err();

        match err {
            EmbedError::DimensionMismatch { expected, actual } => {
                assert_eq!(expected, 5);
                assert_eq!(actual, 2);
            }
            other => panic!("expected DimensionMismatch, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn embed_surfaces_permanent_error_on_4xx_without_retrying() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
            .mount(&server)
            .await;

        let client = EmbedderClient::new(config_for(&server, 3, 50)).unwrap();
        let err = client.embed(vec!["x".to_string()]).await.unwrap_err();

        assert!(matches!(err, EmbedError::Permanent(_)));
        assert!(!err.retryable());
    }

    #[test]
    fn embedder_config_defaults_match_spec() {
        let cfg = EmbedderConfig::new(EmbedderBackend::OpenAi, "https://api.openai.com/v1", "text-embedding-3-small", 1536);
        assert_eq!(cfg.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(cfg.max_retries, DEFAULT_MAX_RETRIES);
    }

    #[test]
    fn endpoint_url_handles_v1_suffix_both_ways() {
        let client = EmbedderClient::new(EmbedderConfig::new(
            EmbedderBackend::Local,
            "http://localhost:11434/v1",
            "nomic-embed-text",
            768,
        ))
        .unwrap();
        assert_eq!(client.endpoint_url(), "http://localhost:11434/v1/embeddings");

        let client2 = EmbedderClient::new(EmbedderConfig::new(
            EmbedderBackend::Local,
            "http://localhost:11434",
            "nomic-embed-text",
            768,
        ))
        .unwrap();
        assert_eq!(client2.endpoint_url(), "http://localhost:11434/v1/embeddings");
    }
}
