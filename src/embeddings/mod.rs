
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::config::Config;
use crate::{PhysioError, Result};

const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const EXPONENTIAL_BACKOFF_BASE: u64 = 2;

/// Client for an OpenAI-compatible `/embeddings` endpoint.
#[derive(Debug, Clone)]
pub struct EmbeddingClient {
    base_url: Url,
    api_key: String,
    model: String,
    agent: ureq::Agent,
    retry_attempts: u32,
    timeout_seconds: u64,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedData>,
}

#[derive(Debug, Deserialize)]
struct EmbedData {
    embedding: Vec<f32>,
    index: usize,
}

impl EmbeddingClient {
    #[inline]
    pub fn new(config: &Config, api_key: String) -> Result<Self> {
        let base_url = config
            .openai
            .base_url()
            .map_err(|e| PhysioError::Config(e.to_string()))?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.openai.timeout_seconds)))
            .build()
            .into();

        Ok(Self {
            base_url,
            api_key,
            model: config.openai.embedding_model.clone(),
            agent,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            timeout_seconds: config.openai.timeout_seconds,
        })
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        self.timeout_seconds = timeout.as_secs();
        self
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts;
        self
    }

    /// Embed a single text.
    #[inline]
    pub fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut embeddings = self.embed_batch(&[text.to_string()])?;
        embeddings
            .pop()
            .ok_or_else(|| PhysioError::Embedding("Backend returned no embedding".to_string()))
    }

    /// Embed a batch of texts, preserving input order.
    #[inline]
    pub fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Generating embeddings for {} texts", texts.len());

        let request = EmbedRequest {
            model: &self.model,
            input: texts,
        };
        let request_json = serde_json::to_string(&request)
            .map_err(|e| PhysioError::Embedding(format!("Failed to serialize request: {}", e)))?;

        let url = self.endpoint("embeddings")?;
        let authorization = format!("Bearer {}", self.api_key);
        let response_text = self.make_request_with_retry(|| {
            self.agent
                .post(url.as_str())
                .header("Authorization", authorization.as_str())
                .header("Content-Type", "application/json")
                .send(&request_json)
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })?;

        let response: EmbedResponse = serde_json::from_str(&response_text)
            .map_err(|e| PhysioError::Embedding(format!("Failed to parse response: {}", e)))?;

        if response.data.len() != texts.len() {
            return Err(PhysioError::Embedding(format!(
                "Mismatch between request and response counts: {} vs {}",
                texts.len(),
                response.data.len()
            )));
        }

        // The API is allowed to return entries out of order; `index` is
        // authoritative.
        let mut data = response.data;
        data.sort_by_key(|d| d.index);

        debug!("Generated {} embeddings", data.len());
        Ok(data.into_iter().map(|d| d.embedding).collect())
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        let joined = format!("{}/{}", self.base_url.as_str().trim_end_matches('/'), path);
        Url::parse(&joined).map_err(|e| PhysioError::Embedding(format!("Invalid URL: {}", e)))
    }

    fn make_request_with_retry<F>(&self, mut request_fn: F) -> Result<String>
    where
        F: FnMut() -> std::result::Result<String, ureq::Error>,
    {
        let mut last_error = None;

        for attempt in 1..=self.retry_attempts {
            debug!("HTTP request attempt {}/{}", attempt, self.retry_attempts);

            match request_fn() {
                Ok(response_text) => return Ok(response_text),
                Err(error) => {
                    let should_retry = match &error {
                        ureq::Error::StatusCode(status) => {
                            if *status >= 500 {
                                warn!(
                                    "Server error (status {}), attempt {}/{}",
                                    status, attempt, self.retry_attempts
                                );
                                true
                            } else {
                                return Err(PhysioError::Embedding(format!(
                                    "Client error: HTTP {}",
                                    status
                                )));
                            }
                        }
                        ureq::Error::Timeout(_) => {
                            warn!(
                                "Embedding request timed out after {}s, attempt {}/{}",
                                self.timeout_seconds, attempt, self.retry_attempts
                            );
                            true
                        }
                        ureq::Error::ConnectionFailed
                        | ureq::Error::HostNotFound
                        | ureq::Error::Io(_) => {
                            warn!(
                                "Transport error: {}, attempt {}/{}",
                                error, attempt, self.retry_attempts
                            );
                            true
                        }
                        _ => {
                            return Err(PhysioError::Embedding(format!(
                                "Non-retryable error: {}",
                                error
                            )));
                        }
                    };

                    if should_retry {
                        last_error = Some(error);
                        if attempt < self.retry_attempts {
                            let delay_ms = EXPONENTIAL_BACKOFF_BASE.pow(attempt - 1) * 1000;
                            std::thread::sleep(Duration::from_millis(delay_ms));
                        }
                    }
                }
            }
        }

        Err(PhysioError::Embedding(format!(
            "Embedding backend unreachable after {} attempts: {}",
            self.retry_attempts,
            last_error.map_or_else(|| "unknown error".to_string(), |e| e.to_string())
        )))
    }
}
