
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::config::Config;
use crate::{PhysioError, Result};

const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const EXPONENTIAL_BACKOFF_BASE: u64 = 2;

/// Deterministic output is preferred for SQL generation and JSON
/// negotiation.
const TEMPERATURE: f32 = 0.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
    Tool,
}

/// One message on the chat-completions wire. Assistant messages may carry
/// tool calls instead of (or alongside) content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    #[inline]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    #[inline]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    #[inline]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// Result message answering a specific tool call.
    #[inline]
    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Tool,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
        }
    }

    #[inline]
    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or_default()
    }

    #[inline]
    pub fn requested_tool_calls(&self) -> &[ToolCall] {
        self.tool_calls.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: String,
    pub function: FunctionCall,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded argument object, exactly as the model produced it.
    pub arguments: String,
}

/// Tool signature advertised to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    #[serde(rename = "type")]
    pub spec_type: String,
    pub function: FunctionSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolSpec {
    #[inline]
    pub fn function(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
    ) -> Self {
        Self {
            spec_type: "function".to_string(),
            function: FunctionSpec {
                name: name.into(),
                description: description.into(),
                parameters,
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [ToolSpec]>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// Client for an OpenAI-compatible `/chat/completions` endpoint. All calls
/// block the caller; the pipeline is strictly sequential by design.
#[derive(Debug, Clone)]
pub struct ChatClient {
    base_url: Url,
    api_key: String,
    model: String,
    agent: ureq::Agent,
    retry_attempts: u32,
    timeout_seconds: u64,
}

impl ChatClient {
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
            model: config.openai.chat_model.clone(),
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

    /// One completion round. Returns the assistant message, which may be a
    /// direct answer or a tool-call request.
    #[inline]
    pub fn chat(&self, messages: &[ChatMessage], tools: Option<&[ToolSpec]>) -> Result<ChatMessage> {
        debug!(
            "Requesting completion: {} messages, {} tools",
            messages.len(),
            tools.map_or(0, <[ToolSpec]>::len)
        );

        let request = ChatRequest {
            model: &self.model,
            messages,
            temperature: TEMPERATURE,
            tools,
        };
        let request_json = serde_json::to_string(&request)
            .map_err(|e| PhysioError::Generation(format!("Failed to serialize request: {}", e)))?;

        let url = self.endpoint("chat/completions")?;
        let authorization = format!("Bearer {}", self.api_key);
        let response_text = self.make_request_with_retry(|| {
            self.agent
                .post(url.as_str())
                .header("Authorization", authorization.as_str())
                .header("Content-Type", "application/json")
                .send(&request_json)
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })?;

        let response: ChatResponse = serde_json::from_str(&response_text)
            .map_err(|e| PhysioError::Generation(format!("Failed to parse response: {}", e)))?;

        response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .ok_or_else(|| PhysioError::Generation("Response contained no choices".to_string()))
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        let joined = format!("{}/{}", self.base_url.as_str().trim_end_matches('/'), path);
        Url::parse(&joined).map_err(|e| PhysioError::Generation(format!("Invalid URL: {}", e)))
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
                                return Err(PhysioError::Generation(format!(
                                    "Client error: HTTP {}",
                                    status
                                )));
                            }
                        }
                        // A hung model call fails the turn instead of
                        // blocking it indefinitely.
                        ureq::Error::Timeout(_) => {
                            warn!("Model call timed out after {}s", self.timeout_seconds);
                            return Err(PhysioError::Timeout(self.timeout_seconds));
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
                            return Err(PhysioError::Generation(format!(
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

        Err(PhysioError::Generation(format!(
            "Model backend unreachable after {} attempts: {}",
            self.retry_attempts,
            last_error.map_or_else(|| "unknown error".to_string(), |e| e.to_string())
        )))
    }
}
