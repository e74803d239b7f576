//! # Chat providers
//!
//! One [`ProviderClient`] talks to one hosted model. Every provider is driven the same way:
//! a system prompt, the in-memory history and the new user prompt go in; a stream of text
//! tokens comes out. Only the request shape and the server-sent-event payloads differ:
//!
//! | Provider  | Endpoint                                             | Token field                       |
//! |-----------|------------------------------------------------------|-----------------------------------|
//! | OpenAI    | `{base}/chat/completions`                            | `choices[0].delta.content`        |
//! | DeepSeek  | `{base}/chat/completions`                            | `choices[0].delta.content`        |
//! | Anthropic | `{base}/messages`                                    | `content_block_delta.delta.text`  |
//! | Gemini    | `{base}/models/{model}:streamGenerateContent?alt=sse`| `candidates[0].content.parts[*]`  |

use eventsource_stream::Eventsource;
use futures::stream::BoxStream;
use futures::{StreamExt, future};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::error::Error;
use std::fmt;
use std::time::Duration;
use tracing::debug;

use crate::config::{ProviderKind, api_key_for};

/// Output budget requested from providers that require one.
pub const MAX_OUTPUT_TOKENS: u32 = 2048;

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One turn of conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{provider} returned {status}: {body}")]
    Status {
        provider: ProviderKind,
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("invalid stream payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("broken event stream: {0}")]
    Sse(String),

    #[error("{provider} reported an error: {message}")]
    Remote {
        provider: ProviderKind,
        message: String,
    },
}

/// Stream of response tokens.
pub type TokenStream = BoxStream<'static, Result<String, ProviderError>>;

/// HTTP client bound to one provider and model.
#[derive(Clone)]
pub struct ProviderClient {
    kind: ProviderKind,
    model: String,
    api_key: String,
    base_url: String,
    http: reqwest::Client,
}

impl fmt::Debug for ProviderClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderClient")
            .field("kind", &self.kind)
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

fn default_base_url(kind: ProviderKind) -> &'static str {
    match kind {
        ProviderKind::Anthropic => "https://api.anthropic.com/v1",
        ProviderKind::OpenAi => "https://api.openai.com/v1",
        ProviderKind::DeepSeek => "https://api.deepseek.com/v1",
        ProviderKind::Gemini => "https://generativelanguage.googleapis.com/v1beta",
    }
}

impl ProviderClient {
    pub fn new(kind: ProviderKind, model: impl Into<String>, api_key: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            kind,
            model: model.into(),
            api_key: api_key.into(),
            base_url: default_base_url(kind).to_string(),
            http,
        }
    }

    /// Build a client taking the API key from the provider's environment variable.
    ///
    /// # Errors
    /// Returns an error when the variable is not set.
    pub fn from_env(kind: ProviderKind, model: impl Into<String>) -> Result<Self, Box<dyn Error>> {
        Ok(Self::new(kind, model, api_key_for(kind)?))
    }

    /// Point the client at another server (proxies, self-hosted gateways, tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self) -> String {
        match self.kind {
            ProviderKind::OpenAi | ProviderKind::DeepSeek => {
                format!("{}/chat/completions", self.base_url)
            }
            ProviderKind::Anthropic => format!("{}/messages", self.base_url),
            ProviderKind::Gemini => format!(
                "{}/models/{}:streamGenerateContent?alt=sse",
                self.base_url, self.model
            ),
        }
    }

    /// JSON body of a streaming request.
    pub fn request_body(&self, system: &str, history: &[Message], prompt: &str) -> Value {
        let current = Message::user(prompt);
        let turns = history
            .iter()
            .filter(|m| m.role != Role::System)
            .chain(std::iter::once(&current));

        match self.kind {
            ProviderKind::OpenAi | ProviderKind::DeepSeek => {
                let mut messages = vec![json!({"role": "system", "content": system})];
                messages.extend(turns.map(|m| json!({"role": m.role, "content": m.content})));
                // o-series models reject `max_tokens`
                let limit_field = if self.kind == ProviderKind::OpenAi {
                    "max_completion_tokens"
                } else {
                    "max_tokens"
                };
                json!({
                    "model": self.model,
                    "stream": true,
                    limit_field: MAX_OUTPUT_TOKENS,
                    "messages": messages,
                })
            }
            ProviderKind::Anthropic => json!({
                "model": self.model,
                "max_tokens": MAX_OUTPUT_TOKENS,
                "stream": true,
                "system": system,
                "messages": turns
                    .map(|m| json!({"role": m.role, "content": m.content}))
                    .collect::<Vec<_>>(),
            }),
            ProviderKind::Gemini => json!({
                "systemInstruction": {"parts": [{"text": system}]},
                "contents": turns
                    .map(|m| {
                        let role = if m.role == Role::User { "user" } else { "model" };
                        json!({"role": role, "parts": [{"text": m.content}]})
                    })
                    .collect::<Vec<_>>(),
                "generationConfig": {
                    "maxOutputTokens": MAX_OUTPUT_TOKENS,
                    "temperature": 1.0,
                },
            }),
        }
    }

    /// Send a prompt and stream the answer token by token.
    ///
    /// # Errors
    /// Transport failures and non-2xx statuses are returned before any token is produced;
    /// failures in the middle of the stream surface as stream items.
    pub async fn stream_chat(
        &self,
        system: &str,
        history: &[Message],
        prompt: &str,
    ) -> Result<TokenStream, ProviderError> {
        let body = self.request_body(system, history, prompt);
        debug!(provider = %self.kind, model = %self.model, "Sending chat request");

        let request = self.http.post(self.endpoint()).json(&body);
        let request = match self.kind {
            ProviderKind::OpenAi | ProviderKind::DeepSeek => request.bearer_auth(&self.api_key),
            ProviderKind::Anthropic => request
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", "2023-06-01"),
            ProviderKind::Gemini => request.header("x-goog-api-key", &self.api_key),
        };

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                provider: self.kind,
                status,
                body,
            });
        }

        Ok(token_stream(self.kind, response))
    }
}

/// What one SSE payload contributes to the answer.
#[derive(Debug, PartialEq, Eq)]
pub enum Delta {
    Token(String),
    Skip,
    Done,
}

/// Interpret one SSE `data` payload for `kind`.
pub fn parse_event(kind: ProviderKind, data: &str) -> Result<Delta, ProviderError> {
    if data.trim() == "[DONE]" {
        return Ok(Delta::Done);
    }
    let value: Value = serde_json::from_str(data)?;

    if let Some(error) = value.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return Err(ProviderError::Remote {
            provider: kind,
            message,
        });
    }

    let token = match kind {
        ProviderKind::OpenAi | ProviderKind::DeepSeek => value
            .pointer("/choices/0/delta/content")
            .and_then(Value::as_str)
            .map(str::to_string),
        ProviderKind::Anthropic => match value.get("type").and_then(Value::as_str) {
            Some("content_block_delta") => value
                .pointer("/delta/text")
                .and_then(Value::as_str)
                .map(str::to_string),
            Some("message_stop") => return Ok(Delta::Done),
            _ => None,
        },
        ProviderKind::Gemini => value
            .pointer("/candidates/0/content/parts")
            .and_then(Value::as_array)
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|p| p.get("text").and_then(Value::as_str))
                    .collect::<String>()
            }),
    };

    Ok(match token {
        Some(t) if !t.is_empty() => Delta::Token(t),
        _ => Delta::Skip,
    })
}

/// Turn a `text/event-stream` response into answer tokens.
///
/// The stream ends at the provider's end marker, at the end of the body, or right after the
/// first error.
fn token_stream(kind: ProviderKind, response: reqwest::Response) -> TokenStream {
    response
        .bytes_stream()
        .eventsource()
        .map(move |event| match event {
            Ok(event) => parse_event(kind, &event.data),
            Err(e) => Err(ProviderError::Sse(e.to_string())),
        })
        .scan(false, |failed, item| {
            let next = match item {
                _ if *failed => None,
                Ok(Delta::Done) => None,
                Ok(delta) => Some(Ok(delta)),
                Err(e) => {
                    *failed = true;
                    Some(Err(e))
                }
            };
            future::ready(next)
        })
        .filter_map(|item| {
            future::ready(match item {
                Ok(Delta::Token(token)) => Some(Ok(token)),
                Ok(_) => None,
                Err(e) => Some(Err(e)),
            })
        })
        .boxed()
}
