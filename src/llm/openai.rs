//! OpenAI-compatible chat completions client.
//!
//! Talks to `{base_url}/chat/completions` with bearer auth. Tools are declared
//! as functions taking a single string argument named `input`.

use super::{ChatMessage, Completion, CompletionEngine, Role, ToolCall, ToolSpec};
use crate::error::{DbError, DbResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o";
pub const DEFAULT_TEMPERATURE: f32 = 0.0;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

/// Connection settings for the completion API.
#[derive(Clone)]
pub struct OpenAiConfig {
    /// Contains sensitive data - never log
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub request_timeout_secs: u64,
}

impl OpenAiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl std::fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("api_key", &"****")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

/// Completion engine backed by an OpenAI-compatible HTTP API.
pub struct OpenAiClient {
    http: reqwest::Client,
    config: OpenAiConfig,
}

impl OpenAiClient {
    pub fn new(config: OpenAiConfig) -> DbResult<Self> {
        if config.api_key.trim().is_empty() {
            return Err(DbError::configuration(
                "Completion API key is empty. Set GPT_API_KEY.",
            ));
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| DbError::configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { http, config })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }

    /// Map a transport failure, reporting timeouts against the configured limit.
    fn request_error(&self, err: reqwest::Error) -> DbError {
        if err.is_timeout() {
            warn!(
                timeout_secs = self.config.request_timeout_secs,
                "Completion request timed out"
            );
            let secs = u32::try_from(self.config.request_timeout_secs).unwrap_or(u32::MAX);
            return DbError::timeout("completion request", secs);
        }
        DbError::from(err)
    }
}

#[async_trait]
impl CompletionEngine for OpenAiClient {
    async fn complete(&self, messages: &[ChatMessage], tools: &[ToolSpec]) -> DbResult<Completion> {
        let body = build_request(&self.config.model, self.config.temperature, messages, tools);
        debug!(
            model = %self.config.model,
            messages = messages.len(),
            tools = tools.len(),
            "Requesting completion"
        );

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!(status = %status, "Completion request rejected");
            return Err(DbError::llm(format!(
                "Completion API returned {}: {}",
                status, text
            )));
        }

        let payload: ChatResponse = response.json().await.map_err(|e| self.request_error(e))?;
        parse_response(payload)
    }
}

// =============================================================================
// Wire Format
// =============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<JsonValue>,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: Role,
    content: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<&'a str>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type", default = "function_type")]
    call_type: String,
    function: WireFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

fn function_type() -> String {
    "function".to_string()
}

fn build_request<'a>(
    model: &'a str,
    temperature: f32,
    messages: &'a [ChatMessage],
    tools: &[ToolSpec],
) -> ChatRequest<'a> {
    let messages = messages
        .iter()
        .map(|m| WireMessage {
            role: m.role,
            content: if m.content.is_empty() && !m.tool_calls.is_empty() {
                None
            } else {
                Some(m.content.as_str())
            },
            tool_calls: m
                .tool_calls
                .iter()
                .map(|c| WireToolCall {
                    id: c.id.clone(),
                    call_type: function_type(),
                    function: WireFunction {
                        name: c.name.clone(),
                        arguments: json!({ "input": c.input }).to_string(),
                    },
                })
                .collect(),
            tool_call_id: m.tool_call_id.as_deref(),
        })
        .collect();

    let tools = tools
        .iter()
        .map(|t| {
            json!({
                "type": "function",
                "function": {
                    "name": t.name,
                    "description": t.description,
                    "parameters": {
                        "type": "object",
                        "properties": {
                            "input": { "type": "string" }
                        },
                        "required": ["input"]
                    }
                }
            })
        })
        .collect();

    ChatRequest {
        model,
        temperature,
        messages,
        tools,
    }
}

fn parse_response(response: ChatResponse) -> DbResult<Completion> {
    let message = response
        .choices
        .into_iter()
        .next()
        .map(|c| c.message)
        .ok_or_else(|| DbError::llm("Completion response contained no choices"))?;

    if !message.tool_calls.is_empty() {
        let calls = message
            .tool_calls
            .into_iter()
            .map(|c| ToolCall {
                id: c.id,
                name: c.function.name,
                input: tool_input(&c.function.arguments),
            })
            .collect();
        return Ok(Completion::ToolCalls(calls));
    }

    Ok(Completion::Answer(message.content.unwrap_or_default()))
}

/// Pull `input` out of the JSON arguments. Models occasionally send a bare
/// string or a differently named key; fall back to the raw text.
fn tool_input(arguments: &str) -> String {
    match serde_json::from_str::<JsonValue>(arguments) {
        Ok(JsonValue::Object(map)) => match map.get("input") {
            Some(JsonValue::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => map
                .values()
                .find_map(|v| v.as_str().map(str::to_string))
                .unwrap_or_default(),
        },
        Ok(JsonValue::String(s)) => s,
        _ => arguments.to_string(),
    }
}
