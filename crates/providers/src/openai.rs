use async_trait::async_trait;
use hono_core::types::{parse_arguments, ChatMessage, LLMResponse, ToolCallRequest};
use hono_core::{Error, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::Provider;

pub const DEFAULT_API_BASE: &str = "https://openrouter.ai/api/v1";

/// Largest byte index <= `max_bytes` on a char boundary.
fn truncate_at_char_boundary(s: &str, max_bytes: usize) -> usize {
    if max_bytes >= s.len() {
        return s.len();
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    end
}

/// Chat-completions client for any OpenAI-compatible endpoint (OpenRouter, OpenAI, DeepSeek).
pub struct OpenAIProvider {
    client: Client,
    api_key: String,
    api_base: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl OpenAIProvider {
    pub fn new(api_key: &str, api_base: Option<&str>, model: &str, max_tokens: u32, temperature: f32) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Failed to build HTTP client, using default");
                Client::new()
            });
        Self {
            client,
            api_key: api_key.to_string(),
            api_base: api_base
                .unwrap_or(DEFAULT_API_BASE)
                .trim_end_matches('/')
                .to_string(),
            model: model.to_string(),
            max_tokens,
            temperature,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_request(&self, messages: &[ChatMessage], tools: &[Value]) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: messages.to_vec(),
            tools: tools.to_vec(),
            tool_choice: if tools.is_empty() { None } else { Some("auto".to_string()) },
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }

    async fn send_request(&self, messages: &[ChatMessage], tools: &[Value]) -> Result<ChatResponse> {
        let url = format!("{}/chat/completions", self.api_base);
        let request = self.build_request(messages, tools);

        info!(url = %url, model = %self.model, tools_count = tools.len(), messages_count = messages.len(), "Calling LLM");

        let request_body = serde_json::to_string(&request)
            .map_err(|e| Error::Provider(format!("Failed to serialize request: {}", e)))?;
        debug!(body_len = request_body.len(), "Request body prepared");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .body(request_body)
            .send()
            .await
            .map_err(|e| Error::Provider(format!("Request failed: {}", e)))?;

        let status = response.status();
        let raw_body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            error!(status = %status, body = %raw_body, "LLM API error");
            return Err(Error::Provider(format!("API error {}: {}", status, raw_body)));
        }

        parse_response(&raw_body)
    }
}

fn parse_response(raw_body: &str) -> Result<ChatResponse> {
    let end = truncate_at_char_boundary(raw_body, 500);
    debug!(body_len = raw_body.len(), preview = %&raw_body[..end], "LLM raw response");
    serde_json::from_str(raw_body).map_err(|e| {
        Error::Provider(format!("Failed to parse response: {}. Body: {}", e, &raw_body[..end]))
    })
}

fn into_llm_response(chat_response: ChatResponse) -> Result<LLMResponse> {
    let choice = chat_response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| Error::Provider("No choices in response".to_string()))?;

    let tool_calls: Vec<ToolCallRequest> = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|tc| {
            let mut call = ToolCallRequest::new(&tc.function.name, parse_arguments(&tc.function.arguments));
            if !tc.id.is_empty() {
                call.id = tc.id;
            }
            call
        })
        .collect();

    let content = choice.message.content.filter(|c| !c.is_empty());
    Ok(LLMResponse {
        content,
        finish_reason: choice.finish_reason.unwrap_or_else(|| {
            (if tool_calls.is_empty() { "stop" } else { "tool_calls" }).to_string()
        }),
        tool_calls,
        usage: chat_response.usage.unwrap_or(Value::Null),
    })
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<String>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    usage: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ToolCall {
    #[serde(default)]
    id: String,
    function: FunctionCall,
}

#[derive(Debug, Deserialize)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[async_trait]
impl Provider for OpenAIProvider {
    async fn chat(&self, messages: &[ChatMessage], tools: &[Value]) -> Result<LLMResponse> {
        let response = into_llm_response(self.send_request(messages, tools).await?)?;
        if !response.tool_calls.is_empty() {
            info!(count = response.tool_calls.len(), "LLM requested tool calls");
        }
        Ok(response)
    }
}
