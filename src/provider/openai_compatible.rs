//! OpenAI-compatible chat-completions [`Provider`], grounded on the
//! teacher's `llm/openai_compatible_chat.rs` (request/response shapes,
//! retry-with-backoff loop, tolerant usage parsing) adapted to this
//! crate's [`crate::domain`] wire types and [`Provider`] trait.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;

use crate::config::HttpProviderConfig;
use crate::domain::{ProviderRequest, ProviderResult, StopReason, ToolCall};
use crate::error::ProviderError;
use crate::provider::Provider;

const DEFAULT_MAX_RETRIES: u32 = 3;

pub struct OpenAiCompatibleProvider {
    client: Client,
    config: HttpProviderConfig,
    max_retries: u32,
}

impl OpenAiCompatibleProvider {
    pub fn new(config: HttpProviderConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ProviderError::RequestFailed {
                provider: config.name.clone(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self { client, config, max_retries: DEFAULT_MAX_RETRIES })
    }

    fn api_url(&self) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        if base.ends_with("/v1") {
            format!("{base}/chat/completions")
        } else {
            format!("{base}/v1/chat/completions")
        }
    }

    fn auth_header(&self) -> String {
        format!("Bearer {}", self.config.api_key.as_deref().unwrap_or("no-key"))
    }

    async fn call(&self, request: &ProviderRequest, with_tools: bool) -> Result<ProviderResult, ProviderError> {
        let mut messages = vec![];
        if let Some(system) = &request.system_prompt {
            messages.push(json!({"role": "system", "content": system}));
        }
        for m in &request.messages {
            messages.push(json!({
                "role": match m.role {
                    crate::domain::MessageRole::User => "user",
                    crate::domain::MessageRole::Assistant => "assistant",
                    crate::domain::MessageRole::System => "system",
                },
                "content": m.content,
            }));
        }

        let model = request.model.as_deref().unwrap_or(&self.config.model);
        let mut body = json!({
            "model": model,
            "messages": messages,
        });
        if with_tools && !request.tool_defs.is_empty() {
            let tools: Vec<_> = request
                .tool_defs
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    })
                })
                .collect();
            body["tools"] = json!(tools);
        }

        let response = self.send_with_retry(&body).await?;
        Ok(parse_response(&self.config.name, response))
    }

    async fn send_with_retry(&self, body: &serde_json::Value) -> Result<ChatCompletionResponse, ProviderError> {
        let url = self.api_url();

        for attempt in 0..=self.max_retries {
            let outcome = self
                .client
                .post(&url)
                .header("Authorization", self.auth_header())
                .header("Content-Type", "application/json")
                .json(body)
                .send()
                .await;

            let response = match outcome {
                Ok(r) => r,
                Err(e) => {
                    if attempt < self.max_retries {
                        tokio::time::sleep(backoff_delay(attempt)).await;
                        continue;
                    }
                    return Err(ProviderError::RequestFailed {
                        provider: self.config.name.clone(),
                        reason: e.to_string(),
                    });
                }
            };

            let status = response.status();
            if status.is_success() {
                return response.json::<ChatCompletionResponse>().await.map_err(|e| {
                    ProviderError::RequestFailed {
                        provider: self.config.name.clone(),
                        reason: format!("malformed response body: {e}"),
                    }
                });
            }

            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                return Err(ProviderError::AuthFailed {
                    provider: self.config.name.clone(),
                    reason: status.to_string(),
                });
            }

            if is_retryable_status(status) && attempt < self.max_retries {
                tokio::time::sleep(backoff_delay(attempt)).await;
                continue;
            }

            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::RequestFailed {
                provider: self.config.name.clone(),
                reason: format!("{status}: {text}"),
            });
        }

        unreachable!("retry loop always returns before exhausting attempts")
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_millis(200u64.saturating_mul(1u64 << attempt.min(5)))
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<RawToolCall>,
}

#[derive(Debug, Deserialize)]
struct RawToolCall {
    id: String,
    function: RawFunctionCall,
}

#[derive(Debug, Deserialize)]
struct RawFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Default, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

fn parse_response(provider_name: &str, response: ChatCompletionResponse) -> ProviderResult {
    let choice = response.choices.into_iter().next();
    let (content, tool_calls, finish_reason) = match choice {
        Some(c) => (c.message.content.unwrap_or_default(), c.message.tool_calls, c.finish_reason),
        None => (String::new(), Vec::new(), None),
    };

    let tool_calls: Vec<ToolCall> = tool_calls
        .into_iter()
        .map(|t| ToolCall {
            id: t.id,
            name: t.function.name,
            input: serde_json::from_str(&t.function.arguments).unwrap_or(json!({})),
        })
        .collect();

    let stop_reason = if !tool_calls.is_empty() {
        StopReason::ToolUse
    } else {
        match finish_reason.as_deref() {
            Some("stop") => StopReason::EndTurn,
            Some("length") => StopReason::MaxTokens,
            Some("content_filter") => StopReason::Refusal,
            Some(other) => StopReason::Other(other.to_string()),
            None => StopReason::EndTurn,
        }
    };

    let usage = response.usage.unwrap_or_default();
    let _ = provider_name;

    ProviderResult {
        output: content,
        stop_reason,
        tool_calls,
        tokens_in: usage.prompt_tokens,
        tokens_out: usage.completion_tokens,
        cost_usd: Decimal::ZERO,
    }
}

#[async_trait]
impl Provider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn execute(&self, request: ProviderRequest) -> Result<ProviderResult, ProviderError> {
        self.call(&request, false).await
    }

    async fn execute_with_tools(&self, request: ProviderRequest) -> Result<ProviderResult, ProviderError> {
        self.call(&request, true).await
    }
}
