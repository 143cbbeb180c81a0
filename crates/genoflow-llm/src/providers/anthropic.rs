use futures::future::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use genoflow_core::config::ModelConfig;
use genoflow_core::error::{GenoflowError, Result};
use genoflow_core::traits::ReasoningOracle;
use genoflow_core::types::*;

use super::{endpoint, http_client};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicClient {
    http: Client,
    config: ModelConfig,
}

impl AnthropicClient {
    pub fn new(config: ModelConfig) -> Result<Self> {
        Ok(Self {
            http: http_client(&config)?,
            config,
        })
    }
}

// Anthropic API request types
#[derive(Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
}

#[derive(Serialize)]
struct ApiMessage {
    role: String,
    content: String,
}

// Anthropic API response types
#[derive(Deserialize, Debug)]
struct AnthropicResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    content: Vec<ContentBlockInfo>,
    #[serde(default)]
    usage: Option<UsageInfo>,
}

#[derive(Deserialize, Debug)]
#[serde(tag = "type")]
enum ContentBlockInfo {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Deserialize, Debug)]
struct UsageInfo {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

/// Split out system messages; Anthropic takes them as a separate field.
fn convert_messages(messages: Vec<ChatMessage>) -> (Option<String>, Vec<ApiMessage>) {
    let mut system_parts = Vec::new();
    let mut api_msgs = Vec::new();

    for msg in messages {
        match msg.role {
            Role::System => system_parts.push(msg.content),
            Role::User | Role::Assistant => api_msgs.push(ApiMessage {
                role: msg.role.to_string(),
                content: msg.content,
            }),
        }
    }

    let system = if system_parts.is_empty() {
        None
    } else {
        Some(system_parts.join("\n\n"))
    };
    (system, api_msgs)
}

impl ReasoningOracle for AnthropicClient {
    fn complete(&self, messages: Vec<ChatMessage>) -> BoxFuture<'_, Result<Completion>> {
        Box::pin(async move {
            let api_key = self
                .config
                .api_key
                .as_deref()
                .ok_or_else(|| GenoflowError::Config("Anthropic API key not set".into()))?;

            let url = endpoint(
                self.config.base_url.as_deref(),
                ANTHROPIC_API_URL,
                "/v1/messages",
            );

            let (system, api_messages) = convert_messages(messages);
            let body = AnthropicRequest {
                model: self.config.model_id.clone(),
                max_tokens: self.config.max_tokens,
                temperature: (self.config.temperature > 0.0).then_some(self.config.temperature),
                messages: api_messages,
                system,
            };

            debug!(model = %self.config.model_id, "Sending Anthropic messages request");

            let response = self
                .http
                .post(&url)
                .header("x-api-key", api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .header("content-type", "application/json")
                .json(&body)
                .send()
                .await
                .map_err(|e| GenoflowError::LlmRequest(e.to_string()))?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "unknown error".to_string());
                return Err(GenoflowError::LlmRequest(format!(
                    "HTTP {}: {}",
                    status, body
                )));
            }

            let parsed: AnthropicResponse = response
                .json()
                .await
                .map_err(|e| GenoflowError::LlmParse(e.to_string()))?;

            let content = parsed
                .content
                .into_iter()
                .filter_map(|block| match block {
                    ContentBlockInfo::Text { text } => Some(text),
                    ContentBlockInfo::Other => None,
                })
                .collect::<Vec<_>>()
                .join("");
            let usage = parsed.usage.unwrap_or(UsageInfo {
                input_tokens: 0,
                output_tokens: 0,
            });

            Ok(Completion {
                content,
                model: parsed.model,
                input_tokens: usage.input_tokens,
                output_tokens: usage.output_tokens,
            })
        })
    }
}
