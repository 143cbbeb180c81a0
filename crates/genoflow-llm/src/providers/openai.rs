use futures::future::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use genoflow_core::config::ModelConfig;
use genoflow_core::error::{GenoflowError, Result};
use genoflow_core::traits::ReasoningOracle;
use genoflow_core::types::*;

use super::{endpoint, http_client};

const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// OpenAI-compatible client. Works with OpenAI, Ollama, vLLM, Groq, OpenRouter, etc.
pub struct OpenAiClient {
    http: Client,
    config: ModelConfig,
}

impl OpenAiClient {
    pub fn new(config: ModelConfig) -> Result<Self> {
        Ok(Self {
            http: http_client(&config)?,
            config,
        })
    }
}

// Request types
#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<OaiMessage>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Serialize)]
struct OaiMessage {
    role: String,
    content: String,
}

// Response types
#[derive(Deserialize, Debug)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize, Debug)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize, Debug)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize, Debug)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

fn convert_messages(messages: Vec<ChatMessage>) -> Vec<OaiMessage> {
    messages
        .into_iter()
        .map(|msg| OaiMessage {
            role: msg.role.to_string(),
            content: msg.content,
        })
        .collect()
}

fn into_completion(response: ChatResponse) -> Result<Completion> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| GenoflowError::LlmParse("response has no choices".into()))?;
    let usage = response.usage.unwrap_or(Usage {
        prompt_tokens: 0,
        completion_tokens: 0,
    });

    Ok(Completion {
        content: choice.message.content.unwrap_or_default(),
        model: response.model,
        input_tokens: usage.prompt_tokens,
        output_tokens: usage.completion_tokens,
    })
}

impl ReasoningOracle for OpenAiClient {
    fn complete(&self, messages: Vec<ChatMessage>) -> BoxFuture<'_, Result<Completion>> {
        Box::pin(async move {
            let url = endpoint(
                self.config.base_url.as_deref(),
                OPENAI_API_URL,
                "/chat/completions",
            );

            let body = ChatRequest {
                model: self.config.model_id.clone(),
                messages: convert_messages(messages),
                max_tokens: self.config.max_tokens,
                temperature: self.config.temperature,
                stream: false,
            };

            debug!(model = %self.config.model_id, url = %url, "Sending chat completion request");

            let mut req = self.http.post(&url).json(&body);
            if let Some(api_key) = &self.config.api_key {
                req = req.header("Authorization", format!("Bearer {}", api_key));
            }

            let response = req
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

            let parsed: ChatResponse = response
                .json()
                .await
                .map_err(|e| GenoflowError::LlmParse(e.to_string()))?;
            into_completion(parsed)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> ModelConfig {
        ModelConfig {
            provider: "openai".into(),
            model_id: "gpt-4o".into(),
            api_key: Some("sk-test".into()),
            base_url: Some(format!("{}/v1", server.uri())),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_complete_returns_first_choice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("Authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({"model": "gpt-4o", "stream": false})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "model": "gpt-4o",
                "choices": [{"message": {"role": "assistant", "content": "{\"steps\": []}"}}],
                "usage": {"prompt_tokens": 12, "completion_tokens": 4}
            })))
            .mount(&server)
            .await;

        let client = OpenAiClient::new(config_for(&server)).unwrap();
        let completion = client
            .complete(vec![ChatMessage::system("plan"), ChatMessage::user("goal")])
            .await
            .unwrap();

        assert_eq!(completion.content, "{\"steps\": []}");
        assert_eq!(completion.model.as_deref(), Some("gpt-4o"));
        assert_eq!(completion.input_tokens, 12);
        assert_eq!(completion.output_tokens, 4);
    }

    #[tokio::test]
    async fn test_http_error_is_llm_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let client = OpenAiClient::new(config_for(&server)).unwrap();
        let err = client.complete(vec![ChatMessage::user("hi")]).await.unwrap_err();
        match err {
            GenoflowError::LlmRequest(msg) => {
                assert!(msg.contains("503"));
                assert!(msg.contains("overloaded"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_empty_choices_is_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let client = OpenAiClient::new(config_for(&server)).unwrap();
        let err = client.complete(vec![ChatMessage::user("hi")]).await.unwrap_err();
        assert!(matches!(err, GenoflowError::LlmParse(_)));
    }
}
