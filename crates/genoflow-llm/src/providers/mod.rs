pub mod anthropic;
pub mod openai;

pub use anthropic::AnthropicClient;
pub use openai::OpenAiClient;

use std::time::Duration;

use reqwest::Client;

use genoflow_core::config::ModelConfig;
use genoflow_core::error::{GenoflowError, Result};

/// HTTP client with the model's request timeout applied.
pub(crate) fn http_client(config: &ModelConfig) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .map_err(|e| GenoflowError::LlmRequest(e.to_string()))
}

/// Join a configured base URL with an API path unless it already ends with it.
pub(crate) fn endpoint(base_url: Option<&str>, default: &str, suffix: &str) -> String {
    match base_url {
        None => default.to_string(),
        Some(base) if base.ends_with(suffix) => base.to_string(),
        Some(base) => format!("{}{}", base.trim_end_matches('/'), suffix),
    }
}
