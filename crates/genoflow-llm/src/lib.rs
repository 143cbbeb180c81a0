pub mod providers;
pub mod retry;

use std::sync::Arc;

use tracing::info;

use genoflow_core::config::{AppConfig, ModelConfig};
use genoflow_core::error::Result;
use genoflow_core::traits::ReasoningOracle;

pub use providers::anthropic::AnthropicClient;
pub use providers::openai::OpenAiClient;
pub use retry::RetryingClient;

/// Create an oracle client based on the provider name.
pub fn create_client(config: &ModelConfig) -> Result<Box<dyn ReasoningOracle>> {
    let client: Box<dyn ReasoningOracle> = match config.provider.as_str() {
        "anthropic" | "claude" => Box::new(AnthropicClient::new(config.clone())?),
        // Everything else uses the OpenAI-compatible client
        _ => Box::new(OpenAiClient::new(config.clone())?),
    };
    Ok(client)
}

/// Build the oracle for an app config, wrapping it with retry and fallback
/// models when either is configured.
pub fn create_oracle(config: &AppConfig) -> Result<Arc<dyn ReasoningOracle>> {
    let primary = create_client(&config.model)?;
    if config.model.retry.is_none() && config.fallback_models.is_empty() {
        return Ok(Arc::from(primary));
    }

    let fallbacks = config
        .fallback_models
        .iter()
        .map(|fb| Ok((fb.clone(), create_client(fb)?)))
        .collect::<Result<Vec<_>>>()?;

    info!(
        model = %config.model.model_id,
        fallbacks = fallbacks.len(),
        "Oracle configured with retry"
    );

    Ok(Arc::new(RetryingClient::new(
        primary,
        fallbacks,
        config.model.retry.clone().unwrap_or_default(),
    )))
}
