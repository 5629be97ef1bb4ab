pub mod openai;

use async_trait::async_trait;
use hono_core::types::{ChatMessage, LLMResponse};
use hono_core::{Config, Error, Result};
use serde_json::Value;
use std::sync::Arc;

#[async_trait]
pub trait Provider: Send + Sync {
    async fn chat(&self, messages: &[ChatMessage], tools: &[Value]) -> Result<LLMResponse>;
}

pub use openai::OpenAIProvider;

/// Builds a provider for `model` from the first configured key.
pub fn create_provider(config: &Config, model: &str) -> Result<Arc<dyn Provider>> {
    let (name, provider) = config.get_api_key().ok_or_else(|| {
        Error::Config("No LLM provider configured. Set providers.<name>.apiKey in config.json".to_string())
    })?;
    tracing::debug!(provider = name, model, "Creating provider");
    Ok(Arc::new(OpenAIProvider::new(
        &provider.api_key,
        provider.api_base.as_deref(),
        model,
        config.agent.max_tokens,
        config.agent.temperature,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_provider_requires_key() {
        let mut config = Config::default();
        assert!(create_provider(&config, "m").is_err());
        config.providers.get_mut("openrouter").unwrap().api_key = "sk".to_string();
        assert!(create_provider(&config, "m").is_ok());
    }
}
