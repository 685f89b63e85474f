//! Generative model providers.
//!
//! Every board member answer is a single non-streaming completion; providers
//! only need to turn a prompt into text.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{LlmConfig, ProviderKind};
use crate::errors::{ConfigError, LlmError};

pub mod gemini;
pub mod openai;

pub use gemini::GeminiProvider;
pub use openai::OpenAiProvider;

#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Provider identifier used in logs and errors.
    fn name(&self) -> &str;

    /// Run one completion. An answer without text is an empty string.
    async fn generate(&self, prompt: &str) -> Result<String, LlmError>;
}

pub type SharedProvider = Arc<dyn ModelProvider>;

/// Build the provider selected by `llm.provider`.
pub fn build_provider(config: &LlmConfig) -> Result<SharedProvider, ConfigError> {
    match config.provider {
        ProviderKind::Gemini => {
            let key = config
                .gemini_api_key
                .as_deref()
                .ok_or(ConfigError::Missing { key: "GEMINI_API_KEY" })?;
            let mut provider = GeminiProvider::new(key);
            if let Some(model) = &config.model {
                provider = provider.with_model(model);
            }
            if let Some(base) = &config.api_base {
                provider = provider.with_api_base(base);
            }
            provider = provider.with_temperature(config.temperature);
            Ok(Arc::new(provider))
        }
        ProviderKind::OpenAi => {
            let key = config
                .openai_api_key
                .as_deref()
                .ok_or(ConfigError::Missing { key: "OPENAI_API_KEY" })?;
            let mut provider = OpenAiProvider::new(key);
            if let Some(model) = &config.model {
                provider = provider.with_model(model);
            }
            if let Some(base) = &config.api_base {
                provider = provider.with_api_base(base);
            }
            provider = provider.with_temperature(config.temperature);
            Ok(Arc::new(provider))
        }
    }
}

/// Check a provider response status, turning failures into `LlmError::Upstream`.
pub(crate) async fn checked(
    provider: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, LlmError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(LlmError::Upstream {
        provider: provider.to_string(),
        status: status.as_u16(),
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_gemini_requires_key() {
        let config = LlmConfig::default();
        let err = build_provider(&config).err().unwrap();
        assert!(matches!(err, ConfigError::Missing { key: "GEMINI_API_KEY" }));
    }

    #[test]
    fn test_build_openai_provider() {
        let config = LlmConfig {
            provider: ProviderKind::OpenAi,
            openai_api_key: Some("sk-test".into()),
            ..Default::default()
        };
        let provider = build_provider(&config).unwrap();
        assert_eq!(provider.name(), "openai");
    }

    #[test]
    fn test_build_gemini_provider() {
        let config = LlmConfig {
            gemini_api_key: Some("g-test".into()),
            model: Some("gemini-1.5-pro".into()),
            ..Default::default()
        };
        let provider = build_provider(&config).unwrap();
        assert_eq!(provider.name(), "gemini");
    }
}
