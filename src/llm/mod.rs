//! LLM integration for Fit Assist.
//!
//! Supports:
//! - **Gemini**: Generative Language `generateContent` REST API over reqwest
//!
//! Handlers only see the [`LlmProvider`] trait, so tests can swap in stubs.

mod gemini;

pub use gemini::GeminiProvider;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::LlmError;

/// Default Generative Language API endpoint.
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Default model for chat replies.
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash";

/// Text-generation backend.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Model identifier, for logs.
    fn model_name(&self) -> &str;

    /// Generate a reply for a single user prompt.
    async fn generate(&self, prompt: &str) -> Result<String, LlmError>;
}

/// Supported LLM backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackend {
    Gemini,
}

/// Configuration for creating an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub backend: LlmBackend,
    pub api_key: secrecy::SecretString,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl LlmConfig {
    /// Gemini config with default model, endpoint and timeout.
    pub fn gemini(api_key: secrecy::SecretString) -> Self {
        Self {
            backend: LlmBackend::Gemini,
            api_key,
            model: DEFAULT_GEMINI_MODEL.to_string(),
            base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}

/// Create an LLM provider from configuration.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    match config.backend {
        LlmBackend::Gemini => {
            let provider = GeminiProvider::new(config)?;
            tracing::info!("Using Gemini (model: {})", config.model);
            Ok(Arc::new(provider))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_gemini_provider() {
        let config = LlmConfig::gemini(secrecy::SecretString::from("test-key".to_string()));
        let provider = create_provider(&config);
        assert!(provider.is_ok());
        assert_eq!(provider.unwrap().model_name(), "gemini-1.5-flash");
    }

    #[test]
    fn test_custom_model_name_is_reported() {
        let config = LlmConfig {
            model: "gemini-2.0-flash".to_string(),
            ..LlmConfig::gemini(secrecy::SecretString::from("test-key".to_string()))
        };
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.model_name(), "gemini-2.0-flash");
    }
}
