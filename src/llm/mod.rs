//! Generic text-completion capability, consumed by the hallucination
//! scrubber (C4) and the review pass (C7) the same way `transcribe` and
//! `translate` consume their own provider traits.

pub mod gemini;

use async_trait::async_trait;

pub use gemini::GeminiLlmClient;

use crate::error::Result;

/// A provider that turns a system instruction plus a user prompt into a
/// single text completion. Deliberately narrower than `Translator` or
/// `Transcriber`: callers own all batching/parsing, this trait is just the
/// text-in/text-out seam.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;

    fn name(&self) -> &'static str;
}

/// Create an LLM provider using the available API key.
pub fn create_llm_provider(gemini_api_key: Option<&str>) -> Result<Box<dyn LlmProvider>> {
    if let Some(key) = gemini_api_key {
        return Ok(Box::new(GeminiLlmClient::new(key.to_string())));
    }

    Err(crate::error::AutosubError::Config(
        "No API key available for LLM capability. Set GEMINI_API_KEY.".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_llm_provider_with_key() {
        let provider = create_llm_provider(Some("test-key"));
        assert!(provider.is_ok());
        assert_eq!(provider.unwrap().name(), "gemini");
    }

    #[test]
    fn test_create_llm_provider_no_key() {
        let provider = create_llm_provider(None);
        assert!(provider.is_err());
    }
}
