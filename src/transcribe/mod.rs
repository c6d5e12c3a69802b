pub mod gemini;
pub mod orchestrator;
pub mod scrub;
pub mod segment;
pub mod whisper;

pub use gemini::GeminiClient;
pub use orchestrator::TranscriptionOrchestrator;
pub use scrub::scrub_hallucinations;
pub use whisper::WhisperClient;

use async_trait::async_trait;

use crate::audio::AudioChunk;
use crate::config::{Config, Provider};
use crate::error::Result;
use crate::types::Segment;

/// Trait for ASR providers (Whisper, Gemini, ...). Each call transcribes one
/// chunk, optionally primed with a rolling-context prompt built from the
/// tail of the previous chunk's output (spec §4.3 C3).
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe an audio chunk, returning segments with timestamps
    /// already offset into the original media's timeline.
    async fn transcribe(&self, chunk: &AudioChunk, context: &str) -> Result<Vec<Segment>>;

    fn name(&self) -> &'static str;

    fn max_file_size(&self) -> usize;

    fn supported_formats(&self) -> &[&str];
}

/// Factory function to create a transcriber based on the provider.
pub fn create_transcriber(provider: Provider, config: &Config) -> Result<Box<dyn Transcriber>> {
    match provider {
        Provider::Whisper => {
            let api_key = config.openai_api_key.as_ref().ok_or_else(|| {
                crate::error::AutosubError::Config(
                    "OpenAI API key not set. Set OPENAI_API_KEY environment variable.".to_string(),
                )
            })?;
            Ok(Box::new(WhisperClient::new(api_key.clone())))
        }
        Provider::Gemini => {
            let api_key = config.gemini_api_key.as_ref().ok_or_else(|| {
                crate::error::AutosubError::Config(
                    "Gemini API key not set. Set GEMINI_API_KEY environment variable.".to_string(),
                )
            })?;
            Ok(Box::new(GeminiClient::new(api_key.clone())))
        }
    }
}
