//! Text-to-speech capability (spec §4.8 C8), mirroring the
//! `transcribe::create_transcriber`/`translate::create_translator` factory
//! pattern for a third AI capability.

pub mod gemini;

use async_trait::async_trait;

pub use gemini::GeminiTtsClient;

use crate::cancel::CancelToken;
use crate::error::Result;

/// One line of input to a TTS batch request.
#[derive(Debug, Clone)]
pub struct TtsRequestSegment {
    pub index: usize,
    pub text: String,
    pub target_duration_sec: Option<f64>,
}

/// Raw synthesized audio for one segment, before duration fitting (spec §3
/// DubClip).
#[derive(Debug, Clone)]
pub struct DubClip {
    pub segment_index: usize,
    pub audio_bytes: Vec<u8>,
    pub container_format: String,
}

/// The ordered result of one batch TTS request, plus the session-level
/// voice/model metadata the provider actually used.
#[derive(Debug, Clone)]
pub struct TtsBatchResult {
    pub voice: String,
    pub model: String,
    pub clips: Vec<DubClip>,
}

#[async_trait]
pub trait TtsProvider: Send + Sync {
    async fn synthesize(
        &self,
        segments: &[TtsRequestSegment],
        voice: &str,
        quality: &str,
        format: &str,
        cancel: &CancelToken,
    ) -> Result<TtsBatchResult>;

    fn name(&self) -> &'static str;
}

/// Create a TTS synthesizer using the available API key.
pub fn create_synthesizer(gemini_api_key: Option<&str>) -> Result<Box<dyn TtsProvider>> {
    if let Some(key) = gemini_api_key {
        return Ok(Box::new(GeminiTtsClient::new(key.to_string())));
    }

    Err(crate::error::AutosubError::Config(
        "No API key available for text-to-speech. Set GEMINI_API_KEY.".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_synthesizer_with_key() {
        let synth = create_synthesizer(Some("test-key"));
        assert!(synth.is_ok());
        assert_eq!(synth.unwrap().name(), "gemini");
    }

    #[test]
    fn test_create_synthesizer_no_key() {
        assert!(create_synthesizer(None).is_err());
    }
}
