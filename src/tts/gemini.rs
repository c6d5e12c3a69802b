//! Gemini text-to-speech client, sharing the generateContent wire shape
//! used by `transcribe::gemini` and `llm::gemini`, with audio response
//! modality and a per-batch voice/model session.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cancel::CancelToken;
use crate::error::{AutosubError, Result};
use crate::tts::{DubClip, TtsBatchResult, TtsProvider, TtsRequestSegment};

const DEFAULT_MODEL: &str = "gemini-2.5-flash-preview-tts";
const MAX_RETRIES: u32 = 3;
const BASE_DELAY_MS: u64 = 1000;

pub struct GeminiTtsClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl GeminiTtsClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model: DEFAULT_MODEL.to_string(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

#[async_trait]
impl TtsProvider for GeminiTtsClient {
    async fn synthesize(
        &self,
        segments: &[TtsRequestSegment],
        voice: &str,
        quality: &str,
        format: &str,
        cancel: &CancelToken,
    ) -> Result<TtsBatchResult> {
        if segments.is_empty() {
            return Ok(TtsBatchResult { voice: voice.to_string(), model: self.model.clone(), clips: Vec::new() });
        }

        cancel.check()?;

        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
            self.model, self.api_key
        );

        let mut clips = Vec::with_capacity(segments.len());

        for segment in segments {
            cancel.check()?;

            let request = TtsRequest {
                contents: vec![TtsContent { parts: vec![TtsTextPart { text: segment.text.clone() }] }],
                generation_config: TtsGenerationConfig {
                    response_modalities: vec!["AUDIO".to_string()],
                    speech_config: SpeechConfig {
                        voice_config: VoiceConfig {
                            prebuilt_voice_config: PrebuiltVoiceConfig { voice_name: voice.to_string() },
                        },
                    },
                },
            };

            let audio_bytes = self.call_with_retry(&url, &request).await.map_err(|e| {
                AutosubError::TtsFailed(format!("segment {}: {}", segment.index, e))
            })?;

            clips.push(DubClip {
                segment_index: segment.index,
                audio_bytes,
                container_format: format.to_string(),
            });
        }

        let _ = quality;

        Ok(TtsBatchResult { voice: voice.to_string(), model: self.model.clone(), clips })
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}

impl GeminiTtsClient {
    async fn call_with_retry(&self, url: &str, request: &TtsRequest) -> Result<Vec<u8>> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                let delay = BASE_DELAY_MS * 2u64.pow(attempt - 1);
                debug!("TTS retry attempt {} after {}ms delay", attempt, delay);
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }

            let response = self.client.post(url).json(request).send().await;

            match response {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        let body = resp.text().await?;
                        let parsed: TtsResponse = serde_json::from_str(&body)?;
                        let audio_b64 = parsed
                            .candidates
                            .first()
                            .and_then(|c| c.content.parts.first())
                            .and_then(|p| p.inline_data.as_ref())
                            .map(|d| d.data.clone())
                            .ok_or_else(|| AutosubError::TtsFailed("no audio payload in response".to_string()))?;

                        return base64::engine::general_purpose::STANDARD
                            .decode(audio_b64)
                            .map_err(|e| AutosubError::TtsFailed(format!("invalid base64 audio: {e}")));
                    }

                    let error_body = resp.text().await.unwrap_or_default();
                    if status.as_u16() >= 400 && status.as_u16() < 500 {
                        return Err(AutosubError::Api(format!("Gemini TTS error ({status}): {error_body}")));
                    }
                    warn!("Gemini TTS server error ({}): {}", status, error_body);
                    last_error = Some(AutosubError::Api(format!("Gemini TTS server error: {status}")));
                }
                Err(e) => {
                    warn!("Gemini TTS request failed: {}", e);
                    last_error = Some(e.into());
                }
            }
        }

        Err(last_error.unwrap_or_else(|| AutosubError::Api("Unknown error".to_string())))
    }
}

#[derive(Serialize)]
struct TtsRequest {
    contents: Vec<TtsContent>,
    generation_config: TtsGenerationConfig,
}

#[derive(Serialize)]
struct TtsContent {
    parts: Vec<TtsTextPart>,
}

#[derive(Serialize)]
struct TtsTextPart {
    text: String,
}

#[derive(Serialize)]
struct TtsGenerationConfig {
    response_modalities: Vec<String>,
    speech_config: SpeechConfig,
}

#[derive(Serialize)]
struct SpeechConfig {
    voice_config: VoiceConfig,
}

#[derive(Serialize)]
struct VoiceConfig {
    prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Serialize)]
struct PrebuiltVoiceConfig {
    voice_name: String,
}

#[derive(Deserialize)]
struct TtsResponse {
    candidates: Vec<TtsCandidate>,
}

#[derive(Deserialize)]
struct TtsCandidate {
    content: TtsResponseContent,
}

#[derive(Deserialize)]
struct TtsResponseContent {
    parts: Vec<TtsResponsePart>,
}

#[derive(Deserialize)]
struct TtsResponsePart {
    #[serde(rename = "inlineData")]
    inline_data: Option<TtsInlineData>,
}

#[derive(Deserialize)]
struct TtsInlineData {
    data: String,
}
