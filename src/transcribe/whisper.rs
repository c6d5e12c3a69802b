//! OpenAI Whisper ASR client (spec §4.3 C3 provider backend).

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tokio::fs;
use tracing::{debug, warn};

use crate::audio::AudioChunk;
use crate::error::{AutosubError, Result};
use crate::transcribe::Transcriber;
use crate::types::{Segment, WordTimestamp};

const WHISPER_API_URL: &str = "https://api.openai.com/v1/audio/transcriptions";
const MAX_FILE_SIZE: usize = 25 * 1024 * 1024;
const MAX_RETRIES: u32 = 3;
const BASE_DELAY_MS: u64 = 1000;

/// Whisper model variants.
#[derive(Debug, Clone, Copy, Default)]
pub enum WhisperModel {
    #[default]
    Whisper1,
    Gpt4oTranscribe,
    Gpt4oMiniTranscribe,
}

impl WhisperModel {
    fn as_str(&self) -> &'static str {
        match self {
            WhisperModel::Whisper1 => "whisper-1",
            WhisperModel::Gpt4oTranscribe => "gpt-4o-transcribe",
            WhisperModel::Gpt4oMiniTranscribe => "gpt-4o-mini-transcribe",
        }
    }
}

/// OpenAI Whisper API client.
pub struct WhisperClient {
    client: reqwest::Client,
    api_key: String,
    model: WhisperModel,
    language: Option<String>,
}

impl WhisperClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model: WhisperModel::default(),
            language: None,
        }
    }

    pub fn with_model(mut self, model: WhisperModel) -> Self {
        self.model = model;
        self
    }

    pub fn with_language(mut self, language: String) -> Self {
        self.language = Some(language);
        self
    }

    /// Build the multipart form, priming the rolling-context prompt for
    /// continuity across chunk/batch boundaries (spec §4.3).
    async fn build_form(&self, audio_path: &Path, context: &str) -> Result<Form> {
        let file_bytes = fs::read(audio_path).await?;
        let file_name = audio_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("audio.wav")
            .to_string();

        let mime_type = match audio_path.extension().and_then(|e| e.to_str()) {
            Some("wav") => "audio/wav",
            Some("mp3") => "audio/mpeg",
            Some("m4a") => "audio/mp4",
            Some("flac") => "audio/flac",
            Some("ogg") => "audio/ogg",
            Some("webm") => "audio/webm",
            _ => "application/octet-stream",
        };

        let file_part = Part::bytes(file_bytes).file_name(file_name).mime_str(mime_type)?;

        let mut form = Form::new()
            .part("file", file_part)
            .text("model", self.model.as_str())
            .text("response_format", "verbose_json")
            .text("timestamp_granularities[]", "segment")
            .text("timestamp_granularities[]", "word");

        if let Some(ref lang) = self.language {
            form = form.text("language", lang.clone());
        }

        if !context.is_empty() {
            form = form.text("prompt", context.to_string());
        }

        Ok(form)
    }

    async fn call_api(&self, form: Form) -> Result<WhisperResponse> {
        let response = self
            .client
            .post(WHISPER_API_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        debug!("Whisper API response status: {}", status);

        if status.is_success() {
            let body = response.text().await?;
            let parsed: WhisperResponse = serde_json::from_str(&body)?;
            return Ok(parsed);
        }

        let error_body = response.text().await.unwrap_or_default();

        if let Ok(api_error) = serde_json::from_str::<ApiErrorResponse>(&error_body) {
            return Err(AutosubError::Api(format!(
                "Whisper API error: {} ({})",
                api_error.error.message, api_error.error.r#type
            )));
        }

        Err(AutosubError::Api(format!("Whisper API error ({status}): {error_body}")))
    }

    async fn transcribe_with_retry(&self, audio_path: &Path, context: &str) -> Result<WhisperResponse> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                let delay = BASE_DELAY_MS * 2u64.pow(attempt - 1);
                debug!("Retry attempt {} after {}ms delay", attempt, delay);
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }

            let form = self.build_form(audio_path, context).await?;

            match self.call_api(form).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    let error_str = e.to_string();
                    if error_str.contains("API error (4") {
                        return Err(e);
                    }
                    warn!("Attempt {} failed: {}", attempt + 1, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| AutosubError::Api("Unknown error".to_string())))
    }

    fn parse_response(&self, response: WhisperResponse, chunk: &AudioChunk) -> Vec<Segment> {
        let chunk_start = chunk.interval.start_sec;
        let mut segments: Vec<Segment> = Vec::new();

        if let Some(api_segments) = response.segments {
            for seg in api_segments {
                let mut segment = Segment::new(
                    chunk_start + seg.start,
                    chunk_start + seg.end,
                    seg.text.trim().to_string(),
                );
                segment.avg_logprob = seg.avg_logprob;
                segment.no_speech_prob = seg.no_speech_prob;
                segments.push(segment);
            }
        } else if !response.text.trim().is_empty() {
            segments.push(Segment::new(
                chunk_start,
                chunk.interval.end_sec,
                response.text.trim().to_string(),
            ));
        }

        if let Some(words) = response.words {
            let word_timestamps: Vec<WordTimestamp> = words
                .into_iter()
                .map(|w| WordTimestamp {
                    text: w.word,
                    start_sec: chunk_start + w.start,
                    end_sec: chunk_start + w.end,
                })
                .collect();

            // Assign each word to the segment whose interval contains it.
            for word in word_timestamps {
                if let Some(target) = segments
                    .iter_mut()
                    .find(|s| word.start_sec >= s.start_sec && word.start_sec < s.end_sec)
                {
                    target.words.push(word);
                } else if let Some(first) = segments.first_mut() {
                    first.words.push(word);
                }
            }
        }

        segments
    }
}

#[async_trait]
impl Transcriber for WhisperClient {
    async fn transcribe(&self, chunk: &AudioChunk, context: &str) -> Result<Vec<Segment>> {
        debug!("Transcribing chunk {} with Whisper: {:?}", chunk.index, chunk.path);

        let metadata = fs::metadata(&chunk.path).await?;
        if metadata.len() as usize > MAX_FILE_SIZE {
            return Err(AutosubError::AsrChunkFailed(format!(
                "file too large for Whisper API: {} bytes (max {} bytes)",
                metadata.len(),
                MAX_FILE_SIZE
            )));
        }

        let response = self
            .transcribe_with_retry(&chunk.path, context)
            .await
            .map_err(|e| AutosubError::AsrChunkFailed(e.to_string()))?;
        let segments = self.parse_response(response, chunk);

        debug!("Whisper returned {} segments for chunk {}", segments.len(), chunk.index);

        Ok(segments)
    }

    fn name(&self) -> &'static str {
        "OpenAI Whisper"
    }

    fn max_file_size(&self) -> usize {
        MAX_FILE_SIZE
    }

    fn supported_formats(&self) -> &[&str] {
        &["mp3", "mp4", "mpeg", "mpga", "m4a", "wav", "webm"]
    }
}

#[derive(Debug, Deserialize)]
struct WhisperResponse {
    text: String,
    #[serde(default)]
    segments: Option<Vec<WhisperSegment>>,
    #[serde(default)]
    words: Option<Vec<WhisperWord>>,
}

#[derive(Debug, Deserialize)]
struct WhisperSegment {
    start: f64,
    end: f64,
    text: String,
    #[serde(default)]
    avg_logprob: Option<f64>,
    #[serde(default)]
    no_speech_prob: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct WhisperWord {
    word: String,
    start: f64,
    end: f64,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
    r#type: String,
}
