//! Google Gemini ASR client (spec §4.3 C3 provider backend).

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, warn};

use crate::audio::AudioChunk;
use crate::error::{AutosubError, Result};
use crate::transcribe::Transcriber;
use crate::types::Segment;

const GENERATE_CONTENT_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent";
const FILES_UPLOAD_URL: &str = "https://generativelanguage.googleapis.com/upload/v1beta/files";
const INLINE_SIZE_THRESHOLD: usize = 20 * 1024 * 1024;
const MAX_FILE_SIZE: usize = 200 * 1024 * 1024;
const MAX_RETRIES: u32 = 3;
const BASE_DELAY_MS: u64 = 1000;

/// Google Gemini Audio API client.
pub struct GeminiClient {
    client: reqwest::Client,
    api_key: String,
    language: Option<String>,
}

impl GeminiClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            language: None,
        }
    }

    pub fn with_language(mut self, language: String) -> Self {
        self.language = Some(language);
        self
    }

    fn get_mime_type(path: &Path) -> &'static str {
        match path.extension().and_then(|e| e.to_str()) {
            Some("wav") => "audio/wav",
            Some("mp3") => "audio/mpeg",
            Some("m4a") => "audio/mp4",
            Some("flac") => "audio/flac",
            Some("ogg") => "audio/ogg",
            Some("aac") => "audio/aac",
            Some("aiff") => "audio/aiff",
            _ => "audio/wav",
        }
    }

    /// Build the transcription prompt, priming it with the rolling-context
    /// tail from the previous batch (spec §4.3).
    fn build_prompt(&self, context: &str) -> String {
        let mut prompt = String::new();

        prompt.push_str("Transcribe this audio with precise timestamps.\n\n");
        prompt.push_str("Format each line as:\n");
        prompt.push_str("[MM:SS] Text of what was said\n\n");

        if let Some(ref lang) = self.language {
            prompt.push_str(&format!("The audio is in {lang} language.\n"));
        }

        if !context.is_empty() {
            prompt.push_str("The audio immediately continues this prior transcript (for ");
            prompt.push_str("vocabulary and continuity only, do not repeat it):\n");
            prompt.push_str(context);
            prompt.push('\n');
        }

        prompt.push_str("\nProvide accurate timestamps for each segment of speech.");

        prompt
    }

    async fn transcribe_inline(&self, chunk: &AudioChunk, context: &str) -> Result<Vec<Segment>> {
        let audio_bytes = fs::read(&chunk.path).await?;
        let base64_audio = base64::engine::general_purpose::STANDARD.encode(&audio_bytes);
        let mime_type = Self::get_mime_type(&chunk.path);

        let request = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![
                    Part::Text { text: self.build_prompt(context) },
                    Part::InlineData {
                        inline_data: InlineData {
                            mime_type: mime_type.to_string(),
                            data: base64_audio,
                        },
                    },
                ],
            }],
            generation_config: Some(GenerationConfig {
                temperature: Some(0.0),
                max_output_tokens: Some(8192),
            }),
        };

        self.call_generate_content(request, chunk).await
    }

    async fn upload_file(&self, path: &Path) -> Result<String> {
        let file_bytes = fs::read(path).await?;
        let mime_type = Self::get_mime_type(path);
        let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("audio.wav");

        let url = format!("{FILES_UPLOAD_URL}?key={}", self.api_key);

        let response = self
            .client
            .post(&url)
            .header("X-Goog-Upload-Protocol", "raw")
            .header("X-Goog-Upload-Command", "upload, finalize")
            .header("Content-Type", mime_type)
            .header("X-Goog-Upload-File-Name", file_name)
            .body(file_bytes)
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AutosubError::Api(format!("Gemini file upload failed: {error_text}")));
        }

        let upload_response: FileUploadResponse = response.json().await?;
        Ok(upload_response.file.uri)
    }

    async fn transcribe_file(&self, file_uri: &str, chunk: &AudioChunk, context: &str) -> Result<Vec<Segment>> {
        let request = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![
                    Part::Text { text: self.build_prompt(context) },
                    Part::FileData {
                        file_data: FileData {
                            mime_type: "audio/wav".to_string(),
                            file_uri: file_uri.to_string(),
                        },
                    },
                ],
            }],
            generation_config: Some(GenerationConfig {
                temperature: Some(0.0),
                max_output_tokens: Some(8192),
            }),
        };

        self.call_generate_content(request, chunk).await
    }

    async fn call_generate_content(&self, request: GenerateContentRequest, chunk: &AudioChunk) -> Result<Vec<Segment>> {
        let url = format!("{GENERATE_CONTENT_URL}?key={}", self.api_key);

        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                let delay = BASE_DELAY_MS * 2u64.pow(attempt - 1);
                debug!("Retry attempt {} after {}ms delay", attempt, delay);
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }

            let response = self
                .client
                .post(&url)
                .header("Content-Type", "application/json")
                .json(&request)
                .send()
                .await;

            match response {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        let body = resp.text().await?;
                        let parsed: GenerateContentResponse = serde_json::from_str(&body)?;
                        return Ok(self.parse_response(parsed, chunk));
                    }

                    let error_body = resp.text().await.unwrap_or_default();

                    if status.as_u16() >= 400 && status.as_u16() < 500 {
                        return Err(AutosubError::Api(format!("Gemini API error ({status}): {error_body}")));
                    }

                    warn!("Gemini API server error ({}): {}", status, error_body);
                    last_error = Some(AutosubError::Api(format!("Gemini API server error: {status}")));
                }
                Err(e) => {
                    warn!("Gemini API request failed: {}", e);
                    last_error = Some(e.into());
                }
            }
        }

        Err(last_error.unwrap_or_else(|| AutosubError::Api("Unknown error".to_string())))
    }

    fn parse_response(&self, response: GenerateContentResponse, chunk: &AudioChunk) -> Vec<Segment> {
        let text = response
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| match p {
                ResponsePart::Text { text } => text.as_str(),
            })
            .unwrap_or("");

        self.parse_timestamped_text(text, chunk)
    }

    /// Parse timestamped text like "[00:15] Hello world" into segments.
    fn parse_timestamped_text(&self, text: &str, chunk: &AudioChunk) -> Vec<Segment> {
        let mut segments: Vec<Segment> = Vec::new();

        let timestamp_re =
            Regex::new(r"\[(\d{1,2}):(\d{2})(?::(\d{2}))?\]\s*([^\[]+)").expect("invalid regex");

        for cap in timestamp_re.captures_iter(text) {
            let first: u64 = cap.get(1).unwrap().as_str().parse().unwrap_or(0);
            let second: u64 = cap.get(2).unwrap().as_str().parse().unwrap_or(0);

            let timestamp_secs = if let Some(s) = cap.get(3) {
                let third: u64 = s.as_str().parse().unwrap_or(0);
                first * 3600 + second * 60 + third
            } else {
                first * 60 + second
            };

            let start = chunk.interval.start_sec + timestamp_secs as f64;
            let raw_text = cap.get(4).map(|m| m.as_str().trim()).unwrap_or("");

            if raw_text.is_empty() {
                continue;
            }

            if let Some(prev) = segments.last_mut() {
                prev.end_sec = start;
            }

            let mut segment = Segment::new(start, chunk.interval.end_sec, raw_text.to_string());
            segment.end_sec = chunk.interval.end_sec;
            segments.push(segment);
        }

        if segments.is_empty() && !text.trim().is_empty() {
            let clean_text = text
                .lines()
                .filter(|line| !line.trim().is_empty())
                .map(|line| line.trim())
                .collect::<Vec<_>>()
                .join(" ");

            segments.push(Segment::new(chunk.interval.start_sec, chunk.interval.end_sec, clean_text));
        }

        segments
    }
}

#[async_trait]
impl Transcriber for GeminiClient {
    async fn transcribe(&self, chunk: &AudioChunk, context: &str) -> Result<Vec<Segment>> {
        debug!("Transcribing chunk {} with Gemini: {:?}", chunk.index, chunk.path);

        let metadata = fs::metadata(&chunk.path).await?;
        let file_size = metadata.len() as usize;

        if file_size > MAX_FILE_SIZE {
            return Err(AutosubError::AsrChunkFailed(format!(
                "file too large: {file_size} bytes (max {MAX_FILE_SIZE} bytes)"
            )));
        }

        let segments = if file_size < INLINE_SIZE_THRESHOLD {
            self.transcribe_inline(chunk, context)
                .await
                .map_err(|e| AutosubError::AsrChunkFailed(e.to_string()))?
        } else {
            let file_uri = self
                .upload_file(&chunk.path)
                .await
                .map_err(|e| AutosubError::AsrChunkFailed(e.to_string()))?;
            self.transcribe_file(&file_uri, chunk, context)
                .await
                .map_err(|e| AutosubError::AsrChunkFailed(e.to_string()))?
        };

        debug!("Gemini returned {} segments for chunk {}", segments.len(), chunk.index);

        Ok(segments)
    }

    fn name(&self) -> &'static str {
        "Google Gemini"
    }

    fn max_file_size(&self) -> usize {
        MAX_FILE_SIZE
    }

    fn supported_formats(&self) -> &[&str] {
        &["wav", "mp3", "aiff", "aac", "ogg", "flac"]
    }
}

#[derive(Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part {
    Text { text: String },
    InlineData { inline_data: InlineData },
    FileData { file_data: FileData },
}

#[derive(Serialize)]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Serialize)]
struct FileData {
    mime_type: String,
    file_uri: String,
}

#[derive(Serialize)]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Deserialize)]
struct CandidateContent {
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ResponsePart {
    Text { text: String },
}

#[derive(Deserialize)]
struct FileUploadResponse {
    file: UploadedFile,
}

#[derive(Deserialize)]
struct UploadedFile {
    uri: String,
}
