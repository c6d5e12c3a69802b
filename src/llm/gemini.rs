//! Gemini-based text completion, sharing the generateContent wire shape
//! used by `transcribe::gemini` and `translate::gemini`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{AutosubError, Result};
use crate::llm::LlmProvider;

const MAX_RETRIES: u32 = 3;
const BASE_DELAY_MS: u64 = 1000;

pub struct GeminiLlmClient {
    client: Client,
    api_key: String,
    model: String,
}

impl GeminiLlmClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model: "gemini-2.0-flash".to_string(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

#[async_trait]
impl LlmProvider for GeminiLlmClient {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
            self.model, self.api_key
        );

        let request = GenerateContentRequest {
            system_instruction: if system_prompt.is_empty() {
                None
            } else {
                Some(SystemInstruction {
                    parts: vec![TextPart { text: system_prompt.to_string() }],
                })
            },
            contents: vec![Content {
                parts: vec![TextPart { text: user_prompt.to_string() }],
            }],
            generation_config: GenerationConfig { temperature: 0.0 },
        };

        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                let delay = BASE_DELAY_MS * 2u64.pow(attempt - 1);
                debug!("LLM retry attempt {} after {}ms delay", attempt, delay);
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
                        let text = parsed
                            .candidates
                            .first()
                            .and_then(|c| c.content.parts.first())
                            .map(|p| p.text.clone())
                            .unwrap_or_default();
                        return Ok(text);
                    }

                    let error_body = resp.text().await.unwrap_or_default();
                    if status.as_u16() >= 400 && status.as_u16() < 500 {
                        return Err(AutosubError::Api(format!("Gemini LLM error ({status}): {error_body}")));
                    }
                    warn!("Gemini LLM server error ({}): {}", status, error_body);
                    last_error = Some(AutosubError::Api(format!("Gemini LLM server error: {status}")));
                }
                Err(e) => {
                    warn!("Gemini LLM request failed: {}", e);
                    last_error = Some(e.into());
                }
            }
        }

        Err(last_error.unwrap_or_else(|| AutosubError::Api("Unknown error".to_string())))
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}

#[derive(Serialize)]
struct GenerateContentRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<SystemInstruction>,
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct SystemInstruction {
    parts: Vec<TextPart>,
}

#[derive(Serialize)]
struct Content {
    parts: Vec<TextPart>,
}

#[derive(Serialize, Deserialize, Clone)]
struct TextPart {
    text: String,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    candidates: Vec<ResponseCandidate>,
}

#[derive(Deserialize)]
struct ResponseCandidate {
    content: ResponseContent,
}

#[derive(Deserialize)]
struct ResponseContent {
    parts: Vec<TextPart>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name() {
        let client = GeminiLlmClient::new("key".to_string());
        assert_eq!(client.name(), "gemini");
    }

    #[test]
    fn test_with_model() {
        let client = GeminiLlmClient::new("key".to_string()).with_model("gemini-1.5-pro");
        assert_eq!(client.model, "gemini-1.5-pro");
    }
}
