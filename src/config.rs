use crate::error::{AutosubError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Srt,
    Vtt,
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Srt => write!(f, "srt"),
            OutputFormat::Vtt => write!(f, "vtt"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "srt" => Ok(OutputFormat::Srt),
            "vtt" => Ok(OutputFormat::Vtt),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown format: {}. Use 'srt', 'vtt', or 'json'", s)),
        }
    }
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Srt => "srt",
            OutputFormat::Vtt => "vtt",
            OutputFormat::Json => "json",
        }
    }
}

/// Which language(s) a subtitle document renders (spec §4.7/§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubtitleMode {
    #[default]
    Original,
    Translated,
    Dual,
}

impl std::str::FromStr for SubtitleMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "original" => Ok(SubtitleMode::Original),
            "translated" => Ok(SubtitleMode::Translated),
            "dual" => Ok(SubtitleMode::Dual),
            _ => Err(format!(
                "Unknown subtitle mode: {}. Use 'original', 'translated', or 'dual'",
                s
            )),
        }
    }
}

/// ASR/TTS provider selection (spec §6: "provider selection is out of
/// scope for the core... resolved via a policy object it receives at
/// construction"). Kept as a plain enum here since this crate ships exactly
/// two reference HTTP backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Whisper,
    #[default]
    Gemini,
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Provider::Whisper => write!(f, "whisper"),
            Provider::Gemini => write!(f, "gemini"),
        }
    }
}

impl std::str::FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "whisper" => Ok(Provider::Whisper),
            "gemini" => Ok(Provider::Gemini),
            _ => Err(format!("Unknown provider: {}. Use 'whisper' or 'gemini'", s)),
        }
    }
}

/// The maximum dub-clip compression ratio varies by TTS provider (spec
/// §4.8, §9 Open Question: "exposed as configuration rather than guess
/// intent"). `Standard` matches the spec's baseline 1.35; `Extended`
/// matches providers whose output tends to run long (spec's "1.8 for
/// provider B").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DubCompressionProfile {
    #[default]
    Standard,
    Extended,
}

impl DubCompressionProfile {
    pub fn max_ratio(&self) -> f64 {
        match self {
            DubCompressionProfile::Standard => 1.35,
            DubCompressionProfile::Extended => 1.8,
        }
    }
}

/// All tunable constants named in spec §6, plus the ambient API-key/format
/// settings the teacher's `Config` already carried.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub openai_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
    pub default_format: OutputFormat,
    pub default_subtitle_mode: SubtitleMode,

    /// Bounded-parallelism pool size shared by the ASR orchestrator and the
    /// gap repair engine (`WHISPER_PARALLEL`).
    pub whisper_parallel: usize,
    /// Chunks processed per rolling-context batch (`TRANSCRIPTION_BATCH_SIZE`).
    pub transcription_batch_size: usize,
    /// Translator's own worker pool size.
    pub translate_parallel: usize,

    pub min_chunk_duration_sec: f64,
    pub max_chunk_duration_sec: f64,
    pub pre_pad_sec: f64,
    pub post_pad_sec: f64,
    pub merge_gap_sec: f64,
    pub max_speechless_sec: f64,
    pub vad_normalization_min_gap_sec: f64,
    pub vad_normalization_min_duration_sec: f64,
    /// 0 (least aggressive) ..= 3 (most aggressive) VAD sensitivity knob.
    pub vad_aggressiveness: u8,

    pub gap_sec: f64,
    pub max_gap_repair_iterations: u32,

    pub subtitle_gap_threshold: f64,
    pub max_gap_to_fuse: f64,
    pub min_words_to_fuse: usize,

    pub max_prompt_chars: usize,
    /// Segments per translation request window (spec §4.5).
    pub translation_window_size: usize,
    pub review_batch_size: usize,
    pub review_overlap_ctx: usize,

    /// Segments whose `no_speech_prob` exceeds this are dropped outright
    /// (spec §4.4 hallucination scrub).
    pub hallucination_no_speech_prob_threshold: f64,
    /// Segments whose `avg_logprob` is below this, combined with a known
    /// stock phrase match, are dropped.
    pub hallucination_logprob_threshold: f64,

    pub min_dub_silence_gap_sec: f64,
    pub dub_compression_profile: DubCompressionProfile,
    pub compression_tolerance: f64,

    pub concurrency: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            gemini_api_key: None,
            default_format: OutputFormat::default(),
            default_subtitle_mode: SubtitleMode::default(),

            whisper_parallel: 3,
            transcription_batch_size: 50,
            translate_parallel: 4,

            min_chunk_duration_sec: 8.0,
            max_chunk_duration_sec: 15.0,
            pre_pad_sec: 0.10,
            post_pad_sec: 0.15,
            merge_gap_sec: 0.5,
            max_speechless_sec: 15.0,
            vad_normalization_min_gap_sec: 0.5,
            vad_normalization_min_duration_sec: 0.2,
            vad_aggressiveness: 2,

            gap_sec: 3.0,
            max_gap_repair_iterations: 2,

            subtitle_gap_threshold: 5.0,
            max_gap_to_fuse: 0.3,
            min_words_to_fuse: 4,

            max_prompt_chars: 600,
            translation_window_size: 10,
            review_batch_size: 50,
            review_overlap_ctx: 8,

            hallucination_no_speech_prob_threshold: 0.6,
            hallucination_logprob_threshold: -1.0,

            min_dub_silence_gap_sec: 0.15,
            dub_compression_profile: DubCompressionProfile::default(),
            compression_tolerance: 0.05,

            concurrency: 4,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        if let Some(config_path) = Self::config_file_path() {
            if config_path.exists() {
                let contents = std::fs::read_to_string(&config_path)?;
                if let Ok(file_config) = toml::from_str::<Config>(&contents) {
                    config = file_config;
                }
            }
        }

        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            config.openai_api_key = Some(key);
        }
        if let Ok(key) = std::env::var("GEMINI_API_KEY") {
            config.gemini_api_key = Some(key);
        }
        if let Ok(format) = std::env::var("AUTOSUB_DEFAULT_FORMAT") {
            if let Ok(f) = format.parse() {
                config.default_format = f;
            }
        }
        if let Ok(concurrency) = std::env::var("AUTOSUB_CONCURRENCY") {
            if let Ok(c) = concurrency.parse() {
                config.concurrency = c;
            }
        }
        if let Ok(parallel) = std::env::var("AUTOSUB_WHISPER_PARALLEL") {
            if let Ok(p) = parallel.parse() {
                config.whisper_parallel = p;
            }
        }

        Ok(config)
    }

    pub fn validate(&self, provider: Provider) -> Result<()> {
        match provider {
            Provider::Whisper if self.openai_api_key.is_none() => {
                return Err(AutosubError::Config(
                    "OPENAI_API_KEY not set. Get one at https://platform.openai.com/api-keys"
                        .to_string(),
                ));
            }
            Provider::Gemini if self.gemini_api_key.is_none() => {
                return Err(AutosubError::Config(
                    "GEMINI_API_KEY not set. Get one at https://aistudio.google.com/apikey"
                        .to_string(),
                ));
            }
            _ => {}
        }

        if self.concurrency == 0 || self.whisper_parallel == 0 || self.translate_parallel == 0 {
            return Err(AutosubError::Config(
                "concurrency settings must be greater than 0".to_string(),
            ));
        }

        if self.max_chunk_duration_sec <= self.min_chunk_duration_sec {
            return Err(AutosubError::Config(
                "max_chunk_duration_sec must exceed min_chunk_duration_sec".to_string(),
            ));
        }

        Ok(())
    }

    fn config_file_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("autosub").join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_parsing() {
        assert_eq!("srt".parse::<OutputFormat>().unwrap(), OutputFormat::Srt);
        assert_eq!("vtt".parse::<OutputFormat>().unwrap(), OutputFormat::Vtt);
        assert_eq!("json".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert!("txt".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_subtitle_mode_parsing() {
        assert_eq!(
            "dual".parse::<SubtitleMode>().unwrap(),
            SubtitleMode::Dual
        );
        assert!("quad".parse::<SubtitleMode>().is_err());
    }

    #[test]
    fn test_provider_parsing() {
        assert_eq!("gemini".parse::<Provider>().unwrap(), Provider::Gemini);
        assert_eq!("whisper".parse::<Provider>().unwrap(), Provider::Whisper);
    }

    #[test]
    fn test_compression_profiles() {
        assert_eq!(DubCompressionProfile::Standard.max_ratio(), 1.35);
        assert_eq!(DubCompressionProfile::Extended.max_ratio(), 1.8);
    }

    #[test]
    fn test_default_config_matches_spec_constants() {
        let config = Config::default();
        assert_eq!(config.whisper_parallel, 3);
        assert_eq!(config.transcription_batch_size, 50);
        assert_eq!(config.min_chunk_duration_sec, 8.0);
        assert_eq!(config.max_chunk_duration_sec, 15.0);
        assert_eq!(config.pre_pad_sec, 0.10);
        assert_eq!(config.post_pad_sec, 0.15);
        assert_eq!(config.gap_sec, 3.0);
        assert_eq!(config.subtitle_gap_threshold, 5.0);
        assert_eq!(config.review_batch_size, 50);
        assert_eq!(config.review_overlap_ctx, 8);
        assert_eq!(config.min_dub_silence_gap_sec, 0.15);
        assert_eq!(config.compression_tolerance, 0.05);
    }

    #[test]
    fn test_validate_missing_api_key() {
        let config = Config::default();
        assert!(config.validate(Provider::Gemini).is_err());
        assert!(config.validate(Provider::Whisper).is_err());
    }

    #[test]
    fn test_validate_with_api_key() {
        let mut config = Config::default();
        config.gemini_api_key = Some("test-key".to_string());
        assert!(config.validate(Provider::Gemini).is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_chunk_bounds() {
        let mut config = Config::default();
        config.gemini_api_key = Some("test-key".to_string());
        config.max_chunk_duration_sec = 5.0;
        config.min_chunk_duration_sec = 8.0;
        assert!(config.validate(Provider::Gemini).is_err());
    }
}
