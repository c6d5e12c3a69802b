//! Integration tests for autosub
//!
//! These tests validate the integration between components without requiring
//! external API keys.

use autosub::config::{Config, OutputFormat, Provider, SubtitleMode};
use autosub::subtitle::{create_formatter, finalize_segments, to_subtitle_entries, SubtitleEntry, SubtitleFormatter};
use autosub::types::{reindex, Segment};

// ============================================================================
// Config Integration Tests
// ============================================================================

mod config_tests {
    use super::*;

    #[test]
    fn test_config_default_values() {
        let config = Config::default();
        assert_eq!(config.default_format, OutputFormat::Srt);
        assert_eq!(config.concurrency, 4);
    }

    #[test]
    fn test_config_gemini_validation() {
        let mut config = Config::default();
        config.gemini_api_key = None;

        assert!(config.validate(Provider::Gemini).is_err());

        config.gemini_api_key = Some("test-key".to_string());
        assert!(config.validate(Provider::Gemini).is_ok());
    }

    #[test]
    fn test_output_format_extensions() {
        assert_eq!(OutputFormat::Srt.extension(), "srt");
        assert_eq!(OutputFormat::Vtt.extension(), "vtt");
        assert_eq!(OutputFormat::Json.extension(), "json");
    }
}

// ============================================================================
// Subtitle Formatter Integration Tests
// ============================================================================

mod subtitle_formatter_tests {
    use super::*;
    use std::time::Duration;

    fn sample_entries() -> Vec<SubtitleEntry> {
        vec![
            SubtitleEntry {
                index: 1,
                start: Duration::from_millis(1500),
                end: Duration::from_millis(4000),
                text: "Hello, welcome to this video.".to_string(),
                speaker: None,
            },
            SubtitleEntry {
                index: 2,
                start: Duration::from_millis(4500),
                end: Duration::from_millis(7000),
                text: "Today we're going to learn.".to_string(),
                speaker: None,
            },
        ]
    }

    #[test]
    fn test_srt_formatter_integration() {
        let formatter = create_formatter(OutputFormat::Srt);
        let entries = sample_entries();
        let output = formatter.format(&entries);

        assert!(output.contains("1\n"));
        assert!(output.contains("00:00:01,500 --> 00:00:04,000"));
        assert!(output.contains("Hello, welcome to this video."));
        assert!(output.contains("2\n"));
        assert_eq!(formatter.extension(), "srt");
    }

    #[test]
    fn test_vtt_formatter_integration() {
        let formatter = create_formatter(OutputFormat::Vtt);
        let entries = sample_entries();
        let output = formatter.format(&entries);

        assert!(output.starts_with("WEBVTT\n"));
        assert!(output.contains("00:00:01.500 --> 00:00:04.000"));
        assert!(output.contains("Hello, welcome to this video."));
        assert_eq!(formatter.extension(), "vtt");
    }

    #[test]
    fn test_json_formatter_integration() {
        let formatter = create_formatter(OutputFormat::Json);
        let entries = sample_entries();
        let output = formatter.format(&entries);

        assert!(output.contains("\"metadata\""));
        assert!(output.contains("\"subtitles\""));
        assert!(output.contains("Hello, welcome to this video."));
        assert_eq!(formatter.extension(), "json");
    }

    #[test]
    fn test_multiline_subtitle_formatting() {
        let entries = vec![SubtitleEntry {
            index: 1,
            start: Duration::from_secs(0),
            end: Duration::from_secs(5),
            text: "This is line one.\nThis is line two.".to_string(),
            speaker: None,
        }];

        let formatter = create_formatter(OutputFormat::Srt);
        let output = formatter.format(&entries);

        assert!(output.contains("This is line one.\nThis is line two."));
    }
}

// ============================================================================
// Segment -> Subtitle Conversion Tests
// ============================================================================

mod conversion_tests {
    use super::*;

    fn seg(start: f64, end: f64, text: &str) -> Segment {
        Segment::new(start, end, text)
    }

    #[test]
    fn test_to_subtitle_entries_original_mode() {
        let mut segments = vec![seg(0.0, 2.5, "First segment here."), seg(3.0, 5.5, "Second segment here.")];
        reindex(&mut segments);

        let entries = to_subtitle_entries(&segments, SubtitleMode::Original);

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].index, 1);
        assert_eq!(entries[1].index, 2);
        assert_eq!(entries[0].text, "First segment here.");
    }

    #[test]
    fn test_to_subtitle_entries_dual_mode_separates_with_bar() {
        let mut segment = seg(0.0, 2.0, "bonjour");
        segment.translation = Some("hello".to_string());
        let mut segments = vec![segment];
        reindex(&mut segments);

        let entries = to_subtitle_entries(&segments, SubtitleMode::Dual);

        assert!(entries[0].text.contains("bonjour"));
        assert!(entries[0].text.contains("hello"));
        assert!(entries[0].text.contains('―'));
    }

    #[test]
    fn test_finalize_fuses_short_orphan_into_neighbor() {
        let segments = vec![
            seg(0.0, 2.0, "Hello there"),
            seg(2.1, 2.3, "uh"),
            seg(2.35, 4.0, "how are you"),
        ];

        let config = Config::default();
        let finalized = finalize_segments(segments, &config);

        // The tiny orphan between two close neighbors should be fused away.
        assert!(finalized.len() < 3);
    }

    #[test]
    fn test_finalize_reindexes_densely() {
        let segments = vec![seg(0.0, 2.0, "one"), seg(10.0, 12.0, "two")];
        let config = Config::default();
        let finalized = finalize_segments(segments, &config);

        for (i, s) in finalized.iter().enumerate() {
            assert_eq!(s.index, i + 1);
        }
    }
}

// ============================================================================
// Audio Module Integration Tests
// ============================================================================

mod audio_tests {
    use autosub::audio::chunk::ChunkConfig;
    use autosub::audio::vad::VadConfig;
    use autosub::audio::{plan_chunks, AudioMetadata};
    use autosub::types::Interval;

    #[test]
    fn test_audio_metadata_struct() {
        let metadata = AudioMetadata { duration_sec: 120.0, sample_rate: 16000, channels: 1 };

        assert_eq!(metadata.duration_sec, 120.0);
        assert_eq!(metadata.sample_rate, 16000);
        assert_eq!(metadata.channels, 1);
    }

    #[test]
    fn test_chunk_config_defaults() {
        let config = ChunkConfig::default();

        assert_eq!(config.min_chunk_duration_sec, 8.0);
        assert_eq!(config.max_chunk_duration_sec, 15.0);
    }

    #[test]
    fn test_vad_config_defaults() {
        let config = VadConfig::default();

        assert_eq!(config.aggressiveness, 2);
        assert_eq!(config.frame_ms, 30);
    }

    #[test]
    fn test_plan_chunks_with_short_regions() {
        let regions = vec![Interval::new(0.0, 40.0), Interval::new(50.0, 90.0)];

        let config = ChunkConfig { max_chunk_duration_sec: 60.0, ..Default::default() };
        let chunks = plan_chunks(&regions, 100.0, &config);

        assert_eq!(chunks.len(), 2);
    }

    #[test]
    fn test_plan_chunks_splits_long_region() {
        let regions = vec![Interval::new(0.0, 120.0)];

        let config = ChunkConfig { max_chunk_duration_sec: 60.0, ..Default::default() };
        let chunks = plan_chunks(&regions, 120.0, &config);

        assert!(chunks.len() >= 2);
    }
}

// ============================================================================
// Pipeline Options Tests
// ============================================================================

mod pipeline_options_tests {
    use super::*;
    use autosub::pipeline::PipelineOptions;

    #[test]
    fn test_pipeline_options_default() {
        let options = PipelineOptions::default();

        assert_eq!(options.format, OutputFormat::Srt);
        assert!(options.translate_to.is_none());
        assert!(options.dub.is_none());
    }

    #[test]
    fn test_pipeline_options_custom() {
        let options = PipelineOptions {
            provider: Provider::Whisper,
            format: OutputFormat::Vtt,
            subtitle_mode: SubtitleMode::Translated,
            translate_to: Some("en".to_string()),
            dub: None,
        };

        assert_eq!(options.format, OutputFormat::Vtt);
        assert_eq!(options.translate_to, Some("en".to_string()));
        assert_eq!(options.subtitle_mode, SubtitleMode::Translated);
    }
}

// ============================================================================
// End-to-End Formatting Tests
// ============================================================================

mod e2e_formatting_tests {
    use super::*;

    fn seg(start: f64, end: f64, text: &str) -> Segment {
        Segment::new(start, end, text)
    }

    #[test]
    fn test_full_srt_workflow() {
        let mut segments = vec![seg(0.5, 3.0, "Welcome to the tutorial."), seg(3.5, 6.0, "Let's get started.")];
        reindex(&mut segments);

        let entries = to_subtitle_entries(&segments, SubtitleMode::Original);
        let formatter = create_formatter(OutputFormat::Srt);
        let srt_output = formatter.format(&entries);

        assert!(srt_output.contains("1\n"));
        assert!(srt_output.contains("00:00:00,500 --> 00:00:03,000"));
        assert!(srt_output.contains("Welcome to the tutorial."));
        assert!(srt_output.contains("2\n"));
        assert!(srt_output.contains("00:00:03,500 --> 00:00:06,000"));
        assert!(srt_output.contains("Let's get started."));
    }

    #[test]
    fn test_full_vtt_workflow() {
        let mut segments = vec![seg(0.0, 5.0, "Hello World")];
        reindex(&mut segments);

        let entries = to_subtitle_entries(&segments, SubtitleMode::Original);
        let formatter = create_formatter(OutputFormat::Vtt);
        let vtt_output = formatter.format(&entries);

        assert!(vtt_output.starts_with("WEBVTT\n"));
        assert!(vtt_output.contains("00:00:00.000 --> 00:00:05.000"));
        assert!(vtt_output.contains("Hello World"));
    }
}

// ============================================================================
// Edge Case Tests
// ============================================================================

mod edge_case_tests {
    use super::*;

    #[test]
    fn test_empty_segments() {
        let segments: Vec<Segment> = vec![];
        let entries = to_subtitle_entries(&segments, SubtitleMode::Original);

        assert!(entries.is_empty());

        let formatter = create_formatter(OutputFormat::Srt);
        let output = formatter.format(&entries);
        assert!(output.is_empty());
    }

    #[test]
    fn test_unicode_text() {
        let mut segments = vec![Segment::new(0.0, 3.0, "日本語テスト"), Segment::new(4.0, 7.0, "emoji support")];
        reindex(&mut segments);

        let entries = to_subtitle_entries(&segments, SubtitleMode::Original);
        let formatter = create_formatter(OutputFormat::Srt);
        let output = formatter.format(&entries);

        assert!(output.contains("日本語テスト"));
        assert!(output.contains("emoji support"));
    }
}
