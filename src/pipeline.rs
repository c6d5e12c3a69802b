//! Pipeline coordinator (spec §4.9 C9): wires C1-C8 together in order,
//! threading a single [`CancelToken`]/[`ProgressSink`] pair through every
//! stage. Each stage emits its own `stage`-tagged, stage-local 0..=100
//! progress; mapping those onto one overall bar is a consumer concern (see
//! `main.rs`'s stage-weight table), not this module's.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::info;

use crate::audio::{self, chunk::ChunkConfig, AudioChunk, VadConfig};
use crate::cancel::CancelToken;
use crate::config::{Config, OutputFormat, Provider, SubtitleMode};
use crate::dub::{self, DubOptions, DubOutcome};
use crate::error::Result;
use crate::llm;
use crate::progress::{self, ProgressEvent, ProgressSink};
use crate::repair;
use crate::review::ReviewOrchestrator;
use crate::subtitle;
use crate::transcribe::{self, segment::group_words, TranscriptionOrchestrator};
use crate::translate::{self, TranslationOrchestrator};
use crate::types::{reindex, Segment};

/// Dub-specific request options, only consulted when `PipelineOptions.dub`
/// is `Some` (spec §4.8 C8 is entirely optional).
#[derive(Debug, Clone)]
pub struct DubRequestOptions {
    pub voice: String,
    pub quality: String,
    pub tts_format: String,
    pub ambient_mix: f64,
    pub output_audio_path: PathBuf,
    /// Present when the source has a video track the caller wants to keep
    /// alongside the new dub; `output_video_path` is where the mux lands.
    pub video_source_path: Option<PathBuf>,
    pub output_video_path: Option<PathBuf>,
}

/// Everything about a run that isn't a file path (spec §6's CLI surface).
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub provider: Provider,
    pub format: OutputFormat,
    pub subtitle_mode: SubtitleMode,
    /// Target language for translation; `None` skips C6/C7 and subtitle
    /// rendering falls back to `Original` regardless of `subtitle_mode`.
    pub translate_to: Option<String>,
    pub dub: Option<DubRequestOptions>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            format: OutputFormat::default(),
            subtitle_mode: SubtitleMode::default(),
            translate_to: None,
            dub: None,
        }
    }
}

/// Timings and counts surfaced to the CLI's end-of-run summary.
#[derive(Debug, Clone)]
pub struct PipelineStats {
    pub total_time: Duration,
    pub audio_duration_sec: f64,
    pub chunk_count: usize,
    pub raw_segment_count: usize,
    pub final_segment_count: usize,
    pub provider: Provider,
}

/// What a completed run produced.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub subtitle_path: PathBuf,
    pub segments: Vec<Segment>,
    pub stats: PipelineStats,
    pub dub: Option<DubOutcome>,
}

/// Run the full C1-C9 pipeline against `input`, writing the subtitle
/// document to `output` and, if `options.dub` is set, a dubbed audio/video
/// file alongside it.
pub async fn run_pipeline(
    input: &Path,
    output: &Path,
    config: &Config,
    options: &PipelineOptions,
    progress: &ProgressSink,
    cancel: &CancelToken,
) -> Result<PipelineOutcome> {
    let start_time = Instant::now();
    cancel.check()?;

    audio::check_ffmpeg()?;
    audio::check_ffprobe()?;

    if !input.exists() {
        return Err(crate::error::AutosubError::FileNotFound(input.display().to_string()));
    }

    let work_dir = tempfile::tempdir().map_err(crate::error::AutosubError::Io)?;

    // C1: extract a normalized audio track.
    progress.emit(ProgressEvent::stage_progress(progress::stage::EXTRACT, 0));
    let extracted_audio = work_dir.path().join("extracted.wav");
    let audio_metadata = audio::extract_audio(input, &extracted_audio).await?;
    progress.emit(ProgressEvent::stage_progress(progress::stage::EXTRACT, 100));

    // C2: VAD + chunk planning.
    progress.emit(ProgressEvent::stage_progress(progress::stage::CHUNK, 0));
    let vad_config = VadConfig::from_pipeline_config(config);
    let speech_regions = audio::detect_speech_regions(&extracted_audio, &vad_config)?;
    let chunk_config = ChunkConfig::from_pipeline_config(config);
    let chunk_intervals = audio::plan_chunks(&speech_regions, audio_metadata.duration_sec, &chunk_config);
    let chunk_dir = work_dir.path().join("chunks");
    let chunks: Vec<AudioChunk> = audio::create_chunks(&extracted_audio, &chunk_intervals, &chunk_dir).await?;
    let chunk_count = chunks.len();
    progress.emit(ProgressEvent::stage_progress(progress::stage::CHUNK, 100));

    // C3: concurrent ASR with rolling-context prompting. A second client is
    // built for C5's gap re-transcription since the orchestrator takes
    // ownership of the first to share it across its worker pool.
    let transcriber = transcribe::create_transcriber(options.provider, config)?;
    let repair_transcriber = transcribe::create_transcriber(options.provider, config)?;

    let orchestrator = TranscriptionOrchestrator::new(
        transcriber,
        config.whisper_parallel,
        config.transcription_batch_size,
        config.max_prompt_chars,
    )
    .with_progress(false);
    let (raw_segments, transcription_stats) = orchestrator.process_chunks(chunks.clone(), progress, cancel).await?;
    info!(
        "transcribed {}/{} chunks successfully in {:?}",
        transcription_stats.successful_chunks, transcription_stats.total_chunks, transcription_stats.total_time
    );
    audio::cleanup_chunks(&chunks).ok();

    // C4: hallucination scrubbing.
    progress.emit(ProgressEvent::stage_progress(progress::stage::SCRUB, 0));
    let llm_provider = llm::create_llm_provider(config.gemini_api_key.as_deref())?;
    let scrubbed = transcribe::scrub::scrub_hallucinations(
        raw_segments,
        audio_metadata.duration_sec,
        llm_provider.as_ref(),
        cancel,
    )
    .await?;
    progress.emit(ProgressEvent::stage_progress(progress::stage::SCRUB, 100));

    let raw_segment_count = scrubbed.len();
    let mut captioned = group_words(&scrubbed);
    reindex(&mut captioned);

    // C5: close coverage gaps against the VAD sanity scan.
    let repaired = repair::close_gaps(
        captioned,
        &speech_regions,
        audio_metadata.duration_sec,
        repair_transcriber.as_ref(),
        &extracted_audio,
        config,
        progress,
        cancel,
    )
    .await?;

    // Finalize (spec §4.7): fuse short orphans, close small visual gaps,
    // reindex densely. This runs before translation so C6/C7 operate on the
    // caption list that will actually ship.
    let mut segments = subtitle::finalize_segments(repaired, config);

    // C6/C7: translation and review, only when a target language was given.
    let mut effective_mode = options.subtitle_mode;
    if let Some(target_lang) = options.translate_to.as_deref() {
        progress.emit(ProgressEvent::stage_progress(progress::stage::TRANSLATE, 0));
        let translator = translate::create_translator(config.gemini_api_key.as_deref())?;
        let translator = std::sync::Arc::from(translator);
        let translation_orchestrator = TranslationOrchestrator::new(
            std::sync::Arc::clone(&translator),
            config.translation_window_size,
            config.review_overlap_ctx,
            config.translate_parallel,
        );
        translation_orchestrator.translate(&mut segments, target_lang, progress, cancel).await?;
        progress.emit(ProgressEvent::stage_progress(progress::stage::TRANSLATE, 100));

        progress.emit(ProgressEvent::stage_progress(progress::stage::REVIEW, 0));
        let review_orchestrator = ReviewOrchestrator::new(
            translator,
            config.review_batch_size,
            config.review_overlap_ctx,
            config.translate_parallel,
        );
        review_orchestrator.review(&mut segments, target_lang, progress, cancel).await?;
        progress.emit(ProgressEvent::stage_progress(progress::stage::REVIEW, 100));
    } else {
        effective_mode = SubtitleMode::Original;
    }

    let final_segment_count = segments.len();

    // Render and write the subtitle document.
    progress.emit(ProgressEvent::stage_progress(progress::stage::FINALIZE, 0));
    let entries = subtitle::to_subtitle_entries(&segments, effective_mode);
    let formatter = subtitle::create_formatter(options.format);
    let rendered = formatter.format(&entries);
    tokio::fs::write(output, rendered).await?;
    progress.emit(ProgressEvent::stage_progress(progress::stage::FINALIZE, 50));

    // C8: optional dub assembly.
    let dub_outcome = if let Some(dub_request) = &options.dub {
        cancel.check()?;
        let tts = crate::tts::create_synthesizer(config.gemini_api_key.as_deref())?;
        let dub_work_dir = work_dir.path().join("dub");
        let dub_options = DubOptions {
            voice: dub_request.voice.clone(),
            quality: dub_request.quality.clone(),
            tts_format: dub_request.tts_format.clone(),
            ambient_mix: dub_request.ambient_mix,
            media_duration_sec: audio_metadata.duration_sec,
        };

        let outcome = dub::dub_media(
            &segments,
            &extracted_audio,
            dub_request.video_source_path.as_deref(),
            tts.as_ref(),
            &dub_options,
            config,
            &dub_work_dir,
            &dub_request.output_audio_path,
            dub_request.output_video_path.as_deref(),
            progress,
            cancel,
        )
        .await?;
        Some(outcome)
    } else {
        None
    };

    progress.emit(ProgressEvent::stage_progress(progress::stage::FINALIZE, 100));
    progress.emit(ProgressEvent::stage_progress(progress::stage::DONE, 100));

    let stats = PipelineStats {
        total_time: start_time.elapsed(),
        audio_duration_sec: audio_metadata.duration_sec,
        chunk_count,
        raw_segment_count,
        final_segment_count,
        provider: options.provider,
    };

    Ok(PipelineOutcome {
        subtitle_path: output.to_path_buf(),
        segments,
        stats,
        dub: dub_outcome,
    })
}

/// Human-readable end-of-run summary, printed by the CLI after a successful
/// run (kept here rather than in `main.rs` so library consumers embedding
/// this crate get the same formatting).
pub fn print_summary(outcome: &PipelineOutcome) {
    println!();
    println!("Subtitle file: {}", outcome.subtitle_path.display());
    println!("Provider: {}", outcome.stats.provider);
    println!("Audio duration: {:.1}s", outcome.stats.audio_duration_sec);
    println!("Chunks processed: {}", outcome.stats.chunk_count);
    println!(
        "Segments: {} raw -> {} final",
        outcome.stats.raw_segment_count, outcome.stats.final_segment_count
    );
    println!("Total time: {:.1}s", outcome.stats.total_time.as_secs_f64());
    if let Some(dub) = &outcome.dub {
        println!(
            "Dub: {} clips synthesized ({} compressed, {} overflowing)",
            dub.clips_synthesized, dub.clips_compressed, dub.clips_overflowed
        );
        println!("Dubbed audio: {}", dub.dubbed_audio_path.display());
        if let Some(video) = &dub.dubbed_video_path {
            println!("Dubbed video: {}", video.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_options_default_has_no_translation_or_dub() {
        let options = PipelineOptions::default();
        assert!(options.translate_to.is_none());
        assert!(options.dub.is_none());
        assert_eq!(options.subtitle_mode, SubtitleMode::Original);
    }

    #[test]
    fn print_summary_does_not_panic_without_dub() {
        let outcome = PipelineOutcome {
            subtitle_path: PathBuf::from("out.srt"),
            segments: Vec::new(),
            stats: PipelineStats {
                total_time: Duration::from_secs(1),
                audio_duration_sec: 10.0,
                chunk_count: 2,
                raw_segment_count: 5,
                final_segment_count: 4,
                provider: Provider::Gemini,
            },
            dub: None,
        };
        print_summary(&outcome);
    }
}
