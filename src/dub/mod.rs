//! Dub assembly (spec §4.8 C8): synthesize translated speech, fit each clip
//! to its subtitle slot, assemble the voice timeline, retime for overall
//! drift, then blend against the original ambient track and optionally mux
//! onto video.
//!
//! Grounded on `transcribe::orchestrator`'s batch-then-flatten shape for the
//! TTS step, `dub::plan` for slot bookkeeping, and `media::mux` /
//! `dub::mixer` for everything downstream of synthesis.

pub mod mixer;
pub mod plan;

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::audio::extract::get_audio_duration;
use crate::cancel::CancelToken;
use crate::config::Config;
use crate::error::{AutosubError, Result};
use crate::media::{self, ClipPlacement};
use crate::progress::{self, ProgressBand, ProgressEvent, ProgressSink};
use crate::tts::{TtsProvider, TtsRequestSegment};
use crate::types::Segment;

use plan::DubPlan;

/// TTS requests are split into sequential batches rather than one request
/// per segment, so a single batch keeps a consistent voice/model session;
/// sequential (not concurrent) because providers rate-limit per-key and a
/// dub run is not latency-sensitive the way live transcription is.
const TTS_BASE_BATCH_SIZE: usize = 10;
const TTS_MAX_BATCHES: usize = 20;

/// Knobs that come from the CLI/config rather than from the transcript.
#[derive(Debug, Clone)]
pub struct DubOptions {
    pub voice: String,
    pub quality: String,
    pub tts_format: String,
    pub ambient_mix: f64,
    pub media_duration_sec: f64,
}

/// What `dub_media` produced, for the pipeline coordinator's final report.
#[derive(Debug, Clone)]
pub struct DubOutcome {
    pub dubbed_audio_path: PathBuf,
    pub dubbed_video_path: Option<PathBuf>,
    pub clips_synthesized: usize,
    pub clips_compressed: usize,
    pub clips_overflowed: usize,
}

fn tts_batch_size(total: usize) -> usize {
    if total == 0 {
        return 1;
    }
    let batches_at_base = total.div_ceil(TTS_BASE_BATCH_SIZE);
    if batches_at_base <= TTS_MAX_BATCHES {
        TTS_BASE_BATCH_SIZE
    } else {
        total.div_ceil(TTS_MAX_BATCHES)
    }
}

/// Run the full C8 pipeline over `segments` (already translated/reviewed;
/// `Segment::display_text` supplies the line spoken for each slot).
///
/// `ambient_audio_path` is the original media's extracted audio track, used
/// both as the fit step's media-duration reference and as the ambient bed
/// blended in step 6. `video_path`, if given, is muxed with the mixed audio
/// into `output_video_path`.
#[allow(clippy::too_many_arguments)]
pub async fn dub_media(
    segments: &[Segment],
    ambient_audio_path: &Path,
    video_path: Option<&Path>,
    tts: &dyn TtsProvider,
    options: &DubOptions,
    config: &Config,
    work_dir: &Path,
    output_audio_path: &Path,
    output_video_path: Option<&Path>,
    progress: &ProgressSink,
    cancel: &CancelToken,
) -> Result<DubOutcome> {
    cancel.check()?;

    let band = ProgressBand::new(0, 100);
    progress.emit(ProgressEvent::stage_progress(progress::stage::DUB, band.scale(0.0)));

    if segments.is_empty() {
        return Err(AutosubError::DubFitFailed("no segments to dub".to_string()));
    }

    tokio::fs::create_dir_all(work_dir).await?;

    let mut plans = plan::build_plans(segments);

    // Step 2: synthesize speech in sequential batches.
    let batch_size = tts_batch_size(segments.len());
    let mut clip_files: Vec<(usize, PathBuf)> = Vec::with_capacity(segments.len());
    let mut clips_synthesized = 0usize;
    let total_batches = segments.len().div_ceil(batch_size).max(1);

    for (batch_index, chunk) in segments.chunks(batch_size).enumerate() {
        cancel.check()?;

        let requests: Vec<TtsRequestSegment> = chunk
            .iter()
            .map(|s| TtsRequestSegment {
                index: s.index,
                text: s.display_text().to_string(),
                target_duration_sec: Some(s.duration().max(0.05)),
            })
            .collect();

        let result = tts
            .synthesize(&requests, &options.voice, &options.quality, &options.tts_format, cancel)
            .await?;

        for clip in result.clips {
            let file_name = format!("clip_{:05}.{}", clip.segment_index, clip.container_format);
            let path = work_dir.join(file_name);
            tokio::fs::write(&path, &clip.audio_bytes).await?;
            clip_files.push((clip.segment_index, path));
            clips_synthesized += 1;
        }

        debug!("dub TTS batch {} synthesized {} clips", batch_index, clips_synthesized);
        let pct = band.scale(0.4 * (batch_index + 1) as f64 / total_batches as f64);
        progress.emit(ProgressEvent::stage_progress(progress::stage::DUB, pct));
    }

    // Step 3: per-clip fit against each plan's slot.
    let max_ratio = config.dub_compression_profile.max_ratio();
    let mut clips_compressed = 0usize;
    let mut clips_overflowed = 0usize;
    let mut placements: Vec<(usize, PathBuf, f64)> = Vec::with_capacity(clip_files.len());

    for (segment_index, clip_path) in &clip_files {
        cancel.check()?;

        let Some(plan_pos) = plans.iter().position(|p| p.segment_index == *segment_index) else {
            continue;
        };

        let produced_duration = get_audio_duration(clip_path).unwrap_or(plans[plan_pos].target_duration_sec);
        let tolerance = config.compression_tolerance;
        let slot = plans[plan_pos].target_duration_sec;
        let overflow = produced_duration - slot;

        if overflow > slot * tolerance {
            let granted = plan::extend_segment_allocation(
                &mut plans,
                plan_pos,
                overflow,
                config.min_dub_silence_gap_sec,
            );
            debug!(
                "dub clip {} overflowed slot by {:.3}s, granted {:.3}s of extra slack",
                segment_index, overflow, granted
            );
        }

        let effective_slot = plans[plan_pos].target_duration_sec.max(0.05);
        let ratio = (produced_duration / effective_slot).max(1.0);

        let atempo = if ratio <= 1.0 + tolerance {
            1.0
        } else if ratio <= max_ratio {
            clips_compressed += 1;
            ratio
        } else {
            clips_overflowed += 1;
            clips_compressed += 1;
            warn!(
                "dub clip {} needs {:.2}x compression (max {:.2}x); capping stretch at {:.2}x",
                segment_index, ratio, max_ratio, max_ratio
            );
            max_ratio
        };

        placements.push((*segment_index, clip_path.clone(), atempo));
    }

    // Re-anchor every slot to its original timeline position now that all
    // slack has been allocated (spec §4.8 step 3d).
    plan::reanchor(&mut plans);

    progress.emit(ProgressEvent::stage_progress(progress::stage::DUB, band.scale(0.5)));

    // Step 4: assemble the voice-only timeline.
    let mut clip_paths: Vec<PathBuf> = Vec::with_capacity(placements.len());
    let mut clip_placements: Vec<ClipPlacement> = Vec::with_capacity(placements.len());
    for (input_index, (segment_index, clip_path, atempo)) in placements.into_iter().enumerate() {
        let updated = plans.iter().find(|p| p.segment_index == segment_index).expect("plan exists for every clip");
        clip_paths.push(clip_path);
        clip_placements.push(ClipPlacement {
            input_index,
            start_sec: updated.start,
            atempo,
            target_duration_sec: updated.target_duration_sec,
        });
    }

    let voice_track = work_dir.join("voice_timeline.wav");
    media::render_mixed_audio(&clip_paths, &clip_placements, None, 0.0, &voice_track, cancel).await?;

    progress.emit(ProgressEvent::stage_progress(progress::stage::DUB, band.scale(0.7)));

    // Step 5: correct residual end-to-end drift against the source media.
    let voice_duration = get_audio_duration(&voice_track).unwrap_or(options.media_duration_sec);
    let retimed_track = work_dir.join("voice_retimed.wav");
    mixer::retime_if_drifted(&voice_track, voice_duration, options.media_duration_sec, &retimed_track, cancel)
        .await?;

    progress.emit(ProgressEvent::stage_progress(progress::stage::DUB, band.scale(0.85)));

    // Step 6: blend against the ambient bed.
    mixer::mix_with_ambient(&retimed_track, ambient_audio_path, options.ambient_mix, output_audio_path, cancel)
        .await?;

    let dubbed_video_path = if let (Some(video), Some(out_video)) = (video_path, output_video_path) {
        media::mux_audio_onto_video(video, output_audio_path, out_video, cancel).await?;
        Some(out_video.to_path_buf())
    } else {
        None
    };

    progress.emit(ProgressEvent::stage_progress(progress::stage::DUB, band.scale(1.0)));
    info!(
        "dub assembly complete: {} clips synthesized, {} compressed, {} left overflowing",
        clips_synthesized, clips_compressed, clips_overflowed
    );

    Ok(DubOutcome {
        dubbed_audio_path: output_audio_path.to_path_buf(),
        dubbed_video_path,
        clips_synthesized,
        clips_compressed,
        clips_overflowed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tts_batch_size_uses_base_size_under_cap() {
        assert_eq!(tts_batch_size(25), TTS_BASE_BATCH_SIZE);
        assert_eq!(tts_batch_size(0), 1);
    }

    #[test]
    fn tts_batch_size_grows_past_max_batches() {
        let total = 5000;
        let size = tts_batch_size(total);
        let batches = total.div_ceil(size);
        assert!(batches <= TTS_MAX_BATCHES);
    }

    #[test]
    fn dub_plan_carries_segment_index_through_fit() {
        let mut segments = vec![Segment::new(0.0, 1.0, "hi"), Segment::new(2.0, 3.0, "bye")];
        crate::types::reindex(&mut segments);
        let plans: Vec<DubPlan> = plan::build_plans(&segments);
        assert_eq!(plans[0].segment_index, 1);
        assert_eq!(plans[1].segment_index, 2);
    }
}
