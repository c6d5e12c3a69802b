//! Gap Repair Engine (spec §4.4 C5): iteratively closes caption coverage
//! gaps by re-transcribing the uncovered audio. Grounded on
//! `transcribe::orchestrator::TranscriptionOrchestrator`'s `Semaphore` +
//! `FuturesUnordered` pool shape and on `audio::chunk::plan_chunks`'s
//! merge-by-sorted-start dedupe idiom.

use std::path::Path;
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::audio::{extract_audio_segment, AudioChunk};
use crate::cancel::CancelToken;
use crate::config::Config;
use crate::error::Result;
use crate::progress::{self, ProgressEvent, ProgressSink};
use crate::transcribe::Transcriber;
use crate::types::{Interval, Segment};

/// Words each side-neighbor is truncated to when building a gap's prompt.
const NEIGHBOR_WORD_LIMIT: usize = 40;
/// Neighboring segments taken from each side of a gap for prompt context.
const NEIGHBOR_COUNT: usize = 3;
/// How far a segment's `end` may overshoot the next segment's `start` (or
/// the media duration) before it is treated as a phantom tail.
const OVERSHOOT_TOLERANCE_SEC: f64 = 0.25;
/// Gaps whose starts are within this of the previous gap's end are merged.
const GAP_MERGE_EPSILON_SEC: f64 = 0.01;

/// Close caption coverage gaps against `segments` in place, returning the
/// updated, start-sorted sequence. Re-indexing into dense 1-based order is
/// left to the caller (spec's finalization step).
pub async fn close_gaps(
    mut segments: Vec<Segment>,
    speech_intervals: &[Interval],
    media_duration_sec: f64,
    transcriber: &dyn Transcriber,
    audio_path: &Path,
    config: &Config,
    progress: &ProgressSink,
    cancel: &CancelToken,
) -> Result<Vec<Segment>> {
    cancel.check()?;

    segments.sort_by(|a, b| a.start_sec.partial_cmp(&b.start_sec).unwrap_or(std::cmp::Ordering::Equal));
    refine_overshoots(&mut segments, media_duration_sec, transcriber, audio_path, cancel).await?;

    let temp_dir = std::env::temp_dir().join("autosub_repair");
    tokio::fs::create_dir_all(&temp_dir).await.ok();

    for iteration in 0..config.max_gap_repair_iterations {
        cancel.check()?;

        let mut gaps = find_gaps(&segments, speech_intervals, media_duration_sec, config.gap_sec);
        if gaps.is_empty() {
            break;
        }

        gaps.sort_by(|a, b| a.duration().partial_cmp(&b.duration()).unwrap_or(std::cmp::Ordering::Equal));
        debug!("gap repair iteration {}: {} gap(s) to close", iteration, gaps.len());

        let context_snapshot = segments.clone();
        let semaphore = Arc::new(Semaphore::new(config.whisper_parallel));
        let mut futures = FuturesUnordered::new();

        for (gap_index, gap) in gaps.into_iter().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let cancel = cancel.clone();
            let temp_dir = temp_dir.clone();
            let audio_path = audio_path.to_path_buf();
            let neighbors_ctx = build_neighbor_context(&context_snapshot, &gap);

            futures.push(async move {
                let _permit = semaphore.acquire().await.expect("repair semaphore closed");

                if cancel.is_cancelled() {
                    return (gap_index, Err(crate::error::AutosubError::Cancelled));
                }

                let result = repair_one_gap(&gap, &neighbors_ctx, &audio_path, &temp_dir, gap_index, transcriber).await;
                (gap_index, result)
            });
        }

        let mut repaired = Vec::new();
        let mut completed = 0usize;
        let total_gaps = futures.len();

        while let Some((gap_index, result)) = futures.next().await {
            cancel.check()?;
            completed += 1;

            match result {
                Ok(mut new_segments) => repaired.append(&mut new_segments),
                Err(e) => {
                    warn!("gap {} repair failed: {}", gap_index, e);
                    progress.emit(ProgressEvent::item_failed(progress::stage::REPAIR, e.to_string()));
                }
            }

            progress.emit(ProgressEvent::item_progress(
                progress::stage::REPAIR,
                ((completed as f64 / total_gaps.max(1) as f64) * 100.0) as i32,
                completed as u64,
                total_gaps as u64,
            ));
        }

        if repaired.is_empty() {
            break;
        }

        segments.extend(repaired);
        segments.sort_by(|a, b| a.start_sec.partial_cmp(&b.start_sec).unwrap_or(std::cmp::Ordering::Equal));
    }

    Ok(segments)
}

async fn repair_one_gap(
    gap: &Interval,
    context: &str,
    audio_path: &Path,
    temp_dir: &Path,
    gap_index: usize,
    transcriber: &dyn Transcriber,
) -> Result<Vec<Segment>> {
    let clip_path = temp_dir.join(format!("gap_{gap_index}.wav"));
    extract_audio_segment(audio_path, &clip_path, gap.start_sec, gap.end_sec).await?;

    let chunk = AudioChunk { interval: *gap, path: clip_path.clone(), index: gap_index };
    let mut produced = transcriber.transcribe(&chunk, context).await?;

    for segment in &mut produced {
        segment.start_sec = segment.start_sec.max(gap.start_sec);
        segment.end_sec = segment.end_sec.min(gap.end_sec).max(segment.start_sec);
    }

    tokio::fs::remove_file(&clip_path).await.ok();

    Ok(produced.into_iter().filter(|s| !s.interval().is_degenerate()).collect())
}

/// Take up to `NEIGHBOR_COUNT` segments immediately before and after `gap`,
/// each truncated to `NEIGHBOR_WORD_LIMIT` words, joined into a single
/// rolling-context prompt string.
fn build_neighbor_context(sorted_segments: &[Segment], gap: &Interval) -> String {
    let before: Vec<&Segment> = sorted_segments
        .iter()
        .filter(|s| s.end_sec <= gap.start_sec)
        .rev()
        .take(NEIGHBOR_COUNT)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();

    let after: Vec<&Segment> = sorted_segments.iter().filter(|s| s.start_sec >= gap.end_sec).take(NEIGHBOR_COUNT).collect();

    before
        .iter()
        .chain(after.iter())
        .map(|s| truncate_words(&s.original, NEIGHBOR_WORD_LIMIT))
        .collect::<Vec<_>>()
        .join(" ")
}

fn truncate_words(text: &str, max_words: usize) -> String {
    text.split_whitespace().take(max_words).collect::<Vec<_>>().join(" ")
}

/// Identify coverage gaps from two sources: adjacent-pair gaps exceeding
/// `gap_sec`, and a sanity scan of uncovered sub-ranges inside each VAD
/// speech interval.
fn find_gaps(segments: &[Segment], speech_intervals: &[Interval], media_duration_sec: f64, gap_sec: f64) -> Vec<Interval> {
    let mut gaps = Vec::new();

    for window in segments.windows(2) {
        let prev = &window[0];
        let next = &window[1];
        if next.start_sec - prev.end_sec >= gap_sec {
            gaps.push(Interval::new(prev.end_sec, next.start_sec));
        }
    }

    for interval in speech_intervals {
        gaps.extend(uncovered_subranges(segments, interval, gap_sec));
    }

    let _ = media_duration_sec;

    dedupe_gaps(gaps)
}

/// Walk the subset of segments overlapping `interval`, returning any
/// uncovered sub-range of length `>= min_len`.
fn uncovered_subranges(segments: &[Segment], interval: &Interval, min_len: f64) -> Vec<Interval> {
    let mut covering: Vec<Interval> = segments
        .iter()
        .map(|s| s.interval())
        .filter(|iv| iv.overlaps(interval))
        .map(|iv| iv.clamp_to(interval))
        .collect();

    covering.sort_by(|a, b| a.start_sec.partial_cmp(&b.start_sec).unwrap_or(std::cmp::Ordering::Equal));

    let mut gaps = Vec::new();
    let mut cursor = interval.start_sec;

    for covered in covering {
        if covered.start_sec - cursor >= min_len {
            gaps.push(Interval::new(cursor, covered.start_sec));
        }
        cursor = cursor.max(covered.end_sec);
    }

    if interval.end_sec - cursor >= min_len {
        gaps.push(Interval::new(cursor, interval.end_sec));
    }

    gaps
}

fn dedupe_gaps(mut gaps: Vec<Interval>) -> Vec<Interval> {
    gaps.sort_by(|a, b| a.start_sec.partial_cmp(&b.start_sec).unwrap_or(std::cmp::Ordering::Equal));

    let mut merged: Vec<Interval> = Vec::new();
    for gap in gaps {
        if let Some(last) = merged.last_mut() {
            if gap.start_sec <= last.end_sec + GAP_MERGE_EPSILON_SEC {
                last.end_sec = last.end_sec.max(gap.end_sec);
                continue;
            }
        }
        merged.push(gap);
    }

    merged
}

/// Re-transcribe any segment whose `end` overshoots the media duration or
/// the next segment's `start` by more than a small tolerance, correcting
/// long-tail ASR hallucinations ("phantom tails").
async fn refine_overshoots(
    segments: &mut [Segment],
    media_duration_sec: f64,
    transcriber: &dyn Transcriber,
    audio_path: &Path,
    cancel: &CancelToken,
) -> Result<()> {
    let len = segments.len();

    for i in 0..len {
        cancel.check()?;

        let next_start = segments.get(i + 1).map(|s| s.start_sec).unwrap_or(media_duration_sec);
        let seg_end = segments[i].end_sec;
        let overshoots_media = seg_end > media_duration_sec + OVERSHOOT_TOLERANCE_SEC;
        let overshoots_next = seg_end > next_start + OVERSHOOT_TOLERANCE_SEC;

        if !overshoots_media && !overshoots_next {
            continue;
        }

        let true_end = next_start.min(media_duration_sec);
        if true_end <= segments[i].start_sec {
            continue;
        }

        let clip_path = std::env::temp_dir().join(format!("autosub_overshoot_{i}.wav"));
        if extract_audio_segment(audio_path, &clip_path, segments[i].start_sec, true_end).await.is_err() {
            continue;
        }

        let chunk = AudioChunk { interval: Interval::new(segments[i].start_sec, true_end), path: clip_path.clone(), index: i };

        if let Ok(mut corrected) = transcriber.transcribe(&chunk, "").await {
            if let Some(first) = corrected.drain(..).next() {
                segments[i].original = first.original;
                segments[i].end_sec = true_end;
                segments[i].avg_logprob = first.avg_logprob;
                segments[i].no_speech_prob = first.no_speech_prob;
            }
        }

        tokio::fs::remove_file(&clip_path).await.ok();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(start: f64, end: f64) -> Segment {
        Segment::new(start, end, "x")
    }

    #[test]
    fn find_gaps_detects_inter_segment_gap() {
        let segments = vec![seg(0.0, 5.0), seg(10.0, 12.0)];
        let gaps = find_gaps(&segments, &[], 20.0, 3.0);
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0], Interval::new(5.0, 10.0));
    }

    #[test]
    fn find_gaps_ignores_small_gaps() {
        let segments = vec![seg(0.0, 5.0), seg(6.0, 8.0)];
        let gaps = find_gaps(&segments, &[], 20.0, 3.0);
        assert!(gaps.is_empty());
    }

    #[test]
    fn sanity_scan_finds_uncovered_subrange_in_speech_interval() {
        let segments = vec![seg(0.0, 2.0), seg(8.0, 10.0)];
        let speech = vec![Interval::new(0.0, 10.0)];
        let gaps = find_gaps(&segments, &speech, 20.0, 3.0);
        assert!(gaps.iter().any(|g| g.start_sec == 2.0 && g.end_sec == 8.0));
    }

    #[test]
    fn dedupe_merges_close_gaps() {
        let gaps = vec![Interval::new(1.0, 2.0), Interval::new(2.005, 3.0)];
        let merged = dedupe_gaps(gaps);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0], Interval::new(1.0, 3.0));
    }

    #[test]
    fn truncate_words_caps_at_limit() {
        let text = "one two three four five";
        assert_eq!(truncate_words(text, 3), "one two three");
    }

    #[test]
    fn build_neighbor_context_takes_three_each_side() {
        let segments = vec![
            {
                let mut s = seg(0.0, 1.0);
                s.original = "a".to_string();
                s
            },
            {
                let mut s = seg(1.0, 2.0);
                s.original = "b".to_string();
                s
            },
            {
                let mut s = seg(10.0, 11.0);
                s.original = "c".to_string();
                s
            },
        ];
        let gap = Interval::new(2.0, 10.0);
        let ctx = build_neighbor_context(&segments, &gap);
        assert_eq!(ctx, "a b c");
    }
}
