//! Subtitle finalization (spec §4.7): orphan fusion, gap extension, and
//! reindexing over the final segment list, then rendering into
//! `SubtitleEntry` values per the requested display mode.
//!
//! Grounded on `repair::dedupe_gaps`'s small-epsilon merge style for the gap
//! pass and `transcribe::segment::group_words`'s punctuation-aware joining
//! for fused text.

use std::time::Duration;

use crate::config::{Config, SubtitleMode};
use crate::types::{reindex, Segment};

use super::SubtitleEntry;

/// Literal line separating source and target text in dual-language output.
const DUAL_MODE_SEPARATOR: &str = "―";

/// Apply spec §4.7's finalization pass: fuse short orphaned segments into
/// their predecessor, extend short visual gaps shut, and reindex densely.
/// `segments` must already be sorted by `start_sec` (every producer in this
/// crate maintains that invariant).
pub fn finalize_segments(segments: Vec<Segment>, config: &Config) -> Vec<Segment> {
    let fused = fuse_orphans(segments, config.min_words_to_fuse, config.max_gap_to_fuse);
    let mut extended = extend_gaps(fused, config.subtitle_gap_threshold);
    reindex(&mut extended);
    extended
}

/// A segment with fewer than `min_words` words, following its predecessor by
/// less than `max_gap_sec`, is an ASR fragment rather than a standalone
/// caption: merge it into the previous segment instead of emitting it alone.
fn fuse_orphans(segments: Vec<Segment>, min_words: usize, max_gap_sec: f64) -> Vec<Segment> {
    let mut out: Vec<Segment> = Vec::with_capacity(segments.len());

    for segment in segments {
        let word_count = segment.original.split_whitespace().count();
        let is_orphan = word_count > 0 && word_count < min_words;

        if is_orphan {
            if let Some(prev) = out.last_mut() {
                let gap = segment.start_sec - prev.end_sec;
                if gap >= 0.0 && gap < max_gap_sec {
                    fuse_into(prev, &segment);
                    continue;
                }
            }
        }

        out.push(segment);
    }

    out
}

fn fuse_into(prev: &mut Segment, next: &Segment) {
    prev.end_sec = next.end_sec;
    prev.original = join_text(&prev.original, &next.original);
    prev.translation = match (&prev.translation, &next.translation) {
        (Some(a), Some(b)) => Some(join_text(a, b)),
        (Some(a), None) => Some(a.clone()),
        (None, Some(b)) => Some(b.clone()),
        (None, None) => None,
    };
    prev.words.extend(next.words.iter().cloned());
    prev.avg_logprob = match (prev.avg_logprob, next.avg_logprob) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, None) => a,
        (None, b) => b,
    };
}

fn join_text(a: &str, b: &str) -> String {
    let starts_with_punct = b.chars().next().map(|c| crate::transcribe::segment::starts_with_punctuation(c)).unwrap_or(false);
    if a.is_empty() {
        b.to_string()
    } else if b.is_empty() || starts_with_punct {
        format!("{a}{b}")
    } else {
        format!("{a} {b}")
    }
}

/// Close a visible gap between consecutive segments when it's small enough
/// that leaving it would read as a flicker rather than a deliberate pause.
fn extend_gaps(mut segments: Vec<Segment>, threshold_sec: f64) -> Vec<Segment> {
    for i in 0..segments.len().saturating_sub(1) {
        let next_start = segments[i + 1].start_sec;
        let gap = next_start - segments[i].end_sec;
        if gap > 0.0 && gap < threshold_sec {
            segments[i].end_sec = next_start;
        }
    }
    segments
}

/// Render finalized segments into display-ready `SubtitleEntry` values.
pub fn to_subtitle_entries(segments: &[Segment], mode: SubtitleMode) -> Vec<SubtitleEntry> {
    segments
        .iter()
        .map(|segment| SubtitleEntry {
            index: segment.index,
            start: Duration::from_secs_f64(segment.start_sec.max(0.0)),
            end: Duration::from_secs_f64(segment.end_sec.max(segment.start_sec.max(0.0))),
            text: render_text(segment, mode),
            speaker: None,
        })
        .collect()
}

fn render_text(segment: &Segment, mode: SubtitleMode) -> String {
    match mode {
        SubtitleMode::Original => segment.original.clone(),
        SubtitleMode::Translated => segment.translation.clone().unwrap_or_else(|| segment.original.clone()),
        SubtitleMode::Dual => {
            let target = segment.translation.clone().unwrap_or_else(|| segment.original.clone());
            format!("{}\n{DUAL_MODE_SEPARATOR}\n{}", segment.original, target)
        }
    }
}

/// Finalize and render in one step, using `config`'s finalization constants
/// and `config.default_subtitle_mode`.
pub fn convert_to_subtitles(segments: Vec<Segment>, config: &Config) -> Vec<SubtitleEntry> {
    let finalized = finalize_segments(segments, config);
    to_subtitle_entries(&finalized, config.default_subtitle_mode)
}
