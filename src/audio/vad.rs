//! Voice-activity detection: fixed-frame energy classification, interval
//! normalization, merge, and long-silence subdivision (spec §4.2 steps 1-4).

use std::path::Path;

use tracing::{debug, info};

use crate::error::Result;
use crate::types::Interval;

use super::extract::decode_pcm_mono_16k;

/// Configuration for voice activity detection.
#[derive(Debug, Clone)]
pub struct VadConfig {
    /// 0 (least aggressive, permissive) ..= 3 (most aggressive, strict).
    pub aggressiveness: u8,
    /// Frame size in milliseconds; spec allows 10/20/30.
    pub frame_ms: u32,
    pub vad_normalization_min_gap_sec: f64,
    pub vad_normalization_min_duration_sec: f64,
    pub merge_gap_sec: f64,
    pub max_speechless_sec: f64,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            aggressiveness: 2,
            frame_ms: 30,
            vad_normalization_min_gap_sec: 0.5,
            vad_normalization_min_duration_sec: 0.2,
            merge_gap_sec: 0.5,
            max_speechless_sec: 15.0,
        }
    }
}

impl VadConfig {
    pub fn from_pipeline_config(config: &crate::config::Config) -> Self {
        Self {
            aggressiveness: config.vad_aggressiveness,
            frame_ms: 30,
            vad_normalization_min_gap_sec: config.vad_normalization_min_gap_sec,
            merge_gap_sec: config.merge_gap_sec,
            vad_normalization_min_duration_sec: config.vad_normalization_min_duration_sec,
            max_speechless_sec: config.max_speechless_sec,
        }
    }

    /// Energy threshold implied by the aggressiveness knob: higher
    /// aggressiveness requires louder frames to count as speech.
    fn energy_threshold(&self) -> f32 {
        match self.aggressiveness {
            0 => 0.006,
            1 => 0.010,
            2 => 0.016,
            _ => 0.024,
        }
    }
}

/// RMS (root-mean-square) energy of a sample window, normalized to 0.0..=1.0.
fn calculate_rms(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f64 = samples
        .iter()
        .map(|&s| {
            let normalized = s as f64 / i16::MAX as f64;
            normalized * normalized
        })
        .sum();

    (sum_squares / samples.len() as f64).sqrt() as f32
}

/// Step 1: classify consecutive, non-overlapping frames as speech/non-speech.
fn classify_frames(samples: &[i16], sample_rate: u32, config: &VadConfig) -> Vec<bool> {
    let frame_len = ((sample_rate as u64 * config.frame_ms as u64) / 1000) as usize;
    if frame_len == 0 {
        return Vec::new();
    }
    let threshold = config.energy_threshold();

    samples
        .chunks(frame_len)
        .map(|frame| calculate_rms(frame) >= threshold)
        .collect()
}

/// Step 2: flush raw intervals from frame classifications, including a
/// trailing open interval if the clip ends mid-speech.
fn frames_to_raw_intervals(frames: &[bool], frame_dur_sec: f64) -> Vec<Interval> {
    let mut intervals = Vec::new();
    let mut open_start: Option<usize> = None;

    for (i, &is_speech) in frames.iter().enumerate() {
        match (is_speech, open_start) {
            (true, None) => open_start = Some(i),
            (false, Some(start)) => {
                intervals.push(Interval::new(
                    start as f64 * frame_dur_sec,
                    i as f64 * frame_dur_sec,
                ));
                open_start = None;
            }
            _ => {}
        }
    }

    if let Some(start) = open_start {
        intervals.push(Interval::new(
            start as f64 * frame_dur_sec,
            frames.len() as f64 * frame_dur_sec,
        ));
    }

    intervals
}

/// Step 3: sort, merge near-adjacent intervals, and drop ones too short to
/// be meaningful speech.
fn normalize_intervals(mut intervals: Vec<Interval>, min_gap: f64, min_duration: f64) -> Vec<Interval> {
    intervals.sort_by(|a, b| a.start_sec.partial_cmp(&b.start_sec).unwrap());

    let mut merged: Vec<Interval> = Vec::new();
    for interval in intervals.drain(..) {
        if let Some(last) = merged.last_mut() {
            if last.gap_to(&interval) < min_gap {
                last.end_sec = last.end_sec.max(interval.end_sec);
                continue;
            }
        }
        merged.push(interval);
    }

    merged
        .into_iter()
        .filter(|i| i.duration() >= min_duration)
        .collect()
}

/// Step 4a: merge adjacent speech intervals separated by less than
/// `merge_gap`.
fn merge_close(mut intervals: Vec<Interval>, merge_gap: f64) -> Vec<Interval> {
    intervals.sort_by(|a, b| a.start_sec.partial_cmp(&b.start_sec).unwrap());

    let mut merged: Vec<Interval> = Vec::new();
    for interval in intervals.drain(..) {
        if let Some(last) = merged.last_mut() {
            if last.gap_to(&interval) < merge_gap {
                last.end_sec = last.end_sec.max(interval.end_sec);
                continue;
            }
        }
        merged.push(interval);
    }
    merged
}

/// Step 4b: recursively split any interval longer than `max_speechless` by
/// midpoint until every piece fits.
fn split_long_intervals(intervals: Vec<Interval>, max_speechless: f64) -> Vec<Interval> {
    fn split_one(interval: Interval, max_speechless: f64, out: &mut Vec<Interval>) {
        if interval.duration() <= max_speechless {
            out.push(interval);
            return;
        }
        let mid = (interval.start_sec + interval.end_sec) / 2.0;
        split_one(Interval::new(interval.start_sec, mid), max_speechless, out);
        split_one(Interval::new(mid, interval.end_sec), max_speechless, out);
    }

    let mut out = Vec::with_capacity(intervals.len());
    for interval in intervals {
        split_one(interval, max_speechless, &mut out);
    }
    out
}

/// Detect speech intervals in an audio file (spec §4.2 steps 1-4 end to end).
pub fn detect_speech_regions(audio_path: &Path, config: &VadConfig) -> Result<Vec<Interval>> {
    let (samples, sample_rate) = decode_pcm_mono_16k(audio_path)?;

    if samples.is_empty() {
        return Ok(Vec::new());
    }

    debug!("Total samples: {}", samples.len());

    let frames = classify_frames(&samples, sample_rate, config);
    let frame_dur_sec = config.frame_ms as f64 / 1000.0;

    let raw = frames_to_raw_intervals(&frames, frame_dur_sec);
    let normalized = normalize_intervals(
        raw,
        config.vad_normalization_min_gap_sec,
        config.vad_normalization_min_duration_sec,
    );
    let merged = merge_close(normalized, config.merge_gap_sec);
    let regions = split_long_intervals(merged, config.max_speechless_sec);

    let total_duration = samples.len() as f64 / sample_rate as f64;
    info!(
        "Detected {} speech regions in {:.2}s of audio",
        regions.len(),
        total_duration
    );

    Ok(regions)
}

pub fn has_speech(audio_path: &Path, config: &VadConfig) -> Result<bool> {
    Ok(!detect_speech_regions(audio_path, config)?.is_empty())
}

pub fn total_speech_duration(regions: &[Interval]) -> f64 {
    regions.iter().map(|r| r.duration()).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calculate_rms_silence() {
        let samples = vec![0i16; 100];
        assert_eq!(calculate_rms(&samples), 0.0);
    }

    #[test]
    fn test_calculate_rms_loud() {
        let samples = vec![i16::MAX; 100];
        let rms = calculate_rms(&samples);
        assert!((rms - 1.0).abs() < 0.001);
    }

    #[test]
    fn test_classify_frames() {
        let config = VadConfig::default();
        // 30ms @ 16kHz = 480 samples/frame.
        let mut samples = vec![0i16; 480]; // silent frame
        samples.extend(vec![i16::MAX; 480]); // loud frame
        let frames = classify_frames(&samples, 16000, &config);
        assert_eq!(frames, vec![false, true]);
    }

    #[test]
    fn test_frames_to_raw_intervals_flushes_trailing_speech() {
        let frames = vec![false, true, true, false, true];
        let intervals = frames_to_raw_intervals(&frames, 0.03);
        assert_eq!(intervals.len(), 2);
        // Trailing speech frame flushed as an open interval.
        assert_eq!(intervals[1].start_sec, 4.0 * 0.03);
        assert_eq!(intervals[1].end_sec, 5.0 * 0.03);
    }

    #[test]
    fn test_normalize_merges_small_gaps_and_drops_short() {
        let intervals = vec![
            Interval::new(0.0, 0.5),
            Interval::new(0.6, 1.0), // gap 0.1s < 0.5s -> merges with previous
            Interval::new(5.0, 5.05), // too short (< 0.2s) -> dropped
        ];
        let result = normalize_intervals(intervals, 0.5, 0.2);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].start_sec, 0.0);
        assert_eq!(result[0].end_sec, 1.0);
    }

    #[test]
    fn test_merge_close_respects_gap() {
        let intervals = vec![Interval::new(0.0, 1.0), Interval::new(1.4, 2.0)];
        let merged = merge_close(intervals, 0.5);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].end_sec, 2.0);
    }

    #[test]
    fn test_split_long_intervals_recursively_halves() {
        let intervals = vec![Interval::new(0.0, 40.0)];
        let split = split_long_intervals(intervals, 15.0);
        assert!(split.iter().all(|i| i.duration() <= 15.0));
        // Total coverage is preserved.
        let total: f64 = split.iter().map(|i| i.duration()).sum();
        assert!((total - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_total_speech_duration() {
        let regions = vec![Interval::new(0.0, 5.0), Interval::new(10.0, 15.0)];
        assert_eq!(total_speech_duration(&regions), 10.0);
    }

    #[test]
    fn test_vad_config_default() {
        let config = VadConfig::default();
        assert!(config.energy_threshold() > 0.0);
        assert_eq!(config.merge_gap_sec, 0.5);
        assert_eq!(config.max_speechless_sec, 15.0);
    }

    #[test]
    fn test_empty_frames_produce_no_intervals() {
        let intervals = frames_to_raw_intervals(&[], 0.03);
        assert!(intervals.is_empty());
    }
}
