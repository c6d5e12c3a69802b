//! Chunk planning and extraction (spec §4.2 steps 5-7): group speech
//! intervals into padded chunks bounded by `MIN_CHUNK_DURATION_SEC` and
//! `MAX_CHUNK_DURATION_SEC`, then cut each chunk to its own audio file.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{AutosubError, Result};
use crate::types::Interval;

use super::extract::extract_audio_segment;
use super::AudioChunk;

/// Configuration for audio chunking.
#[derive(Debug, Clone)]
pub struct ChunkConfig {
    pub min_chunk_duration_sec: f64,
    pub max_chunk_duration_sec: f64,
    pub pre_pad_sec: f64,
    pub post_pad_sec: f64,
    /// Maximum chunk file size in bytes (provider upload limit).
    pub max_file_size: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            min_chunk_duration_sec: 8.0,
            max_chunk_duration_sec: 15.0,
            pre_pad_sec: 0.10,
            post_pad_sec: 0.15,
            max_file_size: 20 * 1024 * 1024,
        }
    }
}

impl ChunkConfig {
    pub fn from_pipeline_config(config: &crate::config::Config) -> Self {
        Self {
            min_chunk_duration_sec: config.min_chunk_duration_sec,
            max_chunk_duration_sec: config.max_chunk_duration_sec,
            pre_pad_sec: config.pre_pad_sec,
            post_pad_sec: config.post_pad_sec,
            max_file_size: 20 * 1024 * 1024,
        }
    }
}

/// Plan chunks from normalized speech intervals (spec §4.2 step 5): walk the
/// intervals in order, accumulating a chunk until the next interval would
/// push it past `max_chunk_duration_sec`, then flush. A trailing pass merges
/// any chunk left under `min_chunk_duration_sec` into its neighbor when the
/// combination still fits.
pub fn plan_chunks(regions: &[Interval], total_duration_sec: f64, config: &ChunkConfig) -> Vec<Interval> {
    if regions.is_empty() {
        return plan_fixed_chunks(total_duration_sec, config.max_chunk_duration_sec);
    }

    let mut grouped: Vec<Interval> = Vec::new();
    let mut current: Option<Interval> = None;

    for region in regions {
        match current {
            None => current = Some(*region),
            Some(acc) => {
                let potential = region.end_sec - acc.start_sec;
                if potential > config.max_chunk_duration_sec {
                    grouped.push(acc);
                    current = Some(*region);
                } else {
                    current = Some(Interval::new(acc.start_sec, region.end_sec));
                }
            }
        }
    }
    if let Some(acc) = current {
        grouped.push(acc);
    }

    let merged = merge_short_trailing(grouped, config.min_chunk_duration_sec, config.max_chunk_duration_sec);

    merged
        .into_iter()
        .map(|chunk| pad_and_clamp(chunk, config.pre_pad_sec, config.post_pad_sec, total_duration_sec))
        .flat_map(|chunk| split_if_over_max(chunk, config.max_chunk_duration_sec))
        .collect()
}

/// Merge a chunk under `min_duration` into an adjacent one when the
/// combination still respects `max_duration`. Runs left-to-right once,
/// matching the walk-and-flush style used everywhere else in this module.
fn merge_short_trailing(chunks: Vec<Interval>, min_duration: f64, max_duration: f64) -> Vec<Interval> {
    if chunks.len() < 2 {
        return chunks;
    }

    let mut result: Vec<Interval> = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        if let Some(last) = result.last_mut() {
            let combined_duration = chunk.end_sec - last.start_sec;
            if (last.duration() < min_duration || chunk.duration() < min_duration)
                && combined_duration <= max_duration
            {
                last.end_sec = chunk.end_sec;
                continue;
            }
        }
        result.push(chunk);
    }
    result
}

fn pad_and_clamp(region: Interval, pre_pad: f64, post_pad: f64, total_duration_sec: f64) -> Interval {
    Interval::new(
        (region.start_sec - pre_pad).max(0.0),
        (region.end_sec + post_pad).min(total_duration_sec),
    )
}

/// Hard-split a padded chunk that overshoots `max_duration`, sliding forward
/// in fixed windows (unlike VAD's midpoint split, chunk cuts don't need to
/// be centered, just bounded).
fn split_if_over_max(region: Interval, max_duration: f64) -> Vec<Interval> {
    if region.duration() <= max_duration {
        return vec![region];
    }
    split_long_region(&region, max_duration)
}

/// Plan fixed-duration chunks when no VAD regions are available (e.g. a
/// music-only or silent file).
fn plan_fixed_chunks(total_duration_sec: f64, chunk_duration_sec: f64) -> Vec<Interval> {
    let mut chunks = Vec::new();
    let mut current = 0.0;

    while current < total_duration_sec {
        let end = (current + chunk_duration_sec).min(total_duration_sec);
        chunks.push(Interval::new(current, end));
        current = end;
    }

    chunks
}

/// Split a long interval into smaller fixed-size windows.
fn split_long_region(region: &Interval, max_duration_sec: f64) -> Vec<Interval> {
    let mut chunks = Vec::new();
    let mut current = region.start_sec;

    while current < region.end_sec {
        let end = (current + max_duration_sec).min(region.end_sec);
        chunks.push(Interval::new(current, end));
        current = end;
    }

    chunks
}

/// Create audio chunk files from planned intervals.
pub async fn create_chunks(
    source_audio: &Path,
    regions: &[Interval],
    output_dir: &Path,
) -> Result<Vec<AudioChunk>> {
    if !source_audio.exists() {
        return Err(AutosubError::FileNotFound(source_audio.display().to_string()));
    }

    std::fs::create_dir_all(output_dir)
        .map_err(|e| AutosubError::MediaExtract(format!("Failed to create output directory: {e}")))?;

    info!("Creating {} audio chunks in {}", regions.len(), output_dir.display());

    let mut chunks = Vec::new();

    for (index, region) in regions.iter().enumerate() {
        let chunk_path = output_dir.join(format!("chunk_{:04}.wav", index));

        debug!("Creating chunk {}: {:.2}s to {:.2}s", index, region.start_sec, region.end_sec);

        let _metadata =
            extract_audio_segment(source_audio, &chunk_path, region.start_sec, region.end_sec).await?;

        chunks.push(AudioChunk {
            interval: *region,
            path: chunk_path,
            index,
        });
    }

    info!("Created {} audio chunks", chunks.len());
    Ok(chunks)
}

/// Clean up chunk files.
pub fn cleanup_chunks(chunks: &[AudioChunk]) -> Result<()> {
    for chunk in chunks {
        if chunk.path.exists() {
            std::fs::remove_file(&chunk.path).map_err(|e| {
                AutosubError::MediaExtract(format!(
                    "Failed to remove chunk file {}: {e}",
                    chunk.path.display()
                ))
            })?;
        }
    }
    Ok(())
}

/// Temporary directory for chunk storage (used when no run-scoped temp dir
/// is supplied by the coordinator).
pub fn get_temp_chunk_dir() -> PathBuf {
    std::env::temp_dir().join("autosub_chunks")
}

/// Estimate file size for a WAV chunk (16-bit mono 16kHz).
pub fn estimate_wav_size(duration_sec: f64) -> usize {
    const SAMPLE_RATE: usize = 16000;
    const BYTES_PER_SAMPLE: usize = 2;
    const CHANNELS: usize = 1;
    const WAV_HEADER_SIZE: usize = 44;

    let samples = (duration_sec * SAMPLE_RATE as f64) as usize;
    WAV_HEADER_SIZE + (samples * BYTES_PER_SAMPLE * CHANNELS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_config_default() {
        let config = ChunkConfig::default();
        assert!(config.max_chunk_duration_sec > 0.0);
        assert!(config.max_file_size > 0);
    }

    #[test]
    fn test_plan_fixed_chunks() {
        let chunks = plan_fixed_chunks(100.0, 30.0);
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[0].start_sec, 0.0);
        assert_eq!(chunks[0].end_sec, 30.0);
        assert_eq!(chunks[3].start_sec, 90.0);
        assert_eq!(chunks[3].end_sec, 100.0);
    }

    #[test]
    fn test_split_long_region() {
        let region = Interval::new(0.0, 150.0);
        let chunks = split_long_region(&region, 60.0);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].duration(), 60.0);
        assert_eq!(chunks[1].duration(), 60.0);
        assert_eq!(chunks[2].duration(), 30.0);
    }

    #[test]
    fn test_plan_chunks_empty_regions_falls_back_to_fixed() {
        let config = ChunkConfig::default();
        let chunks = plan_chunks(&[], 60.0, &config);
        assert!(!chunks.is_empty());
    }

    #[test]
    fn test_plan_chunks_groups_until_max() {
        let config = ChunkConfig {
            max_chunk_duration_sec: 15.0,
            min_chunk_duration_sec: 8.0,
            pre_pad_sec: 0.0,
            post_pad_sec: 0.0,
            ..ChunkConfig::default()
        };

        let regions = vec![Interval::new(1.0, 5.0), Interval::new(6.0, 10.0)];
        let chunks = plan_chunks(&regions, 60.0, &config);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].start_sec, 1.0);
        assert_eq!(chunks[0].end_sec, 10.0);
    }

    #[test]
    fn test_plan_chunks_flushes_when_max_exceeded() {
        let config = ChunkConfig {
            max_chunk_duration_sec: 5.0,
            min_chunk_duration_sec: 1.0,
            pre_pad_sec: 0.0,
            post_pad_sec: 0.0,
            ..ChunkConfig::default()
        };

        let regions = vec![Interval::new(0.0, 4.0), Interval::new(4.5, 9.0)];
        let chunks = plan_chunks(&regions, 60.0, &config);
        assert_eq!(chunks.len(), 2);
    }

    #[test]
    fn test_plan_chunks_applies_padding_and_clamps() {
        let config = ChunkConfig {
            max_chunk_duration_sec: 15.0,
            min_chunk_duration_sec: 1.0,
            pre_pad_sec: 0.5,
            post_pad_sec: 0.5,
            ..ChunkConfig::default()
        };

        let regions = vec![Interval::new(0.1, 2.0)];
        let chunks = plan_chunks(&regions, 2.2, &config);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].start_sec, 0.0); // clamped, would be -0.4
        assert_eq!(chunks[0].end_sec, 2.2); // clamped, would be 2.5
    }

    #[test]
    fn test_estimate_wav_size() {
        let size = estimate_wav_size(60.0);
        let expected = 44 + (60 * 16000 * 2);
        assert_eq!(size, expected);
    }

    #[test]
    fn test_get_temp_chunk_dir() {
        let dir = get_temp_chunk_dir();
        assert!(dir.to_string_lossy().contains("autosub_chunks"));
    }
}
