pub mod chunk;
pub mod extract;
pub mod vad;

pub use chunk::{cleanup_chunks, create_chunks, plan_chunks};
pub use extract::{
    check_ffmpeg, check_ffprobe, decode_pcm_mono_16k, extract_audio, extract_audio_segment,
    extract_audio_with_progress, get_audio_duration, get_audio_info,
};
pub use vad::{detect_speech_regions, has_speech, total_speech_duration, VadConfig};

use crate::types::Interval;
use std::path::PathBuf;

/// Metadata about an audio file.
#[derive(Debug, Clone)]
pub struct AudioMetadata {
    pub duration_sec: f64,
    pub sample_rate: u32,
    pub channels: u16,
}

/// A chunk of audio ready for transcription (spec §4.2).
#[derive(Debug, Clone)]
pub struct AudioChunk {
    pub interval: Interval,
    pub path: PathBuf,
    pub index: usize,
}

impl AudioChunk {
    pub fn duration_sec(&self) -> f64 {
        self.interval.duration()
    }
}
