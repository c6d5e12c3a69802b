//! Media probing, extraction and PCM decode (spec §4.1 C1), driven through
//! `ffmpeg`/`ffprobe` subprocesses exactly as the teacher's extraction layer
//! does, generalized to `f64` seconds throughout.

use std::path::Path;
use std::process::Command;

use hound::WavReader;
use tracing::{debug, info};

use crate::error::{AutosubError, Result};

use super::AudioMetadata;

/// Check if FFmpeg is installed and accessible.
pub fn check_ffmpeg() -> Result<()> {
    let output = Command::new("ffmpeg").arg("-version").output().map_err(|e| {
        AutosubError::MediaExtract(format!(
            "FFmpeg not found. Please install FFmpeg and ensure it's in your PATH. Error: {e}"
        ))
    })?;

    if !output.status.success() {
        return Err(AutosubError::MediaExtract("FFmpeg check failed".to_string()));
    }

    debug!("FFmpeg is available");
    Ok(())
}

/// Check if FFprobe is installed and accessible.
pub fn check_ffprobe() -> Result<()> {
    let output = Command::new("ffprobe").arg("-version").output().map_err(|e| {
        AutosubError::MediaProbe(format!(
            "FFprobe not found. Please install FFmpeg (includes FFprobe). Error: {e}"
        ))
    })?;

    if !output.status.success() {
        return Err(AutosubError::MediaProbe("FFprobe check failed".to_string()));
    }

    debug!("FFprobe is available");
    Ok(())
}

/// Probe media duration in seconds using FFprobe (C1 `probe_duration`).
pub fn get_audio_duration(input: &Path) -> Result<f64> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(input)
        .output()
        .map_err(|e| AutosubError::MediaProbe(format!("Failed to run FFprobe: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(AutosubError::MediaProbe(format!("FFprobe failed: {stderr}")));
    }

    let duration_str = String::from_utf8_lossy(&output.stdout);
    duration_str.trim().parse().map_err(|e| {
        AutosubError::MediaProbe(format!(
            "Failed to parse duration '{}': {e}",
            duration_str.trim()
        ))
    })
}

/// Get audio metadata (sample rate, channels) using FFprobe.
pub fn get_audio_info(input: &Path) -> Result<(u32, u16)> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-select_streams",
            "a:0",
            "-show_entries",
            "stream=sample_rate,channels",
            "-of",
            "csv=s=,:p=0",
        ])
        .arg(input)
        .output()
        .map_err(|e| AutosubError::MediaProbe(format!("Failed to run FFprobe: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(AutosubError::MediaProbe(format!("FFprobe failed: {stderr}")));
    }

    let info_str = String::from_utf8_lossy(&output.stdout);
    let parts: Vec<&str> = info_str.trim().split(',').collect();

    if parts.len() < 2 {
        return Err(AutosubError::MediaProbe(format!(
            "Failed to parse audio info: {}",
            info_str.trim()
        )));
    }

    let sample_rate: u32 = parts[0]
        .parse()
        .map_err(|e| AutosubError::MediaProbe(format!("Failed to parse sample rate: {e}")))?;

    let channels: u16 = parts[1]
        .parse()
        .map_err(|e| AutosubError::MediaProbe(format!("Failed to parse channels: {e}")))?;

    Ok((sample_rate, channels))
}

/// Extract audio from a video/audio file and convert to WAV format.
///
/// The output is mono 16-bit PCM at 16kHz, which is what VAD and the ASR
/// providers expect.
pub async fn extract_audio(input: &Path, output: &Path) -> Result<AudioMetadata> {
    check_ffmpeg()?;
    check_ffprobe()?;

    if !input.exists() {
        return Err(AutosubError::FileNotFound(input.display().to_string()));
    }

    info!("Extracting audio from {}", input.display());

    let duration_sec = get_audio_duration(input)?;
    debug!("Input duration: {:.2}s", duration_sec);

    let status = Command::new("ffmpeg")
        .args(["-y", "-i"])
        .arg(input)
        .args(["-vn", "-acodec", "pcm_s16le", "-ar", "16000", "-ac", "1"])
        .arg(output)
        .status()
        .map_err(|e| AutosubError::MediaExtract(format!("Failed to run FFmpeg: {e}")))?;

    if !status.success() {
        return Err(AutosubError::MediaExtract(
            "FFmpeg audio extraction failed".to_string(),
        ));
    }

    if !output.exists() {
        return Err(AutosubError::MediaExtract(
            "Output file was not created".to_string(),
        ));
    }

    info!("Audio extracted to {}", output.display());

    Ok(AudioMetadata {
        duration_sec,
        sample_rate: 16000,
        channels: 1,
    })
}

/// Extract audio with a fractional-progress callback, parsed from FFmpeg's
/// `-progress pipe:1` stream.
pub async fn extract_audio_with_progress<F>(
    input: &Path,
    output: &Path,
    mut progress_callback: F,
) -> Result<AudioMetadata>
where
    F: FnMut(f64),
{
    check_ffmpeg()?;
    check_ffprobe()?;

    if !input.exists() {
        return Err(AutosubError::FileNotFound(input.display().to_string()));
    }

    info!("Extracting audio from {}", input.display());

    let duration_sec = get_audio_duration(input)?;
    debug!("Input duration: {:.2}s", duration_sec);

    let mut child = std::process::Command::new("ffmpeg")
        .args(["-y", "-progress", "pipe:1", "-i"])
        .arg(input)
        .args(["-vn", "-acodec", "pcm_s16le", "-ar", "16000", "-ac", "1"])
        .arg(output)
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::null())
        .spawn()
        .map_err(|e| AutosubError::MediaExtract(format!("Failed to spawn FFmpeg: {e}")))?;

    if let Some(stdout) = child.stdout.take() {
        use std::io::{BufRead, BufReader};
        let reader = BufReader::new(stdout);

        for line in reader.lines().map_while(|l| l.ok()) {
            if let Some(raw) = line.strip_prefix("out_time_us=") {
                if let Ok(time_us) = raw.parse::<i64>() {
                    if time_us > 0 {
                        let current_secs = time_us as f64 / 1_000_000.0;
                        let progress = (current_secs / duration_sec).min(1.0);
                        progress_callback(progress);
                    }
                }
            }
        }
    }

    let status = child
        .wait()
        .map_err(|e| AutosubError::MediaExtract(format!("Failed to wait for FFmpeg: {e}")))?;

    if !status.success() {
        return Err(AutosubError::MediaExtract(
            "FFmpeg audio extraction failed".to_string(),
        ));
    }

    progress_callback(1.0);

    if !output.exists() {
        return Err(AutosubError::MediaExtract(
            "Output file was not created".to_string(),
        ));
    }

    info!("Audio extracted to {}", output.display());

    Ok(AudioMetadata {
        duration_sec,
        sample_rate: 16000,
        channels: 1,
    })
}

/// Extract a segment of audio between `start_sec` and `end_sec` (C1
/// `extract_segment`).
pub async fn extract_audio_segment(
    input: &Path,
    output: &Path,
    start_sec: f64,
    end_sec: f64,
) -> Result<AudioMetadata> {
    check_ffmpeg()?;

    if !input.exists() {
        return Err(AutosubError::FileNotFound(input.display().to_string()));
    }

    let duration_sec = (end_sec - start_sec).max(0.0);
    if duration_sec == 0.0 {
        return Err(AutosubError::MediaExtract("Segment duration is zero".to_string()));
    }

    let start_str = format!("{:.3}", start_sec);
    let duration_str = format!("{:.3}", duration_sec);

    debug!("Extracting segment: start={}, duration={}", start_str, duration_str);

    let status = Command::new("ffmpeg")
        .args(["-y", "-ss"])
        .arg(&start_str)
        .args(["-t"])
        .arg(&duration_str)
        .args(["-i"])
        .arg(input)
        .args(["-vn", "-acodec", "pcm_s16le", "-ar", "16000", "-ac", "1"])
        .arg(output)
        .status()
        .map_err(|e| AutosubError::MediaExtract(format!("Failed to run FFmpeg: {e}")))?;

    if !status.success() {
        return Err(AutosubError::MediaExtract(
            "FFmpeg segment extraction failed".to_string(),
        ));
    }

    Ok(AudioMetadata {
        duration_sec,
        sample_rate: 16000,
        channels: 1,
    })
}

/// Decode a 16kHz mono WAV file (as produced by [`extract_audio`]) into raw
/// `i16` PCM samples, upmixing/resampling defensively if the file does not
/// already match (VAD always calls this on our own extraction output, but a
/// caller-supplied WAV is handled too).
pub fn decode_pcm_mono_16k(path: &Path) -> Result<(Vec<i16>, u32)> {
    let reader = WavReader::open(path)
        .map_err(|e| AutosubError::MediaExtract(format!("Failed to open WAV file: {e}")))?;

    let spec = reader.spec();
    let sample_rate = spec.sample_rate;

    info!(
        "Decoding PCM: {} Hz, {} channels, {} bits",
        sample_rate, spec.channels, spec.bits_per_sample
    );

    let interleaved: Vec<i16> = match spec.sample_format {
        hound::SampleFormat::Int => reader.into_samples::<i16>().map(|s| s.unwrap_or(0)).collect(),
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .map(|s| (s.unwrap_or(0.0) * i16::MAX as f32) as i16)
            .collect(),
    };

    let samples = if spec.channels <= 1 {
        interleaved
    } else {
        interleaved
            .chunks(spec.channels as usize)
            .map(|frame| {
                let sum: i64 = frame.iter().map(|&s| s as i64).sum();
                (sum / frame.len() as i64) as i16
            })
            .collect()
    };

    Ok((samples, sample_rate))
}
