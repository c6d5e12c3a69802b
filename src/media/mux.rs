//! Runs a built filtergraph through `ffmpeg` and muxes the resulting audio
//! track against the source video (spec §4.8 C8, final assembly step).
//!
//! Grounded on the multi-input `Command` construction, `-map`, and
//! concat-file muxing pattern from the pack's video-editing reference file.

use std::path::{Path, PathBuf};

use tokio::process::Command;
use tracing::{debug, info};

use crate::cancel::CancelToken;
use crate::error::{AutosubError, Result};

use super::filtergraph::{build_mix_filtergraph, ClipPlacement};

/// Run a set of clip placements through ffmpeg's `-filter_complex` and
/// write the mixed-down audio track to `output`.
pub async fn render_mixed_audio(
    clip_files: &[PathBuf],
    clips: &[ClipPlacement],
    background: Option<&Path>,
    background_volume: f64,
    output: &Path,
    cancel: &CancelToken,
) -> Result<()> {
    cancel.check()?;

    if clip_files.len() != clips.len() {
        return Err(AutosubError::DubFitFailed(
            "clip file count does not match clip placement count".to_string(),
        ));
    }

    let background_input_index = background.map(|_| clip_files.len());
    let (filter_complex, out_label) =
        build_mix_filtergraph(clips, background_input_index, background_volume);

    if filter_complex.is_empty() {
        return Err(AutosubError::DubFitFailed("no clips to mix".to_string()));
    }

    let mut cmd = Command::new("ffmpeg");
    cmd.arg("-y").arg("-nostdin");

    for file in clip_files {
        cmd.arg("-i").arg(file);
    }
    if let Some(bg) = background {
        cmd.arg("-i").arg(bg);
    }

    cmd.arg("-filter_complex").arg(&filter_complex);
    cmd.arg("-map").arg(format!("[{out_label}]"));
    cmd.arg("-ac").arg("2").arg("-ar").arg("48000");
    cmd.arg(output);

    debug!("Running ffmpeg mix with {} inputs", clip_files.len());
    let status = cmd
        .output()
        .await
        .map_err(|e| AutosubError::DubFitFailed(format!("failed to spawn FFmpeg: {e}")))?;

    if !status.status.success() {
        let stderr = String::from_utf8_lossy(&status.stderr);
        return Err(AutosubError::DubFitFailed(format!("FFmpeg mix failed: {stderr}")));
    }

    info!("Mixed dub audio written to {}", output.display());
    Ok(())
}

/// Replace the audio track of `video` with `dub_audio`, keeping the
/// original video stream untouched (spec §4.8: "the dub never re-encodes
/// video").
pub async fn mux_audio_onto_video(
    video: &Path,
    dub_audio: &Path,
    output: &Path,
    cancel: &CancelToken,
) -> Result<()> {
    cancel.check()?;

    let status = Command::new("ffmpeg")
        .arg("-y")
        .arg("-nostdin")
        .arg("-i")
        .arg(video)
        .arg("-i")
        .arg(dub_audio)
        .args(["-map", "0:v:0", "-map", "1:a:0"])
        .args(["-c:v", "copy", "-c:a", "aac", "-b:a", "192k"])
        .arg("-shortest")
        .arg(output)
        .output()
        .await
        .map_err(|e| AutosubError::MediaMux(format!("failed to spawn FFmpeg: {e}")))?;

    if !status.status.success() {
        let stderr = String::from_utf8_lossy(&status.stderr);
        return Err(AutosubError::MediaMux(format!("FFmpeg mux failed: {stderr}")));
    }

    info!("Dubbed video written to {}", output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn render_mixed_audio_rejects_mismatched_lengths() {
        let clips = vec![ClipPlacement {
            input_index: 0,
            start_sec: 0.0,
            atempo: 1.0,
            target_duration_sec: 1.0,
        }];
        let result = render_mixed_audio(
            &[],
            &clips,
            None,
            0.2,
            Path::new("/tmp/out.wav"),
            &CancelToken::new(),
        )
        .await;
        assert!(matches!(result, Err(AutosubError::DubFitFailed(_))));
    }

    #[tokio::test]
    async fn render_mixed_audio_respects_cancellation() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let result = render_mixed_audio(&[], &[], None, 0.2, Path::new("/tmp/out.wav"), &cancel).await;
        assert!(matches!(result, Err(AutosubError::Cancelled)));
    }
}
