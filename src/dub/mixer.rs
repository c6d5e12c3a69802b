//! Final dub mixing stages (spec §4.8 steps 5-6): optional end-to-end
//! retime of the assembled voice track, then a weighted blend against the
//! original ambient track. Grounded on `media::mux`'s multi-input `Command`
//! construction, generalized to the asymmetric volume/weight formulas spec
//! §4.8 names instead of a flat `amix`.

use std::path::Path;

use tokio::process::Command;
use tracing::{debug, info};

use crate::cancel::CancelToken;
use crate::error::{AutosubError, Result};
use crate::media::filtergraph::atempo_filter_chain;

/// Drift beyond which the assembled voice track is retimed to match the
/// original media duration (spec §4.8 step 5).
const RETIME_DRIFT_THRESHOLD: f64 = 0.03;

/// If `voice_duration_sec` overshoots `target_duration_sec` by more than
/// `RETIME_DRIFT_THRESHOLD`, shrink the whole track with a composed
/// `atempo` chain; otherwise pass it through unchanged.
pub async fn retime_if_drifted(
    voice_track: &Path,
    voice_duration_sec: f64,
    target_duration_sec: f64,
    output: &Path,
    cancel: &CancelToken,
) -> Result<()> {
    cancel.check()?;

    if target_duration_sec <= 0.0 {
        return Err(AutosubError::DubFitFailed("target duration must be positive".to_string()));
    }

    let drift = (voice_duration_sec - target_duration_sec) / target_duration_sec;

    if drift.abs() <= RETIME_DRIFT_THRESHOLD {
        tokio::fs::copy(voice_track, output).await?;
        return Ok(());
    }

    let ratio = voice_duration_sec / target_duration_sec;
    let filter = atempo_filter_chain(ratio);

    let status = Command::new("ffmpeg")
        .arg("-y")
        .arg("-nostdin")
        .arg("-i")
        .arg(voice_track)
        .arg("-filter:a")
        .arg(&filter)
        .arg(output)
        .output()
        .await
        .map_err(|e| AutosubError::DubFitFailed(format!("failed to spawn FFmpeg retime: {e}")))?;

    if !status.status.success() {
        let stderr = String::from_utf8_lossy(&status.stderr);
        return Err(AutosubError::DubFitFailed(format!("FFmpeg retime failed: {stderr}")));
    }

    info!("Retimed voice track (drift {:.1}%) written to {}", drift * 100.0, output.display());
    Ok(())
}

/// Weighting derived from `ambient_mix` (spec §4.8 step 6): `0.0` is full
/// voice, `1.0` is full ambient.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MixWeights {
    pub background_volume: f64,
    pub voice_volume: f64,
    pub ambient_weight: f64,
    pub voice_weight: f64,
    pub normalize: bool,
}

pub fn compute_mix_weights(ambient_mix: f64) -> MixWeights {
    let mix = ambient_mix.clamp(0.0, 1.0);

    let ambient_active = mix > 0.001;
    let voice_active = (1.0 - mix) > 0.001;

    MixWeights {
        background_volume: if ambient_active { 0.20 + mix * 0.35 } else { 0.0 },
        voice_volume: if voice_active { 1.25 + (1.0 - mix) * 0.35 } else { 0.0 },
        ambient_weight: if ambient_active { (0.5 + mix) * mix } else { 0.0 },
        voice_weight: if voice_active { 2.0 * (1.0 - mix) } else { 0.0 },
        normalize: ambient_active && voice_active,
    }
}

/// Blend the voice track with the original ambient track per `ambient_mix`
/// and mux the result onto `video` if present.
pub async fn mix_with_ambient(
    voice_track: &Path,
    ambient_track: &Path,
    ambient_mix: f64,
    output: &Path,
    cancel: &CancelToken,
) -> Result<()> {
    cancel.check()?;

    let weights = compute_mix_weights(ambient_mix);

    let filter = format!(
        "[0:a]volume={voice_vol:.4}[v];[1:a]volume={bg_vol:.4}[b];\
[v][b]amix=inputs=2:weights={voice_w:.4} {ambient_w:.4}:normalize={norm}[mixed]",
        voice_vol = weights.voice_volume,
        bg_vol = weights.background_volume,
        voice_w = weights.voice_weight,
        ambient_w = weights.ambient_weight,
        norm = if weights.normalize { 1 } else { 0 },
    );

    debug!("ambient mix filter: {}", filter);

    let status = Command::new("ffmpeg")
        .arg("-y")
        .arg("-nostdin")
        .arg("-i")
        .arg(voice_track)
        .arg("-i")
        .arg(ambient_track)
        .arg("-filter_complex")
        .arg(&filter)
        .arg("-map")
        .arg("[mixed]")
        .arg(output)
        .output()
        .await
        .map_err(|e| AutosubError::DubFitFailed(format!("failed to spawn FFmpeg ambient mix: {e}")))?;

    if !status.status.success() {
        let stderr = String::from_utf8_lossy(&status.stderr);
        return Err(AutosubError::DubFitFailed(format!("FFmpeg ambient mix failed: {stderr}")));
    }

    info!("Ambient-mixed dub audio written to {}", output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_voice_when_mix_is_zero() {
        let w = compute_mix_weights(0.0);
        assert_eq!(w.background_volume, 0.0);
        assert_eq!(w.ambient_weight, 0.0);
        assert!(w.voice_volume > 0.0);
        assert!(!w.normalize);
    }

    #[test]
    fn full_ambient_when_mix_is_one() {
        let w = compute_mix_weights(1.0);
        assert_eq!(w.voice_volume, 0.0);
        assert_eq!(w.voice_weight, 0.0);
        assert!(w.background_volume > 0.0);
        assert!(!w.normalize);
    }

    #[test]
    fn both_active_and_normalized_at_midpoint() {
        let w = compute_mix_weights(0.5);
        assert!(w.normalize);
        assert!(w.background_volume > 0.0);
        assert!(w.voice_volume > 0.0);
    }

    #[test]
    fn clamps_out_of_range_mix() {
        let w = compute_mix_weights(-1.0);
        assert_eq!(w, compute_mix_weights(0.0));
        let w = compute_mix_weights(2.0);
        assert_eq!(w, compute_mix_weights(1.0));
    }

    #[tokio::test]
    async fn retime_rejects_cancellation() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let result =
            retime_if_drifted(Path::new("/tmp/in.wav"), 10.0, 9.0, Path::new("/tmp/out.wav"), &cancel).await;
        assert!(matches!(result, Err(AutosubError::Cancelled)));
    }

    #[tokio::test]
    async fn retime_rejects_nonpositive_target() {
        let cancel = CancelToken::new();
        let result =
            retime_if_drifted(Path::new("/tmp/in.wav"), 10.0, 0.0, Path::new("/tmp/out.wav"), &cancel).await;
        assert!(result.is_err());
    }
}
