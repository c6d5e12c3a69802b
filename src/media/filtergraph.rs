//! Builds `ffmpeg -filter_complex` graphs for dub assembly (spec §4.8 C8):
//! each TTS clip is time-stretched to fit its slot, padded/trimmed to an
//! exact duration, delayed to its timeline offset, then mixed down.
//!
//! Grounded on the `-filter_complex` construction and multi-input `Command`
//! wiring pattern used for transition/overlay rendering in the pack's
//! video-editing reference file (`build_transition_filter` + the
//! `-filter_complex` / `-map` combination), generalized from video
//! transitions to audio clip placement.

/// One TTS clip placed on the dub timeline.
#[derive(Debug, Clone)]
pub struct ClipPlacement {
    /// Index of this clip's file among the `-i` inputs passed to ffmpeg.
    pub input_index: usize,
    /// Where the clip should start on the output timeline.
    pub start_sec: f64,
    /// Playback speed multiplier applied via `atempo` (> 1.0 compresses,
    /// < 1.0 stretches). Must already be within the provider's allowed
    /// compression ratio; the dub aligner enforces that, not this module.
    pub atempo: f64,
    /// Exact duration the clip must occupy after stretching (`atrim`/`apad`
    /// make up the difference from rounding or residual mismatch).
    pub target_duration_sec: f64,
}

/// `atempo` only accepts factors in `0.5..=2.0`; chain multiple stages to
/// reach factors outside that range.
fn atempo_chain(mut factor: f64) -> Vec<f64> {
    let mut stages = Vec::new();
    if factor <= 0.0 || !factor.is_finite() {
        return vec![1.0];
    }
    while factor > 2.0 {
        stages.push(2.0);
        factor /= 2.0;
    }
    while factor < 0.5 {
        stages.push(0.5);
        factor /= 0.5;
    }
    stages.push(factor);
    stages
}

/// Render `atempo_chain(factor)` as a comma-joined `-filter:a` argument, for
/// callers stretching a single whole file rather than a filtergraph input pad.
pub fn atempo_filter_chain(factor: f64) -> String {
    atempo_chain(factor)
        .into_iter()
        .map(|f| format!("atempo={f:.6}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Build the filter_complex string and the final mixed-output label for a
/// set of clip placements over a `background` track (input index
/// `background_input_index`, typically the extracted original audio kept at
/// reduced volume, or silence if no background is desired).
pub fn build_mix_filtergraph(
    clips: &[ClipPlacement],
    background_input_index: Option<usize>,
    background_volume: f64,
) -> (String, String) {
    let mut stages: Vec<String> = Vec::new();
    let mut mix_labels: Vec<String> = Vec::new();

    for (i, clip) in clips.iter().enumerate() {
        let label = format!("clip{i}");
        let atempo_filters = atempo_chain(clip.atempo)
            .into_iter()
            .map(|f| format!("atempo={f:.6}"))
            .collect::<Vec<_>>()
            .join(",");

        let delay_ms = (clip.start_sec * 1000.0).round() as i64;
        let target_ms = (clip.target_duration_sec * 1000.0).round().max(0.0) as i64;

        stages.push(format!(
            "[{idx}:a]{atempo},atrim=0:{target_sec:.3},apad,adelay={delay}:all=1[{label}]",
            idx = clip.input_index,
            atempo = atempo_filters,
            target_sec = clip.target_duration_sec,
            delay = delay_ms.max(0),
            label = label,
        ));
        let _ = target_ms; // duration is already enforced via atrim in seconds above
        mix_labels.push(format!("[{label}]"));
    }

    if let Some(bg_idx) = background_input_index {
        let label = "bg".to_string();
        stages.push(format!(
            "[{bg_idx}:a]volume={background_volume:.3}[{label}]",
        ));
        mix_labels.push(format!("[{label}]"));
    }

    if mix_labels.is_empty() {
        return (String::new(), String::new());
    }

    if mix_labels.len() == 1 {
        let only = mix_labels[0].trim_start_matches('[').trim_end_matches(']').to_string();
        stages.push(format!("[{only}]anull[mixed]"));
        return (stages.join(";"), "mixed".to_string());
    }

    stages.push(format!(
        "{inputs}amix=inputs={n}:duration=longest:normalize=0[mixed]",
        inputs = mix_labels.join(""),
        n = mix_labels.len(),
    ));

    (stages.join(";"), "mixed".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atempo_chain_single_stage_in_range() {
        assert_eq!(atempo_chain(1.2), vec![1.2]);
    }

    #[test]
    fn atempo_filter_chain_joins_stages_as_filter_string() {
        assert_eq!(atempo_filter_chain(1.2), "atempo=1.200000");
        let chained = atempo_filter_chain(3.0);
        assert_eq!(chained, "atempo=2.000000,atempo=1.500000");
    }

    #[test]
    fn atempo_chain_splits_factors_above_two() {
        let stages = atempo_chain(3.0);
        let product: f64 = stages.iter().product();
        assert!((product - 3.0).abs() < 1e-9);
        assert!(stages.iter().all(|&s| (0.5..=2.0).contains(&s)));
    }

    #[test]
    fn atempo_chain_splits_factors_below_half() {
        let stages = atempo_chain(0.2);
        let product: f64 = stages.iter().product();
        assert!((product - 0.2).abs() < 1e-9);
    }

    #[test]
    fn build_mix_filtergraph_single_clip_no_background() {
        let clips = vec![ClipPlacement {
            input_index: 0,
            start_sec: 1.5,
            atempo: 1.1,
            target_duration_sec: 2.0,
        }];
        let (graph, out_label) = build_mix_filtergraph(&clips, None, 0.2);
        assert!(graph.contains("atempo=1.100000"));
        assert!(graph.contains("adelay=1500:all=1[clip0]"));
        assert_eq!(out_label, "mixed");
    }

    #[test]
    fn build_mix_filtergraph_with_background_mixes_all_inputs() {
        let clips = vec![
            ClipPlacement {
                input_index: 0,
                start_sec: 0.0,
                atempo: 1.0,
                target_duration_sec: 1.0,
            },
            ClipPlacement {
                input_index: 1,
                start_sec: 2.0,
                atempo: 1.0,
                target_duration_sec: 1.0,
            },
        ];
        let (graph, out_label) = build_mix_filtergraph(&clips, Some(2), 0.15);
        assert!(graph.contains("amix=inputs=3"));
        assert_eq!(out_label, "mixed");
    }

    #[test]
    fn build_mix_filtergraph_empty_clips_and_no_background_is_empty() {
        let (graph, out_label) = build_mix_filtergraph(&[], None, 0.0);
        assert!(graph.is_empty());
        assert!(out_label.is_empty());
    }
}
