use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use autosub::cancel::CancelToken;
use autosub::config::{Config, OutputFormat, Provider, SubtitleMode};
use autosub::pipeline::{self, DubRequestOptions, PipelineOptions};
use autosub::progress::{stage, ProgressSink};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

mod interactive;

#[derive(Parser)]
#[command(name = "autosub")]
#[command(version, about = "Automatic subtitle generation and dubbing using AI")]
#[command(
    long_about = "Generate subtitles, and optionally a translated dub, from video/audio files using OpenAI Whisper or Google Gemini APIs."
)]
struct Cli {
    /// Input video/audio file
    input: Option<PathBuf>,

    /// Walk through an interactive setup wizard instead of reading flags
    #[arg(short, long)]
    interactive: bool,

    /// Output subtitle file (defaults to input name with appropriate extension)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format: srt, vtt, json
    #[arg(short, long, default_value = "srt")]
    format: String,

    /// Transcription provider: whisper, gemini
    #[arg(short, long, default_value = "gemini")]
    provider: String,

    /// Translate to target language (e.g., en, es, fr)
    #[arg(long)]
    translate: Option<String>,

    /// Subtitle text mode: original, translated, dual
    #[arg(long, default_value = "original")]
    subtitle_mode: String,

    /// Produce a dubbed audio track in this target language instead of (or
    /// in addition to) subtitles. Implies --translate if not also given.
    #[arg(long)]
    dub: Option<String>,

    /// TTS voice name, provider-specific
    #[arg(long, default_value = "default")]
    voice: String,

    /// TTS synthesis quality tier
    #[arg(long, default_value = "standard")]
    quality: String,

    /// How loud the original ambient/background audio is under the dub, 0.0-1.0
    #[arg(long, default_value_t = 0.2)]
    ambient_mix: f64,

    /// Also mux the dub onto the source video (source must have a video stream)
    #[arg(long)]
    dub_video: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Suppress progress bars and output
    #[arg(short, long)]
    quiet: bool,

    /// Validate input without processing (check dependencies, API keys, etc.)
    #[arg(long)]
    dry_run: bool,

    /// Overwrite output file if it already exists
    #[arg(long)]
    force: bool,
}

fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };

    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();
}

fn derive_output_path(input: &Path, format: &OutputFormat) -> PathBuf {
    let stem = input.file_stem().unwrap_or_default();
    let mut output = input.to_path_buf();
    output.set_file_name(format!("{}.{}", stem.to_string_lossy(), format.extension()));
    output
}

fn derive_dub_audio_path(input: &Path, lang: &str) -> PathBuf {
    let stem = input.file_stem().unwrap_or_default().to_string_lossy().to_string();
    let mut output = input.to_path_buf();
    output.set_file_name(format!("{stem}.dub.{lang}.wav"));
    output
}

fn derive_dub_video_path(input: &Path, lang: &str) -> PathBuf {
    let stem = input.file_stem().unwrap_or_default().to_string_lossy().to_string();
    let ext = input.extension().map(|e| e.to_string_lossy().to_string()).unwrap_or_else(|| "mp4".to_string());
    let mut output = input.to_path_buf();
    output.set_file_name(format!("{stem}.dub.{lang}.{ext}"));
    output
}

/// Each pipeline stage owns a slice of one overall bar; the library itself
/// only ever reports stage-local percentages, so the CLI is what turns
/// those into a single number a human can watch. Order matters: stages not
/// reached this run (e.g. translate/review when `--translate` wasn't
/// given, dub when `--dub` wasn't given) simply never emit, so the bar
/// jumps straight past their bands.
const STAGE_WEIGHTS: &[(&str, f64)] = &[
    (stage::EXTRACT, 0.03),
    (stage::CHUNK, 0.07),
    (stage::TRANSCRIBE, 0.30),
    (stage::SCRUB, 0.05),
    (stage::REPAIR, 0.10),
    (stage::TRANSLATE, 0.12),
    (stage::REVIEW, 0.10),
    (stage::FINALIZE, 0.03),
    (stage::DUB, 0.20),
];

fn stage_band_start(stage: &str) -> f64 {
    let mut acc = 0.0;
    for (name, weight) in STAGE_WEIGHTS {
        if *name == stage {
            return acc;
        }
        acc += weight;
    }
    acc
}

fn stage_weight(stage: &str) -> f64 {
    STAGE_WEIGHTS.iter().find(|(name, _)| *name == stage).map(|(_, w)| *w).unwrap_or(0.0)
}

fn spawn_progress_bar(
    mut rx: tokio::sync::mpsc::UnboundedReceiver<autosub::progress::ProgressEvent>,
    quiet: bool,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let bar = if quiet {
            ProgressBar::hidden()
        } else {
            let bar = ProgressBar::new(100);
            bar.set_style(
                ProgressStyle::with_template("{spinner:.green} [{bar:40.cyan/blue}] {percent}% {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("=>-"),
            );
            bar
        };

        while let Some(event) = rx.recv().await {
            if event.percent < 0 {
                if let Some(err) = &event.error {
                    bar.println(format!("warning ({}): {err}", event.stage));
                }
                continue;
            }

            if event.stage == stage::DONE {
                bar.set_position(100);
                bar.set_message("done");
                continue;
            }

            let base = stage_band_start(event.stage.as_str());
            let weight = stage_weight(event.stage.as_str());
            let overall = (base + weight * (event.percent as f64 / 100.0)).clamp(0.0, 1.0);
            bar.set_position((overall * 100.0).round() as u64);
            bar.set_message(event.stage.clone());
        }

        bar.finish_and_clear();
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let (input, output, config, options) = if cli.interactive {
        let wizard = interactive::run_interactive_wizard()?;
        (wizard.input, wizard.output, wizard.config, wizard.options)
    } else {
        let input = cli.input.clone().ok_or_else(|| anyhow::anyhow!("an input file is required (or pass --interactive)"))?;

        if !input.exists() {
            anyhow::bail!("Input file not found: {}", input.display());
        }

        let format: OutputFormat = cli.format.parse().map_err(|e: String| anyhow::anyhow!(e))?;
        let provider: Provider = cli.provider.parse().map_err(|e: String| anyhow::anyhow!(e))?;
        let subtitle_mode: SubtitleMode = cli.subtitle_mode.parse().map_err(|e: String| anyhow::anyhow!(e))?;

        let output = cli.output.clone().unwrap_or_else(|| derive_output_path(&input, &format));

        if output.exists() && !cli.force && !cli.dry_run {
            anyhow::bail!("Output file already exists: {}\nUse --force to overwrite.", output.display());
        }

        let config = Config::load().context("Failed to load configuration")?;
        config.validate(provider).context("Configuration validation failed")?;

        let translate_to = cli.translate.clone().or_else(|| cli.dub.clone());

        let dub_options = if let Some(dub_lang) = &cli.dub {
            let output_audio_path = derive_dub_audio_path(&input, dub_lang);
            let output_video_path = if cli.dub_video { Some(derive_dub_video_path(&input, dub_lang)) } else { None };
            Some(DubRequestOptions {
                voice: cli.voice.clone(),
                quality: cli.quality.clone(),
                tts_format: "mp3".to_string(),
                ambient_mix: cli.ambient_mix,
                output_audio_path,
                video_source_path: if cli.dub_video { Some(input.clone()) } else { None },
                output_video_path,
            })
        } else {
            None
        };

        if !cli.quiet {
            info!("Input:    {}", input.display());
            info!("Output:   {}", output.display());
            info!("Format:   {}", format);
            info!("Provider: {}", provider);
            if let Some(ref target) = translate_to {
                info!("Translate to: {}", target);
            }
            if let Some(ref dub) = dub_options {
                info!("Dub audio: {}", dub.output_audio_path.display());
            }
        }

        if cli.dry_run {
            println!();
            println!("Dry run validation successful:");
            println!("  Input file:    {} (exists)", input.display());
            println!("  Output file:   {}", output.display());
            println!("  Format:        {}", format);
            println!("  Provider:      {} (API key set)", provider);
            if let Some(ref target) = translate_to {
                println!("  Translate to:  {target}");
            }
            if let Some(ref dub) = dub_options {
                println!("  Dub audio:     {}", dub.output_audio_path.display());
            }
            println!("  FFmpeg:        available");
            if output.exists() {
                println!("  output file exists (will be overwritten with --force)");
            }
            println!();
            println!("Run without --dry-run to process the file.");
            return Ok(());
        }

        let options = PipelineOptions { provider, format, subtitle_mode, translate_to, dub: dub_options };
        (input, output, config, options)
    };

    autosub::audio::check_ffmpeg()
        .context("FFmpeg not found. Install it with: brew install ffmpeg (macOS) or apt install ffmpeg (Linux)")?;

    let cancel = CancelToken::new();
    let cancel_for_handler = cancel.clone();
    ctrlc::set_handler(move || {
        if cancel_for_handler.is_cancelled() {
            std::process::exit(1);
        }
        eprintln!("\nReceived Ctrl+C, cancelling... (press again to force quit)");
        cancel_for_handler.cancel();
    })
    .ok();

    let (progress, rx) = ProgressSink::new();
    let bar_handle = spawn_progress_bar(rx, cli.quiet);

    let result = pipeline::run_pipeline(&input, &output, &config, &options, &progress, &cancel).await;
    drop(progress);
    bar_handle.await.ok();

    match result {
        Ok(outcome) => {
            if !cli.quiet {
                pipeline::print_summary(&outcome);
            }
            Ok(())
        }
        Err(e) => {
            error!("Pipeline failed: {}", e);
            Err(anyhow::anyhow!("{}", e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_output_path() {
        let input = PathBuf::from("/path/to/video.mp4");

        let srt_output = derive_output_path(&input, &OutputFormat::Srt);
        assert_eq!(srt_output, PathBuf::from("/path/to/video.srt"));

        let vtt_output = derive_output_path(&input, &OutputFormat::Vtt);
        assert_eq!(vtt_output, PathBuf::from("/path/to/video.vtt"));

        let json_output = derive_output_path(&input, &OutputFormat::Json);
        assert_eq!(json_output, PathBuf::from("/path/to/video.json"));
    }

    #[test]
    fn stage_weights_sum_to_roughly_one() {
        let total: f64 = STAGE_WEIGHTS.iter().map(|(_, w)| w).sum();
        assert!((total - 1.0).abs() < 0.01, "weights summed to {total}");
    }

    #[test]
    fn stage_band_start_is_monotonic() {
        let mut last = 0.0;
        for (name, _) in STAGE_WEIGHTS {
            let start = stage_band_start(name);
            assert!(start >= last);
            last = start;
        }
    }
}
