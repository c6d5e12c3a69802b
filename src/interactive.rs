use crate::config::{Config, OutputFormat, Provider, SubtitleMode};
use crate::pipeline::{DubRequestOptions, PipelineOptions};
use console::style;
use dialoguer::{Confirm, Input, Select};
use std::fs;
use std::path::PathBuf;

const SUPPORTED_EXTENSIONS: &[&str] = &[
    "mp4", "mkv", "avi", "mov", "webm", // Video
    "mp3", "wav", "flac", "m4a", "ogg", "aac", // Audio
];

const LANGUAGES: &[(&str, &str)] = &[
    ("en", "English"),
    ("ja", "Japanese"),
    ("es", "Spanish"),
    ("fr", "French"),
    ("de", "German"),
    ("zh", "Chinese"),
    ("ko", "Korean"),
    ("pt", "Portuguese"),
    ("it", "Italian"),
    ("ru", "Russian"),
    ("ar", "Arabic"),
    ("hi", "Hindi"),
    ("nl", "Dutch"),
    ("pl", "Polish"),
    ("tr", "Turkish"),
];

pub struct InteractiveResult {
    pub input: PathBuf,
    pub output: PathBuf,
    pub config: Config,
    pub options: PipelineOptions,
}

pub fn run_interactive_wizard() -> anyhow::Result<InteractiveResult> {
    print_header();

    let config = setup_api_key()?;

    let input = select_source_file()?;
    let provider = select_provider(&config)?;
    let translate_to = setup_translation()?;
    let subtitle_mode = if translate_to.is_some() { select_subtitle_mode()? } else { SubtitleMode::Original };
    let format = select_output_format()?;
    let dub = setup_dub(&input, translate_to.as_deref())?;

    let output = derive_output_path(&input, &format);

    print_summary(&input, &output, &translate_to, &format, &dub);

    if !Confirm::new().with_prompt("Proceed with these settings?").default(true).interact()? {
        anyhow::bail!("Cancelled by user");
    }

    println!();

    let options = PipelineOptions { provider, format, subtitle_mode, translate_to, dub };

    Ok(InteractiveResult { input, output, config, options })
}

fn print_header() {
    println!();
    println!("{}", style("╔═══════════════════════════════════════════════════╗").cyan());
    println!("{}", style("║           autosub - AI Subtitle Generator         ║").cyan());
    println!("{}", style("╚═══════════════════════════════════════════════════╝").cyan());
    println!();
}

fn setup_api_key() -> anyhow::Result<Config> {
    let mut config = Config::load().unwrap_or_default();

    if config.gemini_api_key.is_some() {
        println!("{} API key configured", style("✓").green());
        return Ok(config);
    }

    println!("{} Gemini API key not found", style("!").yellow());
    println!("  Get one at: https://aistudio.google.com/apikey\n");

    let api_key: String = Input::new().with_prompt("Enter your Gemini API key").interact_text()?;

    if api_key.trim().is_empty() {
        anyhow::bail!("API key is required");
    }

    config.gemini_api_key = Some(api_key.trim().to_string());

    if Confirm::new().with_prompt("Save API key to config file?").default(true).interact()? {
        save_config(&config)?;
        println!("{} API key saved to config\n", style("✓").green());
    }

    Ok(config)
}

fn save_config(config: &Config) -> anyhow::Result<()> {
    if let Some(config_dir) = dirs::config_dir() {
        let autosub_dir = config_dir.join("autosub");
        fs::create_dir_all(&autosub_dir)?;

        let config_path = autosub_dir.join("config.toml");
        let toml_content = toml::to_string_pretty(config)?;
        fs::write(config_path, toml_content)?;
    }
    Ok(())
}

fn select_source_file() -> anyhow::Result<PathBuf> {
    println!("\n{}", style("Select source file:").bold());

    let files = scan_media_files(".")?;

    if files.is_empty() {
        println!("  No media files found in current directory.\n");
        let path: String = Input::new().with_prompt("Enter file path").interact_text()?;
        let path = PathBuf::from(path);
        if !path.exists() {
            anyhow::bail!("File not found: {}", path.display());
        }
        return Ok(path);
    }

    let display_items: Vec<String> = files
        .iter()
        .map(|f| {
            let size = fs::metadata(f).map(|m| format_size(m.len())).unwrap_or_else(|_| "?".to_string());
            format!("{} ({})", f.display(), size)
        })
        .collect();

    let mut items = display_items.clone();
    items.push("Enter custom path...".to_string());

    let selection = Select::new().with_prompt("Choose a file").items(&items).default(0).interact()?;

    if selection == files.len() {
        let path: String = Input::new().with_prompt("Enter file path").interact_text()?;
        let path = PathBuf::from(path);
        if !path.exists() {
            anyhow::bail!("File not found: {}", path.display());
        }
        Ok(path)
    } else {
        Ok(files[selection].clone())
    }
}

fn scan_media_files(dir: &str) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();

        if path.is_file() {
            if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
                if SUPPORTED_EXTENSIONS.contains(&ext.to_lowercase().as_str()) {
                    files.push(path);
                }
            }
        }
    }

    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

fn select_provider(config: &Config) -> anyhow::Result<Provider> {
    let mut options = vec![("Gemini", Provider::Gemini)];
    if config.openai_api_key.is_some() {
        options.push(("Whisper (OpenAI)", Provider::Whisper));
    }

    if options.len() == 1 {
        return Ok(options[0].1);
    }

    let items: Vec<&str> = options.iter().map(|(name, _)| *name).collect();
    let selection = Select::new().with_prompt("Select transcription provider").items(&items).default(0).interact()?;
    Ok(options[selection].1)
}

fn select_language(prompt: &str, default: usize) -> anyhow::Result<String> {
    let items: Vec<String> = LANGUAGES.iter().map(|(code, name)| format!("{} ({})", name, code)).collect();

    let mut options = items.clone();
    options.push("Other (enter code)...".to_string());

    let selection = Select::new().with_prompt(prompt).items(&options).default(default).interact()?;

    if selection == LANGUAGES.len() {
        let code: String = Input::new().with_prompt("Enter language code (e.g., 'vi' for Vietnamese)").interact_text()?;
        Ok(code.trim().to_lowercase())
    } else {
        Ok(LANGUAGES[selection].0.to_string())
    }
}

fn setup_translation() -> anyhow::Result<Option<String>> {
    if !Confirm::new().with_prompt("Translate subtitles to another language?").default(false).interact()? {
        return Ok(None);
    }

    Ok(Some(select_language("Select target language:", 0)?))
}

fn select_subtitle_mode() -> anyhow::Result<SubtitleMode> {
    let items = ["Translated only", "Original only", "Dual (original + translated)"];
    let selection = Select::new().with_prompt("Subtitle text").items(&items).default(0).interact()?;
    Ok(match selection {
        1 => SubtitleMode::Original,
        2 => SubtitleMode::Dual,
        _ => SubtitleMode::Translated,
    })
}

fn setup_dub(input: &std::path::Path, translate_to: Option<&str>) -> anyhow::Result<Option<DubRequestOptions>> {
    if !Confirm::new().with_prompt("Also generate a dubbed audio track?").default(false).interact()? {
        return Ok(None);
    }

    let target = match translate_to {
        Some(lang) => lang.to_string(),
        None => select_language("Select dub language:", 0)?,
    };

    let voice: String = Input::new().with_prompt("Voice name").default("default".to_string()).interact_text()?;

    let stem = input.file_stem().unwrap_or_default().to_string_lossy().to_string();
    let mut output_audio_path = input.to_path_buf();
    output_audio_path.set_file_name(format!("{stem}.dub.{target}.wav"));

    Ok(Some(DubRequestOptions {
        voice,
        quality: "standard".to_string(),
        tts_format: "mp3".to_string(),
        ambient_mix: 0.2,
        output_audio_path,
        video_source_path: None,
        output_video_path: None,
    }))
}

fn select_output_format() -> anyhow::Result<OutputFormat> {
    let formats = [
        ("SRT", "Most compatible (VLC, YouTube, etc.)", OutputFormat::Srt),
        ("VTT", "Web/HTML5 video", OutputFormat::Vtt),
        ("JSON", "Programmatic access", OutputFormat::Json),
    ];

    let items: Vec<String> = formats.iter().map(|(name, desc, _)| format!("{} - {}", name, desc)).collect();

    let selection = Select::new().with_prompt("Select output format").items(&items).default(0).interact()?;

    Ok(formats[selection].2)
}

fn derive_output_path(input: &std::path::Path, format: &OutputFormat) -> PathBuf {
    let stem = input.file_stem().unwrap_or_default();
    let mut output = input.to_path_buf();
    output.set_file_name(format!("{}.{}", stem.to_string_lossy(), format.extension()));
    output
}

fn print_summary(
    input: &std::path::Path,
    output: &std::path::Path,
    translate_to: &Option<String>,
    format: &OutputFormat,
    dub: &Option<DubRequestOptions>,
) {
    println!("\n{}", style("═══ Summary ═══").bold());
    println!("  Input:     {}", style(input.display()).cyan());
    println!("  Output:    {}", style(output.display()).cyan());
    if let Some(target) = translate_to {
        println!("  Translate: → {}", get_language_name(target));
    }
    println!("  Format:    {}", format.extension().to_uppercase());
    if let Some(dub) = dub {
        println!("  Dub audio: {}", style(dub.output_audio_path.display()).cyan());
    }
    println!();
}

fn get_language_name(code: &str) -> String {
    LANGUAGES.iter().find(|(c, _)| *c == code).map(|(c, n)| format!("{} ({})", n, c)).unwrap_or_else(|| code.to_string())
}
