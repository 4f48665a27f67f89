use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use voice_scrub::audio_clean::NoiseMode;
use voice_scrub::{Result, ScrubConfig, Scrubber};

#[derive(Parser)]
#[command(name = "voice-scrub")]
#[command(version)]
#[command(about = "Remove background noise from the audio of a video or audio file", long_about = None)]
struct Cli {
    /// Input video or audio file
    #[arg(required_unless_present = "print_default_config")]
    input: Option<PathBuf>,

    /// Directory for the cleaned audio and spectrograms
    #[arg(short, long, default_value = ".")]
    out_dir: PathBuf,

    /// JSON config file (camelCase keys, any subset)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output audio format (overrides the config)
    #[arg(short, long)]
    format: Option<FormatArg>,

    /// Assume noise is constant over the whole recording
    #[arg(long)]
    stationary: bool,

    /// Fraction of detected noise to remove (0-1)
    #[arg(long)]
    prop_decrease: Option<f32>,

    /// Skip the before/after spectrogram images
    #[arg(long)]
    no_spectrograms: bool,

    /// Path to the ffmpeg binary used for video inputs
    #[arg(long)]
    ffmpeg: Option<PathBuf>,

    /// Print the default config as JSON and exit
    #[arg(long)]
    print_default_config: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum FormatArg {
    Mp3,
    Wav,
    Ogg,
}

impl FormatArg {
    fn name(self) -> &'static str {
        match self {
            FormatArg::Mp3 => "mp3",
            FormatArg::Wav => "wav",
            FormatArg::Ogg => "ogg",
        }
    }
}

fn build_config(cli: &Cli) -> Result<ScrubConfig> {
    let mut config = match &cli.config {
        Some(path) => ScrubConfig::load(path)?,
        None => ScrubConfig::default(),
    };

    if let Some(format) = cli.format {
        config.output.format = format.name().to_string();
    }
    if cli.stationary {
        config.reduction.mode = NoiseMode::Stationary;
    }
    if let Some(prop) = cli.prop_decrease {
        config.reduction.prop_decrease = prop;
    }
    if cli.no_spectrograms {
        config.spectrogram.enabled = false;
    }
    if let Some(ffmpeg) = &cli.ffmpeg {
        config.extraction.ffmpeg_path = ffmpeg.clone();
    }

    config.validate()?;
    Ok(config)
}

fn run(cli: Cli) -> Result<()> {
    if cli.print_default_config {
        println!("{}", ScrubConfig::default().to_json_pretty()?);
        return Ok(());
    }

    let config = build_config(&cli)?;
    let Some(input) = cli.input else {
        return Ok(());
    };

    let scrubber = Scrubber::new(config)?;
    for path in scrubber.run_to_dir(&input, &cli.out_dir)? {
        println!("{}", path.display());
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{} stage failed: {}", e.stage(), e);
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
