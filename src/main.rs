use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use howler::config::{load_config, GenerationConfig};
use howler::prompt::{self, HistoryPrompt};
use howler::segment::estimate_spoken_time;
use howler::speakers::list_speakers;
use howler::LongformGenerator;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "howler", about = "Long-form generative audio orchestration", version)]
struct Cli {
    /// YAML configuration file; defaults apply when omitted.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Split text into segments and print the breakdown without generating.
    Split {
        /// Text to split; read from the file when --file is given instead.
        text: Option<String>,
        /// Read the text from this file.
        #[arg(short, long, conflicts_with = "text")]
        file: Option<PathBuf>,
    },
    /// List built-in speakers and bundles found in the prompt directories.
    Speakers,
    /// Load a speaker bundle and print its validation report.
    Validate {
        /// Speaker name or bundle path.
        prompt: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => GenerationConfig::default(),
    };

    match cli.command {
        Command::Split { text, file } => split(config, text, file),
        Command::Speakers => speakers(config),
        Command::Validate { prompt } => validate(config, &prompt),
    }
}

fn split(mut config: GenerationConfig, text: Option<String>, file: Option<PathBuf>) -> Result<()> {
    let text = match (text, file) {
        (Some(text), _) => text,
        (None, Some(path)) => std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?,
        (None, None) => anyhow::bail!("provide text as an argument or via --file"),
    };

    config.text_splits_only = true;
    let generator = LongformGenerator::new(config)?;
    let outcome = generator.generate(&NoModel, &text)?;
    let howler::LongformOutcome::SplitsOnly { segments } = outcome else {
        anyhow::bail!("expected a splits-only run");
    };

    let total = segments.len();
    let mut estimated = 0.0f32;
    for (i, segment) in segments.iter().enumerate() {
        let est = estimate_spoken_time(segment);
        estimated += est;
        println!(
            "[{:>3}/{total}] {est:>6.2}s  {} chars",
            i + 1,
            segment.chars().count()
        );
        println!("  {segment}");
    }
    println!("{total} segment(s), est. {estimated:.1}s of audio");
    Ok(())
}

fn speakers(config: GenerationConfig) -> Result<()> {
    let speakers = list_speakers(&config.prompt_dirs)?;
    let mut language = String::new();
    for speaker in speakers {
        if speaker.language != language {
            language = speaker.language.clone();
            println!("{language}:");
        }
        match speaker.path {
            Some(path) => println!("  {} ({})", speaker.name, path.display()),
            None => println!("  {}", speaker.name),
        }
    }
    Ok(())
}

fn validate(config: GenerationConfig, name: &str) -> Result<()> {
    let path = prompt::resolve_prompt_path(name, &config.prompt_dirs)?;
    let bundle = HistoryPrompt::load(&path)?;
    let report = prompt::validate(&bundle);
    println!("{}: {report}", path.display());
    if !report.is_valid() {
        std::process::exit(1);
    }
    Ok(())
}

/// Placeholder model for splits-only runs; no stage is ever invoked.
struct NoModel;

impl howler::BarkModel for NoModel {
    fn set_seed(&self, seed: i64) -> i64 {
        seed
    }

    fn generate_semantic(
        &self,
        _text: &str,
        _history: Option<&HistoryPrompt>,
        _opts: &howler::SemanticOpts,
    ) -> Result<Vec<i64>> {
        anyhow::bail!("no model is loaded")
    }

    fn generate_coarse(
        &self,
        _semantic: &[i64],
        _history: Option<&HistoryPrompt>,
        _opts: &howler::CoarseOpts,
    ) -> Result<Vec<Vec<i64>>> {
        anyhow::bail!("no model is loaded")
    }

    fn generate_fine(
        &self,
        _coarse: &[Vec<i64>],
        _history: Option<&HistoryPrompt>,
        _opts: &howler::FineOpts,
    ) -> Result<Vec<Vec<i64>>> {
        anyhow::bail!("no model is loaded")
    }

    fn decode(&self, _fine: &[Vec<i64>]) -> Result<Vec<f32>> {
        anyhow::bail!("no model is loaded")
    }
}
