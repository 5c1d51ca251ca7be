//! BeatCut command-line assembler.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use beatcut_engine::{
    AssemblyConfig, AssemblyPipeline, AssemblyRequest, TagFile, TranscriptFile,
};

/// Assemble a music-synchronized edit of a video.
#[derive(Debug, Parser)]
#[command(name = "beatcut", version)]
struct Cli {
    /// Source video
    video: PathBuf,

    /// Output file
    #[arg(short, long, default_value = "beatcut_output.mp4")]
    output: PathBuf,

    /// Shot tags JSON written by the tagging model
    #[arg(long)]
    tags: Option<PathBuf>,

    /// Transcript JSON with per-word timestamps
    #[arg(long)]
    transcript: Option<PathBuf>,

    /// Music library: one sub-folder per mood
    #[arg(long)]
    music_root: Option<PathBuf>,

    /// Background track, used instead of retrieval when it exists
    #[arg(long)]
    music: Option<PathBuf>,

    /// Engine configuration JSON
    #[arg(long)]
    config: Option<PathBuf>,

    /// Shot boundary correlation threshold
    #[arg(long)]
    shot_threshold: Option<f64>,

    /// Seed for transition and music picks
    #[arg(long)]
    seed: Option<u64>,

    /// Print the composite timeline as JSON instead of rendering
    #[arg(long)]
    plan_only: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::from(1)
        }
    }
}

fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let mut env_filter = EnvFilter::from_default_env();
    if let Ok(directive) = "beatcut=info".parse() {
        env_filter = env_filter.add_directive(directive);
    }

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<AssemblyConfig> {
    let mut config = match &cli.config {
        Some(path) => AssemblyConfig::from_file(path)?
            .with_overrides(|key| std::env::var(key).ok()),
        None => AssemblyConfig::from_env(),
    };
    if let Some(threshold) = cli.shot_threshold {
        config.segmenter.threshold = threshold;
    }
    config.validate()?;
    Ok(config)
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = load_config(&cli).context("invalid configuration")?;
    info!(?config, "Starting beatcut");

    let mut pipeline = AssemblyPipeline::new(config);
    if let Some(tags) = &cli.tags {
        pipeline = pipeline.with_tagger(Arc::new(TagFile::new(tags)));
    }
    if let Some(transcript) = &cli.transcript {
        pipeline = pipeline.with_transcriber(Arc::new(TranscriptFile::new(transcript)));
    }

    let mut request = AssemblyRequest::new(&cli.video, &cli.output);
    if let Some(root) = &cli.music_root {
        request = request.with_music_root(root);
    }
    if let Some(track) = &cli.music {
        request = request.with_music(track);
    }
    if let Some(seed) = cli.seed {
        request = request.with_seed(seed);
    }
    if cli.plan_only {
        request = request.plan_only();
    }

    let outcome = pipeline.run(&request).await?;

    if outcome.is_aborted() {
        eprintln!("{}", outcome.message);
        return Ok(ExitCode::from(2));
    }

    if request.plan_only {
        if let Some(timeline) = &outcome.timeline {
            println!("{}", serde_json::to_string_pretty(timeline)?);
        }
    } else if let Some(artifact) = &outcome.artifact {
        println!("{}", artifact.display());
    }
    eprintln!("{}", outcome.message);

    Ok(ExitCode::SUCCESS)
}
