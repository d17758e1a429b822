//! CLI entry point for gifbatch
//!
//! `gifbatch convert` turns videos (or folders of videos) into GIFs;
//! `gifbatch check` verifies the encoder binaries.

use clap::{Parser, Subcommand};
use gifbatch::{estimate_remaining, format_eta, Config, Converter, ProgressEvent};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

/// gifbatch - Batch video to GIF conversion with ffmpeg and gifski
#[derive(Parser, Debug)]
#[command(name = "gifbatch")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to a gifbatch.toml configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Convert video files, or every video directly inside a folder
    Convert {
        /// Video files and/or folders
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Write every GIF here instead of a folder next to each input
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Frames per second
        #[arg(long)]
        fps: Option<u32>,

        /// Output width in pixels
        #[arg(long)]
        width: Option<u32>,

        /// gifski quality, 1-100
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=100))]
        quality: Option<u8>,

        /// Print the batch result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Resolve the encoder binaries and check that they run
    Check,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = match Config::load_or_default(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Commands::Convert {
            inputs,
            output,
            fps,
            width,
            quality,
            json,
        } => {
            if let Some(fps) = fps {
                config.encoding.fps = fps;
            }
            if let Some(width) = width {
                config.encoding.width = width;
            }
            if let Some(quality) = quality {
                config.encoding.quality = quality;
            }
            convert(config, &inputs, output.as_deref(), json).await
        }
        Commands::Check => check(config).await,
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "gifbatch=debug" } else { "gifbatch=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn convert(config: Config, inputs: &[PathBuf], output: Option<&Path>, json: bool) -> ExitCode {
    let (tx, rx) = mpsc::unbounded_channel();
    let converter = Arc::new(Converter::new(config).with_progress(tx));

    let files = expand_inputs(&converter, inputs);
    if files.is_empty() {
        eprintln!("No video files to convert");
        return ExitCode::FAILURE;
    }

    let plan = match converter.plan_from_inputs(&files, output) {
        Ok(plan) => plan,
        Err(e) => {
            eprintln!("Invalid conversion settings: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let printer = tokio::spawn(print_progress(rx));
    let interrupt = {
        let converter = Arc::clone(&converter);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("Stopping after the current file...");
                converter.request_cancel();
            }
        })
    };

    let result = converter.run_batch(&plan).await;

    // Closing the progress channel lets the printer finish
    interrupt.abort();
    let _ = interrupt.await;
    drop(converter);
    let _ = printer.await;

    match result {
        Ok(result) => {
            if json {
                match serde_json::to_string_pretty(&result) {
                    Ok(text) => println!("{}", text),
                    Err(e) => {
                        eprintln!("Failed to serialize result: {}", e);
                        return ExitCode::FAILURE;
                    }
                }
            } else {
                println!(
                    "Converted {}, skipped {} in {:.1}s{}",
                    result.converted,
                    result.skipped,
                    result.total_elapsed_secs,
                    if result.cancelled { " (cancelled)" } else { "" }
                );
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Batch failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Files are kept as given; folders contribute the videos directly inside them.
fn expand_inputs(converter: &Converter, inputs: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for input in inputs {
        let kind = converter.check_exists(input);
        if kind.is_directory {
            let found = converter.list_video_files(input);
            if found.is_empty() {
                eprintln!("No videos in {}", input.display());
            }
            files.extend(found);
        } else if kind.is_file {
            files.push(input.clone());
        } else {
            eprintln!("Skipping missing input: {}", input.display());
        }
    }
    files
}

async fn print_progress(mut rx: mpsc::UnboundedReceiver<ProgressEvent>) {
    let started = Instant::now();
    while let Some(event) = rx.recv().await {
        match estimate_remaining(started.elapsed(), event.current, event.total) {
            Some(eta) => eprintln!(
                "[{}/{}] {} (ETA {})",
                event.current,
                event.total,
                event.filename,
                format_eta(eta)
            ),
            None => eprintln!("[{}/{}] {}", event.current, event.total, event.filename),
        }
    }
}

async fn check(config: Config) -> ExitCode {
    let converter = Converter::new(config);
    match converter.startup_checks().await {
        Ok(report) => {
            match report.ffmpeg_version {
                Some(version) => println!("ffmpeg: {} (version {})", report.ffmpeg.display(), version),
                None => println!("ffmpeg: {} (unknown version)", report.ffmpeg.display()),
            }
            println!("gifski: {}", report.gifski.display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Startup check failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
