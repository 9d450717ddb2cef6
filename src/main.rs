//! vidcap -- rate-limited batch video captioning.
//!
//! This is the application entry point. It wires together all modules:
//!   - Configuration and response-schema loading
//!   - Work selection (new videos without a caption artifact)
//!   - Rate limiter + dispatcher worker pool
//!   - Artifact maintenance (`tidy`) and corpus diagnostics (`stats`)

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use vidcap::client::{CaptionClient, DEFAULT_BASE_URL, DashScopeClient, compose_prompt};
use vidcap::config::Config;
use vidcap::dispatch::{Dispatcher, JobSpec};
use vidcap::error::ConfigError;
use vidcap::rate::RateLimiter;
use vidcap::{selector, stats, tidy};

// ---------------------------------------------------------------------------
// CLI argument parsing (minimal, no clap dependency)
// ---------------------------------------------------------------------------

enum Command {
    /// Dispatch new videos to the captioning service.
    Run,
    /// Clean orphaned artifacts and normalize formatting.
    Tidy { dir: Option<PathBuf> },
    /// Tabulate flag combinations across artifacts.
    Stats { dir: Option<PathBuf> },
}

struct CliArgs {
    command: Command,
    config_path: PathBuf,
}

fn parse_args() -> CliArgs {
    let mut args = std::env::args().skip(1);
    let mut config_path = PathBuf::from("vidcap.toml");
    let mut command = None;
    let mut dir = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "run" if command.is_none() => command = Some("run"),
            "tidy" if command.is_none() => command = Some("tidy"),
            "stats" if command.is_none() => command = Some("stats"),
            "--config" | "-c" => {
                if let Some(path) = args.next() {
                    config_path = PathBuf::from(path);
                } else {
                    eprintln!("Error: --config requires a path argument");
                    std::process::exit(1);
                }
            }
            "--dir" | "-d" => {
                if let Some(path) = args.next() {
                    dir = Some(PathBuf::from(path));
                } else {
                    eprintln!("Error: --dir requires a path argument");
                    std::process::exit(1);
                }
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("vidcap {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            other => {
                eprintln!("Unknown argument: {other}");
                eprintln!("Run with --help for usage information.");
                std::process::exit(1);
            }
        }
    }

    let command = match command {
        Some("tidy") => Command::Tidy { dir },
        Some("stats") => Command::Stats { dir },
        _ => Command::Run,
    };

    CliArgs {
        command,
        config_path,
    }
}

fn print_usage() {
    println!(
        "\
vidcap {version} -- rate-limited batch video captioning

USAGE:
    vidcap [COMMAND] [OPTIONS]

COMMANDS:
    run      Caption new videos (default)
    tidy     Delete orphaned artifacts, repair and reformat the rest
    stats    Tabulate flag combinations across artifacts

OPTIONS:
    -c, --config <PATH>    Path to configuration file [default: vidcap.toml]
    -d, --dir <PATH>       Artifact directory for tidy/stats
                           [default: <output_root>/<model> from the config]
    -h, --help             Print this help message
    -V, --version          Print version information

ENVIRONMENT:
    DASHSCOPE_API_KEY      API key for the captioning service (required by run)
    DASHSCOPE_BASE_URL     Override the service endpoint
    RUST_LOG               Override log level (e.g. RUST_LOG=debug)
    VIDCAP_CONFIG          Alternative to --config flag
",
        version = env!("CARGO_PKG_VERSION")
    );
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> anyhow::Result<()> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("Failed to build Tokio runtime")
        .block_on(async_main())
}

async fn async_main() -> anyhow::Result<()> {
    let cli = parse_args();

    // Allow VIDCAP_CONFIG env var as alternative to --config flag
    let config_path = std::env::var("VIDCAP_CONFIG")
        .map(PathBuf::from)
        .unwrap_or(cli.config_path);

    let config = Config::load(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    init_tracing(&config);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_path.display(),
        "Starting vidcap"
    );

    match cli.command {
        Command::Run => run_batch(&config).await,
        Command::Tidy { dir } => run_tidy(&config, dir),
        Command::Stats { dir } => run_stats(&config, dir),
    }
}

// ---------------------------------------------------------------------------
// run: the dispatcher
// ---------------------------------------------------------------------------

async fn run_batch(config: &Config) -> anyhow::Result<()> {
    // Environment is consulted exactly once, here.
    let api_key = std::env::var("DASHSCOPE_API_KEY").map_err(|_| ConfigError::MissingApiKey)?;
    let base_url =
        std::env::var("DASHSCOPE_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
    tracing::info!(base_url = %base_url, "Using captioning endpoint");

    let schema = config.load_schema().context("loading response schema")?;
    let prompt = compose_prompt(&config.prompts, &schema);

    let model = &config.caption.model;
    let artifact_dir = config.artifact_dir();
    let items = selector::select_work(
        &config.paths.input_root,
        &artifact_dir,
        config.caption.max_items,
        config.caption.shuffle,
    )
    .context("selecting work")?;

    if items.is_empty() {
        tracing::info!("No new videos to process");
        return Ok(());
    }
    tracing::info!(count = items.len(), model = %model, "Selected new videos");

    let rpm = config.rpm_for(model);
    let limiter = Arc::new(RateLimiter::new(rpm));
    let client: Arc<dyn CaptionClient> =
        Arc::new(DashScopeClient::with_base_url(api_key, base_url));

    let dispatcher = Dispatcher::new(
        client,
        limiter,
        JobSpec {
            prompt,
            model: model.clone(),
            frame_sampling_fps: config.caption.frame_sampling_fps,
        },
        config.caption.concurrency,
        Duration::from_secs_f64(config.safety.request_delay_secs),
    );

    let report = dispatcher.run(items).await;

    println!();
    println!("  Attempted: {}", report.attempted);
    println!("  Succeeded: {}", report.succeeded);
    println!("  Failed:    {}", report.failed);
    println!();

    Ok(())
}

// ---------------------------------------------------------------------------
// tidy / stats
// ---------------------------------------------------------------------------

fn run_tidy(config: &Config, dir: Option<PathBuf>) -> anyhow::Result<()> {
    let artifact_dir = dir.unwrap_or_else(|| config.artifact_dir());
    let report = tidy::run(&artifact_dir, &config.paths.input_root)
        .with_context(|| format!("tidying {}", artifact_dir.display()))?;

    println!();
    println!("  Processed:       {}", report.processed);
    println!("  Repaired syntax: {}", report.repaired);
    println!("  Deleted orphans: {}", report.deleted_orphans);
    println!("  Errors:          {}", report.errors);
    println!();

    Ok(())
}

fn run_stats(config: &Config, dir: Option<PathBuf>) -> anyhow::Result<()> {
    let artifact_dir = dir.unwrap_or_else(|| config.artifact_dir());
    let report = stats::collect(&artifact_dir)
        .with_context(|| format!("scanning {}", artifact_dir.display()))?;

    println!("Scanned {} files in {}", report.scanned, artifact_dir.display());
    print!("{}", report.render());

    Ok(())
}

// ---------------------------------------------------------------------------
// Tracing initialization
// ---------------------------------------------------------------------------

/// Set up the tracing subscriber based on configuration.
fn init_tracing(config: &Config) {
    // RUST_LOG env var takes precedence over config file
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = &config.logging.level;
        EnvFilter::new(format!("vidcap={level},warn"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
