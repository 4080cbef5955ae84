//! `metaball-cli` – entry point for the Metaball telemetry pipeline.
//!
//! - `metaball run`: stream reference-zeroed pose plus model force/node
//!   telemetry (default port 6666).
//! - `metaball collect`: stream telemetry and record pose/force/image
//!   sessions on `r` / `s` (default port 5555).
//! - `metaball view`: print the newest telemetry from a publisher.
//!
//! Ctrl-C (or `q` / `Esc` in the pipeline commands) stops gracefully.
//! Fatal startup errors print in red and exit with status 1.

mod config;
mod keyboard;
mod run;
mod view;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use metaball_types::MetaballError;
use tracing::warn;

#[derive(Parser, Debug)]
#[command(name = "metaball", version)]
#[command(about = "Metaball real-time pose/force telemetry pipeline", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Stream telemetry with force inference.
    Run(PipelineArgs),
    /// Stream telemetry and record sessions from the keyboard.
    Collect(PipelineArgs),
    /// Print the newest telemetry from a publisher.
    View(ViewArgs),
}

#[derive(Args, Debug)]
struct PipelineArgs {
    /// TOML configuration file; defaults apply when it does not exist.
    #[arg(long, default_value = "metaball.toml")]
    config: PathBuf,
}

#[derive(Args, Debug)]
struct ViewArgs {
    #[arg(long, default_value = "metaball.toml")]
    config: PathBuf,

    /// Publisher address; defaults to the configured `run` endpoint.
    #[arg(long)]
    address: Option<String>,

    #[arg(long, default_value_t = 1000, value_parser = clap::value_parser!(u64).range(1..))]
    timeout_ms: u64,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // ── Structured logging ────────────────────────────────────────────────
    // RUST_LOG selects the level, METABALL_LOG_FORMAT=json switches to JSON,
    // OTEL_EXPORTER_OTLP_ENDPOINT additionally exports spans.
    let _tracing = metaball_runtime::init_tracing("metaball");

    print_banner();

    let result = match cli.command {
        Command::Run(args) => load_config(&args.config).and_then(|cfg| run::execute(run::Mode::Deploy, &cfg)),
        Command::Collect(args) => {
            load_config(&args.config).and_then(|cfg| run::execute(run::Mode::Collect, &cfg))
        }
        Command::View(args) => load_config(&args.config).and_then(|cfg| {
            let address = args
                .address
                .unwrap_or_else(|| cfg.publisher.address(config::DEPLOY_PORT));
            view::execute(&address, args.timeout_ms)
        }),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            println!("{}: {}", "Error".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn load_config(path: &std::path::Path) -> Result<config::MetaballConfig, MetaballError> {
    let cfg = config::load(path)?;
    if path.exists() {
        println!("  Config loaded from {}", path.display().to_string().bold());
    } else {
        println!("  {} not found, using defaults", path.display().to_string().dimmed());
    }
    Ok(cfg)
}

// ─────────────────────────────────────────────────────────────────────────────
// Shared plumbing
// ─────────────────────────────────────────────────────────────────────────────

/// Raise `stop` on Ctrl-C / SIGTERM.
pub(crate) fn install_ctrlc(stop: Arc<AtomicBool>) {
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – shutting down …".yellow().bold());
        stop.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; graceful shutdown on Ctrl-C will not be available");
    }
}

/// Runtime hosting the transport tasks; the pipeline threads stay on
/// plain OS threads.
pub(crate) fn build_runtime() -> Result<tokio::runtime::Runtime, MetaballError> {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("metaball-io")
        .enable_all()
        .build()
        .map_err(|e| MetaballError::Transport(format!("cannot start async runtime: {e}")))
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("  {} {}",
        "Metaball".bold().cyan(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Real-time pose / force telemetry");
    println!();
}
