//! credguard-verify - offline verification of exported evidence chains
//!
//! Reads a JSON chain export, checks every Ed25519 signature and, unless
//! `--signatures-only` is given, the chain links and hashes. Exits non-zero
//! when anything fails.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod report;

/// Evidence chain verifier CLI
#[derive(Parser)]
#[command(name = "credguard-verify")]
#[command(about = "Verify an exported credguard evidence chain", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the JSON chain export
    export: PathBuf,

    /// Hex-encoded public key to verify against instead of the one in the export
    #[arg(short = 'k', long, env = "CREDGUARD_PUBLIC_KEY")]
    public_key: Option<String>,

    /// Check signatures only (for filtered exports)
    #[arg(long)]
    signatures_only: bool,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    /// Log level
    #[arg(long, env = "CREDGUARD_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    /// Enable JSON logging
    #[arg(long, env = "CREDGUARD_LOG_JSON")]
    log_json: bool,
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| cli.log_level.clone().into());

    if cli.log_json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    let export = report::load_export(&cli.export)?;
    let report = report::verify(&export, cli.public_key.as_deref(), cli.signatures_only)?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", report.render());
    }

    if report.valid {
        tracing::info!(entries = report.entries_checked, "Evidence chain verified");
        Ok(ExitCode::SUCCESS)
    } else {
        tracing::error!(errors = report.errors.len(), "Evidence chain verification failed");
        Ok(ExitCode::FAILURE)
    }
}
