//! Insight - Main Entry Point
//!
//! Command-line host for the input -> prediction -> explanation pipeline.

use clap::Parser;
use colored::*;
use insight_pipeline::cli::{self, Cli};
use insight_pipeline::error::InsightError;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "insight_pipeline=info,insight=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(err) = cli::run(cli).await {
        let message = match err.downcast_ref::<InsightError>() {
            Some(e) => e.user_message(),
            None => format!("{:#}", err),
        };
        eprintln!();
        eprintln!("  {} {}", "error".red().bold(), message);
        std::process::exit(1);
    }

    Ok(())
}
