use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod config;
mod context;
mod errors;
mod handlers;
mod models;
mod prompt;
mod services;
#[cfg(test)]
mod testing;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    // --- Logging setup ---
    // stderr keeps stdout clean for tables and --json output
    let default_level = if cli.global.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    // --- Config ---
    let cfg = config::AppConfig::from_env_and_args(&cli.global)?;
    tracing::debug!("Starting aws-manager with config: {:?}", cfg);

    // --- AWS clients ---
    let ctx = context::AppContext::connect(cfg).await;

    cli::dispatch(&ctx, cli.command).await?;
    Ok(())
}
