//! Conduit - connector control plane
//!
//! Main entry point for the Conduit CLI.

use anyhow::Result;
use clap::{Parser, Subcommand};

mod app;
mod commands;

use commands::{config, connectors, definitions};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// Conduit - connector control plane
#[derive(Parser)]
#[command(name = "conduit")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// Owner ID sent with the request
    #[arg(long, global = true, env = "CONDUIT_OWNER_ID")]
    pub owner_id: Option<String>,

    /// Owner UID sent with the request (takes precedence over --owner-id)
    #[arg(long, global = true, env = "CONDUIT_OWNER_UID")]
    pub owner_uid: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Browse the connector definition catalog
    Definitions(definitions::DefinitionsArgs),

    /// Manage connectors
    Connectors(connectors::ConnectorsArgs),

    /// Configuration management
    Config(config::ConfigArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded = conduit_config::load_config(None)?;
    loaded.config.validate()?;
    let logging = loaded.config.logging_or_default();

    // Console (human-readable) + daily rolling JSON file
    let console_filter = if cli.verbose {
        "conduit=debug,conduit_domain=debug,conduit_registry=debug,conduit_store=debug,conduit_pipeline=debug,warn".to_string()
    } else {
        format!(
            "conduit={0},conduit_domain={0},conduit_registry={0},conduit_store={0},conduit_pipeline={0},warn",
            logging.level
        )
    };
    let console_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(console_filter));

    let log_dir = conduit_config::user_config_dir()
        .map(|d| d.join("logs"))
        .unwrap_or_else(|| std::path::PathBuf::from("logs"));
    let (json_layer, _guard) = if logging.json_file {
        let file_appender = tracing_appender::rolling::daily(&log_dir, "conduit.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        (Some(non_blocking), Some(guard))
    } else {
        (None, None)
    };

    use tracing_subscriber::prelude::*;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(console_filter),
        )
        .with(json_layer.map(|writer| {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(writer)
                .with_filter(tracing_subscriber::EnvFilter::new(
                    "conduit=trace,conduit_domain=trace,conduit_registry=trace,conduit_store=trace,conduit_pipeline=trace,info",
                ))
        }))
        .init();

    for warning in &loaded.warnings {
        tracing::warn!("{warning}");
    }

    let ctx = commands::Context {
        json_output: cli.json,
        verbose: cli.verbose,
        metadata: commands::request_metadata(cli.owner_id, cli.owner_uid),
    };

    match cli.command {
        Commands::Definitions(args) => definitions::run(args, loaded, &ctx).await,
        Commands::Connectors(args) => connectors::run(args, loaded, &ctx).await,
        Commands::Config(args) => config::run(args, loaded, &ctx).await,
    }
}
