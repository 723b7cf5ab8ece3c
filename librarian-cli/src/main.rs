//! Librarian CLI
//!
//! Command-line front end for the backend's module jobs: start a duplicate
//! scan, segmentation or sort, follow its output, and cancel it.

mod commands;
mod config;
mod render;
mod session;

use anyhow::{Context, Result};
use clap::Parser;
use commands::{Commands, handle_command};
use config::Config;
use librarian_jobs::ControllerConfig;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "librarian")]
#[command(about = "Run and follow Data Librarian background jobs", long_about = None)]
struct Cli {
    /// Backend URL
    #[arg(long, env = "LIBRARIAN_SERVER_URL", default_value = "http://localhost:8000")]
    server_url: String,

    /// Per-request timeout in seconds
    #[arg(long, env = "LIBRARIAN_TIMEOUT_SECS", default_value_t = 10)]
    timeout_secs: u64,

    /// Trace polling activity on stderr
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Diagnostics go to stderr so they never interleave with job output
    let default_filter = if cli.verbose {
        "librarian_cli=debug,librarian_jobs=debug,librarian_client=debug"
    } else {
        "librarian_cli=info,librarian_jobs=warn,librarian_client=warn"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Config {
        server_url: cli.server_url,
        request_timeout: Duration::from_secs(cli.timeout_secs),
        controller: ControllerConfig::from_env(),
    };
    config.validate().context("Invalid configuration")?;

    handle_command(cli.command, &config).await
}
