//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod cancel;
mod run;
mod status;
mod watch;

pub use run::RunCommands;

use anyhow::Result;
use clap::Subcommand;
use librarian_core::domain::module::ModuleId;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Show whether each module is running on the backend
    Status,
    /// Start a job and follow it until it stops
    Run {
        /// Return once the backend accepts the job instead of following it
        #[arg(long)]
        detach: bool,

        #[command(subcommand)]
        command: RunCommands,
    },
    /// Request cancellation of a running job
    Cancel {
        /// Module to cancel (duplicate-scan, segmentation, sort)
        module: ModuleId,

        /// Keep following the job until it stops
        #[arg(short, long)]
        wait: bool,
    },
    /// Follow jobs already running on the backend
    Watch {
        /// Only follow this module
        module: Option<ModuleId>,
    },
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module.
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Status => status::handle_status_command(config).await,
        Commands::Run { detach, command } => run::handle_run_command(command, detach, config).await,
        Commands::Cancel { module, wait } => {
            cancel::handle_cancel_command(module, wait, config).await
        }
        Commands::Watch { module } => watch::handle_watch_command(module, config).await,
    }
}

/// Fails when any followed job ended in `Error`
fn ensure_no_failures<'a>(
    records: impl IntoIterator<Item = (&'a ModuleId, &'a librarian_core::domain::job::JobRecord)>,
) -> Result<()> {
    let failed: Vec<String> = records
        .into_iter()
        .filter(|(_, record)| record.status == librarian_core::domain::job::JobStatus::Error)
        .map(|(module, _)| module.to_string())
        .collect();

    if !failed.is_empty() {
        anyhow::bail!("job ended with an error: {}", failed.join(", "));
    }
    Ok(())
}
