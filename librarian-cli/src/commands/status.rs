//! Status command handler
//!
//! Queries every module's status concurrently and prints a summary.

use anyhow::{Context, Result};
use colored::*;
use futures::future::join_all;
use librarian_client::LibrarianClient;
use librarian_core::domain::module::ModuleId;

use crate::config::Config;

/// Handle the status command
pub async fn handle_status_command(config: &Config) -> Result<()> {
    let client = LibrarianClient::with_timeout(&config.server_url, config.request_timeout)
        .context("Failed to build HTTP client")?;

    let checks = ModuleId::ALL.into_iter().map(|module| {
        let client = &client;
        async move { (module, client.check_status(module).await) }
    });

    println!("{}", format!("Modules on {}:", client.base_url()).bold());
    println!();
    for (module, result) in join_all(checks).await {
        println!("  {} {}", "▸".cyan(), module.to_string().bold());
        match result {
            Ok(status) => {
                let state = if status.running {
                    "running".cyan()
                } else {
                    "idle".dimmed()
                };
                println!("    State:    {}", state);
                if let (Some(checked), Some(total)) = (status.files_checked, status.total_files) {
                    println!("    Progress: {}/{} files", checked, total);
                }
                if let Some(path) = status.log_file_path.filter(|p| !p.is_empty()) {
                    println!("    Log file: {}", path.dimmed());
                }
            }
            Err(e) => println!("    {} {}", "unreachable:".red(), e),
        }
        println!();
    }

    Ok(())
}
