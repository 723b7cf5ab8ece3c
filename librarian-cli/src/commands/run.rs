//! Run command handlers
//!
//! Starts a module's job through the controller and follows it.

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::*;
use librarian_core::dto::run::{DEFAULT_INITIAL_PAGE_COUNT, DEFAULT_MAX_SIZE_MB, RunPayload};

use super::ensure_no_failures;
use crate::config::Config;
use crate::render;
use crate::session::Session;

/// Run subcommands, one per module
#[derive(Subcommand)]
pub enum RunCommands {
    /// Scan a folder for duplicate files
    DuplicateScan {
        /// Folder to scan
        #[arg(long)]
        target: String,
    },
    /// Split oversized PDFs into smaller parts
    Segmentation {
        /// Folder containing the PDFs
        #[arg(long)]
        target: String,

        /// Maximum size of each part in megabytes
        #[arg(long, default_value_t = DEFAULT_MAX_SIZE_MB)]
        max_size_mb: f64,

        /// Page count of the first split attempt
        #[arg(long = "pages", default_value_t = DEFAULT_INITIAL_PAGE_COUNT)]
        initial_page_count: u32,
    },
    /// Sort a folder's files into categories
    Sort {
        /// Folder to sort
        #[arg(long)]
        target: String,
    },
}

impl RunCommands {
    fn into_payload(self) -> RunPayload {
        match self {
            Self::DuplicateScan { target } => RunPayload::duplicate_scan(target),
            Self::Segmentation {
                target,
                max_size_mb,
                initial_page_count,
            } => RunPayload::segmentation(target, max_size_mb, initial_page_count),
            Self::Sort { target } => RunPayload::sort(target),
        }
    }
}

/// Handle run commands
pub async fn handle_run_command(command: RunCommands, detach: bool, config: &Config) -> Result<()> {
    let payload = command.into_payload();
    let module = payload.module();

    let mut session = Session::connect(config)?;
    println!(
        "{}",
        format!("Starting {} on {}", module, payload.target_path()).bold()
    );
    session
        .controller()
        .start(module, payload)
        .await
        .with_context(|| format!("Invalid {} request", module))?;

    if detach {
        session.controller().shutdown();
        let record = session.controller().registry().get_state(module);
        render::print_transition(module, &record);
        if record.is_running {
            println!("{}", "Detached; use `librarian watch` to follow it.".dimmed());
        }
        return ensure_no_failures([(&module, &record)]);
    }

    let records = session.follow(&[module]).await?;
    for (module, record) in &records {
        render::print_summary(*module, record);
    }

    ensure_no_failures(&records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use librarian_core::domain::module::ModuleId;

    #[test]
    fn test_segmentation_payload_carries_options() {
        let payload = RunCommands::Segmentation {
            target: "/data/pdfs".to_string(),
            max_size_mb: 25.0,
            initial_page_count: 40,
        }
        .into_payload();

        assert_eq!(payload.module(), ModuleId::Segmentation);
        assert_eq!(payload.target_path(), "/data/pdfs");
        assert_eq!(payload, RunPayload::segmentation("/data/pdfs", 25.0, 40));
    }

    #[test]
    fn test_payload_module_matches_subcommand() {
        let scan = RunCommands::DuplicateScan {
            target: "/data".to_string(),
        };
        let sort = RunCommands::Sort {
            target: "/data".to_string(),
        };

        assert_eq!(scan.into_payload().module(), ModuleId::DuplicateScan);
        assert_eq!(sort.into_payload().module(), ModuleId::Sort);
    }

    #[tokio::test]
    async fn test_invalid_request_error_names_the_module() {
        let config = Config {
            server_url: "http://127.0.0.1:9".to_string(),
            request_timeout: std::time::Duration::from_secs(1),
            controller: librarian_jobs::ControllerConfig::default(),
        };
        let command = RunCommands::Sort {
            target: String::new(),
        };

        let err = handle_run_command(command, false, &config)
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), format!("Invalid {} request", ModuleId::Sort));
        assert!(err.chain().count() > 1);
    }
}
