//! Cancel command handler

use anyhow::{Result, bail};
use colored::*;
use librarian_core::domain::module::ModuleId;
use librarian_jobs::CancelOutcome;

use super::ensure_no_failures;
use crate::config::Config;
use crate::render;
use crate::session::Session;

/// Handle the cancel command
///
/// Adopts backend state first so a job started elsewhere can be canceled.
pub async fn handle_cancel_command(module: ModuleId, wait: bool, config: &Config) -> Result<()> {
    if !module.supports_cancel() {
        bail!("{} does not support cancellation", module);
    }

    let mut session = Session::connect(config)?;
    session.controller().init().await;

    match session.controller().cancel(module).await {
        CancelOutcome::NotRunning => {
            println!("{}", format!("{} is not running.", module).yellow());
            session.controller().shutdown();
            return Ok(());
        }
        CancelOutcome::Requested => {
            println!("{}", format!("✓ Cancellation requested for {}", module).green());
        }
        CancelOutcome::Unsupported => {
            session.controller().shutdown();
            bail!("{} does not support cancellation", module);
        }
        CancelOutcome::Failed => {
            session.controller().shutdown();
            bail!("cancel request for {} could not be delivered", module);
        }
    }

    if !wait {
        session.controller().shutdown();
        return Ok(());
    }

    let records = session.follow(&[module]).await?;
    for (module, record) in &records {
        render::print_summary(*module, record);
    }

    ensure_no_failures(&records)
}
