//! Watch command handler

use anyhow::Result;
use colored::*;
use librarian_core::domain::module::ModuleId;

use super::ensure_no_failures;
use crate::config::Config;
use crate::render;
use crate::session::Session;

/// Handle the watch command
///
/// Follows every job the backend reports as running, or only `module`.
pub async fn handle_watch_command(module: Option<ModuleId>, config: &Config) -> Result<()> {
    let mut session = Session::connect(config)?;

    let adopted: Vec<ModuleId> = session
        .controller()
        .init()
        .await
        .into_iter()
        .filter(|m| module.is_none_or(|wanted| wanted == *m))
        .collect();

    if adopted.is_empty() {
        let message = match module {
            Some(module) => format!("{} is not running.", module),
            None => "No jobs running.".to_string(),
        };
        println!("{}", message.yellow());
        session.controller().shutdown();
        return Ok(());
    }

    let records = session.follow(&adopted).await?;
    for (module, record) in &records {
        render::print_summary(*module, record);
    }

    ensure_no_failures(&records)
}
