//! Job session
//!
//! Wires a [`JobController`] to the HTTP client and the tokio scheduler, and
//! streams registry events to the terminal until the followed modules stop.

use anyhow::{Context, Result, bail};
use colored::*;
use librarian_client::LibrarianClient;
use librarian_core::domain::job::{JobRecord, JobStatus};
use librarian_core::domain::module::ModuleId;
use librarian_jobs::{CancelOutcome, JobController, JobRegistry, RegistryEvent, TokioScheduler};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

use crate::config::Config;
use crate::render;

/// A controller plus the stream of everything its registry reports
pub struct Session {
    controller: Arc<JobController>,
    events: mpsc::UnboundedReceiver<RegistryEvent>,
    last_seen: HashMap<ModuleId, JobRecord>,
    followed: Vec<ModuleId>,
}

impl Session {
    /// Builds the client, registry and controller from the CLI configuration
    pub fn connect(config: &Config) -> Result<Self> {
        let client = LibrarianClient::with_timeout(&config.server_url, config.request_timeout)
            .context("Failed to build HTTP client")?;

        let registry = Arc::new(JobRegistry::new());
        let (tx, events) = mpsc::unbounded_channel();
        registry.subscribe(move |event| {
            // Receiver gone means the session is over
            let _ = tx.send(event.clone());
        });

        let controller = JobController::new(
            registry,
            Arc::new(client),
            Arc::new(TokioScheduler),
            config.controller.clone(),
        );

        Ok(Self {
            controller,
            events,
            last_seen: HashMap::new(),
            followed: Vec::new(),
        })
    }

    pub fn controller(&self) -> &Arc<JobController> {
        &self.controller
    }

    /// Streams events until every given module has stopped
    ///
    /// Modules that are not running are reported as they are. The first
    /// Ctrl-C requests cancellation of the followed modules; a second one
    /// aborts the loops and fails.
    pub async fn follow(&mut self, modules: &[ModuleId]) -> Result<BTreeMap<ModuleId, JobRecord>> {
        self.followed = modules.to_vec();
        let mut stops = self.drain_pending();

        let registry = Arc::clone(self.controller.registry());
        let (mut remaining, idle): (Vec<ModuleId>, Vec<ModuleId>) = modules
            .iter()
            .copied()
            .partition(|module| registry.get_state(*module).is_running);

        // Stopped before we got here; its final flush may still be in flight
        for module in idle {
            if self.controller.is_polling(module) {
                self.controller.wait_until_idle(module).await;
                stops.extend(self.drain_pending());
            }
        }

        let mut interrupted = false;
        loop {
            while let Some(module) = stops.pop() {
                if remaining.contains(&module) {
                    // Final output arrives through the forced flush
                    self.controller.wait_until_idle(module).await;
                    stops.extend(self.drain_pending());
                    remaining.retain(|m| *m != module);
                }
            }
            if remaining.is_empty() {
                break;
            }

            tokio::select! {
                event = self.events.recv() => {
                    let Some(event) = event else { break };
                    stops.extend(self.render(&event));
                }
                signal = tokio::signal::ctrl_c() => {
                    signal.context("Failed to listen for Ctrl-C")?;
                    if interrupted {
                        self.controller.shutdown();
                        bail!("interrupted");
                    }
                    interrupted = true;
                    println!(
                        "{}",
                        "Interrupt received, requesting cancellation (Ctrl-C again to quit)".yellow()
                    );
                    for module in remaining.clone() {
                        self.request_cancel(module).await;
                    }
                }
            }
        }

        Ok(modules
            .iter()
            .map(|module| (*module, registry.get_state(*module)))
            .collect())
    }

    async fn request_cancel(&self, module: ModuleId) {
        match self.controller.cancel(module).await {
            CancelOutcome::Requested | CancelOutcome::NotRunning => {}
            CancelOutcome::Unsupported => println!(
                "{}",
                format!("{} cannot be canceled; waiting for it to finish", module).yellow()
            ),
            CancelOutcome::Failed => println!(
                "{}",
                format!("Cancel request for {} failed", module).red()
            ),
        }
    }

    /// Prints everything already queued; returns the modules that stopped
    fn drain_pending(&mut self) -> Vec<ModuleId> {
        let mut stops = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            stops.extend(self.render(&event));
        }
        stops
    }

    /// Prints an event; returns the module if the event records a stop
    fn render(&mut self, event: &RegistryEvent) -> Option<ModuleId> {
        if !self.followed.contains(&event.module()) {
            return None;
        }

        match event {
            RegistryEvent::Log(log) => {
                render::print_log(log, self.followed.len() > 1);
                None
            }
            RegistryEvent::StateChanged { module, record } => {
                let previous = self.last_seen.insert(*module, record.clone());
                let status_changed = previous.as_ref().map(|p| p.status) != Some(record.status);
                let progress_changed = previous.as_ref().is_none_or(|p| {
                    p.files_checked != record.files_checked || p.total_files != record.total_files
                });

                if status_changed {
                    render::print_transition(*module, record);
                } else if progress_changed {
                    render::print_progress(*module, record);
                }
                if record.consecutive_error_count > 0 {
                    debug!(
                        "{} unreachable ({} consecutive errors)",
                        module, record.consecutive_error_count
                    );
                }

                let was_running = previous.is_none_or(|p| p.is_running);
                (was_running && !record.is_running && record.status != JobStatus::NotStarted)
                    .then_some(*module)
            }
        }
    }
}
