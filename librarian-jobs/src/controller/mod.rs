//! Job controller
//!
//! Starts and cancels module jobs and drives two polling loops per running
//! module:
//! - the status loop asks the backend whether the job is still running,
//!   backing off exponentially on transport failures
//! - the output loop streams new log lines and progress counters
//!
//! Loops are self-rescheduling continuations on a [`Scheduler`]. Every
//! iteration re-reads the registry first, so a stop recorded anywhere ends
//! the loop at its next tick. Each launch gets a fresh generation number;
//! iterations from an older launch retire without rescheduling.

use librarian_client::Transport;
use librarian_core::domain::job::FinalStatus;
use librarian_core::domain::module::ModuleId;
use librarian_core::dto::run::{PayloadError, RunPayload};
use librarian_core::dto::status::OutputResponse;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::ControllerConfig;
use crate::registry::JobRegistry;
use crate::scheduler::{LoopKey, LoopKind, Scheduler, Task, TaskHandle};

#[cfg(test)]
mod tests;

/// Result of a cancel request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The module was not running; nothing was sent
    NotRunning,
    /// The backend acknowledged the request
    Requested,
    /// The module has no cancel endpoint; nothing was sent
    Unsupported,
    /// The request could not be delivered
    Failed,
}

/// How an output poll was triggered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    /// Regular iteration of the output loop for a launch generation
    Loop(u64),
    /// One guaranteed fetch after the job stopped; never reschedules
    ForceOnce,
}

#[derive(Debug)]
struct LoopEntry {
    generation: u64,
    handle: TaskHandle,
}

/// Drives module jobs against a [`Transport`]
pub struct JobController {
    registry: Arc<JobRegistry>,
    transport: Arc<dyn Transport>,
    scheduler: Arc<dyn Scheduler>,
    config: ControllerConfig,
    loops: watch::Sender<HashMap<LoopKey, LoopEntry>>,
    next_generation: AtomicU64,
    cancel_requested: Mutex<HashSet<ModuleId>>,
}

impl JobController {
    /// Creates a controller over a shared registry
    pub fn new(
        registry: Arc<JobRegistry>,
        transport: Arc<dyn Transport>,
        scheduler: Arc<dyn Scheduler>,
        config: ControllerConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry,
            transport,
            scheduler,
            config,
            loops: watch::Sender::new(HashMap::new()),
            next_generation: AtomicU64::new(0),
            cancel_requested: Mutex::new(HashSet::new()),
        })
    }

    /// The registry this controller updates
    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    // =============================================================================
    // Lifecycle
    // =============================================================================

    /// Starts a module's job
    ///
    /// The registry is updated optimistically before the run request is sent.
    /// When the backend accepts, both polling loops are launched and this
    /// returns without waiting for them. A rejection or transport failure
    /// leaves the module in `Error` with a log line explaining why.
    ///
    /// Only an invalid payload is reported to the caller; it leaves the
    /// registry untouched.
    pub async fn start(
        self: &Arc<Self>,
        module: ModuleId,
        payload: RunPayload,
    ) -> Result<(), PayloadError> {
        payload.validate_for(module)?;

        self.registry
            .set_started(module, Some(payload.target_path()));

        match self.transport.run_script(module, &payload).await {
            Ok(response) if response.status.is_accepted() => {
                info!(
                    "{} job accepted ({}) for {}",
                    module,
                    response.status,
                    payload.target_path()
                );
                self.registry.set_started(module, None);
                self.launch_polling(module);
            }
            Ok(response) => {
                warn!("Run request for {} rejected: {}", module, response.status);
                self.registry.set_error(module, false);
                self.registry.emit_log(
                    module,
                    format!(
                        "Failed to start {}: unexpected server response '{}'",
                        module, response.status
                    ),
                );
            }
            Err(e) => {
                warn!("Run request for {} failed: {}", module, e);
                self.registry.set_error(module, false);
                self.registry
                    .emit_log(module, format!("Error starting {}: {}", module, e));
            }
        }

        Ok(())
    }

    /// Requests cancellation of a running job
    ///
    /// Never stops anything synchronously; the stop is observed by the
    /// status loop once the backend reports the job as finished.
    pub async fn cancel(self: &Arc<Self>, module: ModuleId) -> CancelOutcome {
        if !self.registry.get_state(module).is_running {
            debug!("Ignoring cancel for {}, not running", module);
            return CancelOutcome::NotRunning;
        }

        match self.transport.cancel_script(module).await {
            Ok(ack) => {
                info!("Cancellation of {} requested ({})", module, ack.status);
                if ack.status != "not_running" {
                    self.cancel_requests().insert(module);
                }
                self.registry
                    .emit_log(module, "\nRequesting cancellation...\n");
                CancelOutcome::Requested
            }
            Err(e) if e.is_unsupported() => {
                self.registry.emit_log(
                    module,
                    format!("Cancellation is not supported for {}", module),
                );
                CancelOutcome::Unsupported
            }
            Err(e) => {
                warn!("Cancel request for {} failed: {}", module, e);
                self.registry
                    .emit_log(module, format!("Error sending cancel request: {}", e));
                CancelOutcome::Failed
            }
        }
    }

    /// Reconciles local state with the backend after a fresh start
    ///
    /// Checks every module concurrently. Modules the backend reports as
    /// running are adopted and polled as if they had been started here.
    /// Returns the adopted modules.
    pub async fn init(self: &Arc<Self>) -> Vec<ModuleId> {
        let checks = ModuleId::ALL
            .into_iter()
            .map(|module| self.adopt_if_running(module));

        futures::future::join_all(checks)
            .await
            .into_iter()
            .flatten()
            .collect()
    }

    async fn adopt_if_running(self: &Arc<Self>, module: ModuleId) -> Option<ModuleId> {
        match self.transport.check_status(module).await {
            Ok(status) if status.running => {
                info!("Adopting {} job already running on the backend", module);
                self.registry.set_started(module, None);
                if status.files_checked.is_some() || status.total_files.is_some() {
                    self.registry
                        .set_progress(module, status.files_checked, status.total_files);
                }
                self.launch_polling(module);
                Some(module)
            }
            Ok(_) => {
                debug!("{} idle on the backend", module);
                None
            }
            Err(e) => {
                warn!("Initial status check for {} failed: {}", module, e);
                None
            }
        }
    }

    // =============================================================================
    // Loop Bookkeeping
    // =============================================================================

    /// Launches both polling loops for a module, retiring any older ones
    pub fn launch_polling(self: &Arc<Self>, module: ModuleId) {
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.cancel_requests().remove(&module);

        self.loops.send_modify(|loops| {
            for kind in [LoopKind::Status, LoopKind::Output] {
                let key = LoopKey { module, kind };
                if let Some(old) = loops.remove(&key) {
                    debug!("Retiring superseded loop {} (generation {})", key, old.generation);
                    old.handle.abort();
                }
                let handle = self.schedule_iteration(key, generation, Duration::ZERO);
                loops.insert(key, LoopEntry { generation, handle });
            }
        });

        info!("Polling {} (generation {})", module, generation);
    }

    /// Loops that are scheduled or mid-iteration
    pub fn active_loops(&self) -> Vec<LoopKey> {
        let mut keys: Vec<LoopKey> = self.loops.borrow().keys().copied().collect();
        keys.sort();
        keys
    }

    /// Whether any loop of the module is still alive
    pub fn is_polling(&self, module: ModuleId) -> bool {
        self.loops.borrow().keys().any(|key| key.module == module)
    }

    /// Resolves once both loops of the module have terminated
    ///
    /// A stopped module's status loop only retires after the final output
    /// flush, so every log line has been delivered when this returns.
    pub async fn wait_until_idle(&self, module: ModuleId) {
        let mut rx = self.loops.subscribe();
        let _ = rx
            .wait_for(|loops| !loops.keys().any(|key| key.module == module))
            .await;
    }

    /// Aborts every pending continuation
    ///
    /// Iterations already in flight finish their current call and then
    /// retire instead of rescheduling.
    pub fn shutdown(&self) {
        self.loops.send_modify(|loops| {
            for (key, entry) in loops.drain() {
                debug!("Aborting loop {}", key);
                entry.handle.abort();
            }
        });
    }

    fn schedule_iteration(self: &Arc<Self>, key: LoopKey, generation: u64, delay: Duration) -> TaskHandle {
        let this = Arc::clone(self);
        let task: Task = match key.kind {
            LoopKind::Status => Box::pin(async move { this.poll_status(key.module, generation).await }),
            LoopKind::Output => Box::pin(async move {
                this.poll_output(key.module, OutputMode::Loop(generation))
                    .await
            }),
        };
        self.scheduler.schedule(key, delay, task)
    }

    /// Schedules the next iteration unless the loop was superseded or shut down
    fn reschedule(self: &Arc<Self>, key: LoopKey, generation: u64, delay: Duration) {
        self.loops.send_modify(|loops| {
            let current = loops
                .get(&key)
                .is_some_and(|entry| entry.generation == generation);
            if !current {
                debug!("Loop {} superseded, not rescheduling generation {}", key, generation);
                return;
            }
            let handle = self.schedule_iteration(key, generation, delay);
            loops.insert(key, LoopEntry { generation, handle });
        });
    }

    /// Removes the loop's entry if it still belongs to this generation
    fn retire(&self, key: LoopKey, generation: u64) {
        self.loops.send_if_modified(|loops| {
            let current = loops
                .get(&key)
                .is_some_and(|entry| entry.generation == generation);
            if current {
                loops.remove(&key);
                debug!("Loop {} terminated (generation {})", key, generation);
            }
            current
        });
    }

    fn is_current(&self, key: LoopKey, generation: u64) -> bool {
        self.loops
            .borrow()
            .get(&key)
            .is_some_and(|entry| entry.generation == generation)
    }

    fn cancel_requests(&self) -> MutexGuard<'_, HashSet<ModuleId>> {
        self.cancel_requested
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    // =============================================================================
    // Polling Loops
    // =============================================================================

    /// One iteration of the status loop
    async fn poll_status(self: &Arc<Self>, module: ModuleId, generation: u64) {
        let key = LoopKey::status(module);
        if !self.is_current(key, generation) {
            return;
        }
        if !self.registry.get_state(module).is_running {
            self.retire(key, generation);
            return;
        }

        let result = self.transport.check_status(module).await;

        // The module may have been stopped or relaunched while the request was in flight
        if !self.is_current(key, generation) {
            return;
        }
        if !self.registry.get_state(module).is_running {
            self.retire(key, generation);
            return;
        }

        match result {
            Ok(status) if !status.running => {
                let final_status = if self.cancel_requests().remove(&module) {
                    FinalStatus::UserCanceled
                } else {
                    FinalStatus::Finished
                };
                info!("{} job stopped on the backend ({:?})", module, final_status);
                self.registry.set_stopped(module, final_status);

                self.poll_output(module, OutputMode::ForceOnce).await;
                if let Some(path) = status.log_file_path {
                    self.registry
                        .emit_log(module, format!("Log written to {}", path));
                }
                self.retire(key, generation);
            }
            Ok(status) => {
                self.registry.set_running(module);
                self.registry.clear_errors(module);
                if status.files_checked.is_some() || status.total_files.is_some() {
                    self.registry
                        .set_progress(module, status.files_checked, status.total_files);
                }
                debug!("{} job still running", module);
                self.reschedule(key, generation, self.config.status_interval);
            }
            Err(e) => {
                self.registry.set_error(module, true);
                let errors = self.registry.get_state(module).consecutive_error_count;
                let delay = self.config.backoff_delay(errors);
                if e.is_server_error() {
                    warn!(
                        "Backend error checking {} status: {} (retry {} in {:?})",
                        module, e, errors, delay
                    );
                } else {
                    warn!(
                        "Could not check {} status: {} (retry {} in {:?})",
                        module, e, errors, delay
                    );
                }
                self.reschedule(key, generation, delay);
            }
        }
    }

    /// One output fetch, either as a loop iteration or a forced flush
    async fn poll_output(self: &Arc<Self>, module: ModuleId, mode: OutputMode) {
        let key = LoopKey::output(module);
        if let OutputMode::Loop(generation) = mode {
            if !self.is_current(key, generation) {
                return;
            }
            if !self.registry.get_state(module).is_running {
                self.retire(key, generation);
                return;
            }
        }

        let next_delay = match self.transport.get_output(module).await {
            Ok(batch) => {
                self.deliver_output(module, batch);
                self.config.output_interval
            }
            Err(e) => {
                warn!("Output poll for {} failed: {}", module, e);
                self.config.output_retry_interval
            }
        };

        let OutputMode::Loop(generation) = mode else {
            return;
        };
        if self.registry.get_state(module).is_running {
            self.reschedule(key, generation, next_delay);
        } else {
            self.retire(key, generation);
        }
    }

    /// Emits a batch's lines in order and forwards its progress counters
    fn deliver_output(&self, module: ModuleId, batch: OutputResponse) {
        let progress = batch.has_progress();
        let (checked, total) = (batch.files_checked, batch.total_files);

        if !batch.output.is_empty() {
            debug!("Received {} line(s) of {} output", batch.output.len(), module);
        }
        for line in batch.output {
            self.registry.emit_log(module, line);
        }

        if progress {
            self.registry.set_progress(module, checked, total);
        }
    }
}
