//! Job registry
//!
//! Holds one [`JobRecord`] per module and applies every state transition.
//! Observers subscribe once and receive a [`RegistryEvent`] for each mutation
//! and each log line, in the order the operations happen.
//!
//! Records are guarded by a short-lived mutex. A separate delivery lock is
//! held from each mutation until its observers have returned, so events
//! reach observers in the order the mutations were applied, whichever
//! thread applied them. Observers may read the registry but must not
//! mutate it or emit logs from inside a callback.

use librarian_core::domain::job::{FinalStatus, JobRecord, JobStatus};
use librarian_core::domain::log::LogEvent;
use librarian_core::domain::module::ModuleId;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

/// Notification delivered to registry subscribers
#[derive(Debug, Clone, PartialEq)]
pub enum RegistryEvent {
    /// A module's record changed; `record` is the state after the change
    StateChanged { module: ModuleId, record: JobRecord },
    /// A line of job output
    Log(LogEvent),
}

impl RegistryEvent {
    /// The module this event belongs to
    pub fn module(&self) -> ModuleId {
        match self {
            Self::StateChanged { module, .. } => *module,
            Self::Log(event) => event.module,
        }
    }
}

type Subscriber = Arc<dyn Fn(&RegistryEvent) + Send + Sync>;

/// Owner of every module's execution record
pub struct JobRegistry {
    records: Mutex<BTreeMap<ModuleId, JobRecord>>,
    subscribers: Mutex<Vec<Subscriber>>,
    delivery: Mutex<()>,
}

impl JobRegistry {
    /// Creates a registry with an idle record for every known module
    pub fn new() -> Self {
        let records = ModuleId::ALL
            .into_iter()
            .map(|module| (module, JobRecord::default()))
            .collect();

        Self {
            records: Mutex::new(records),
            subscribers: Mutex::new(Vec::new()),
            delivery: Mutex::new(()),
        }
    }

    /// Returns a snapshot of a module's record
    pub fn get_state(&self, module: ModuleId) -> JobRecord {
        self.records().get(&module).cloned().unwrap_or_default()
    }

    /// Marks a module as running and resets its error counter
    ///
    /// Idempotent. The target path is only replaced when one is supplied.
    pub fn set_started(&self, module: ModuleId, target_path: Option<&str>) {
        self.update(module, |record| {
            record.is_running = true;
            record.status = JobStatus::Running;
            record.consecutive_error_count = 0;
            if let Some(path) = target_path {
                record.target_path = path.to_string();
            }
            true
        });
    }

    /// Promotes a module to running unless it already is
    pub fn set_running(&self, module: ModuleId) {
        self.update(module, |record| {
            if record.is_running {
                return false;
            }
            record.is_running = true;
            record.status = JobStatus::Running;
            record.consecutive_error_count = 0;
            true
        });
    }

    /// Marks a module as stopped with a terminal status
    pub fn set_stopped(&self, module: ModuleId, final_status: FinalStatus) {
        self.update(module, |record| {
            record.is_running = false;
            record.status = final_status.into();
            true
        });
    }

    /// Updates the progress counters that are supplied
    ///
    /// `files_checked` is clamped to `total_files` whenever a total is known.
    pub fn set_progress(&self, module: ModuleId, checked: Option<u64>, total: Option<u64>) {
        self.update(module, |record| {
            if let Some(checked) = checked {
                record.files_checked = checked;
            }
            if let Some(total) = total {
                record.total_files = total;
            }
            if record.total_files > 0 && record.files_checked > record.total_files {
                warn!(
                    "{} progress {} exceeds total {}, clamping",
                    module, record.files_checked, record.total_files
                );
                record.files_checked = record.total_files;
            }
            true
        });
    }

    /// Records a failure
    ///
    /// A network error only bumps the consecutive error counter; the job
    /// keeps running. Any other error stops the module with `Error`.
    pub fn set_error(&self, module: ModuleId, is_network_error: bool) {
        self.update(module, |record| {
            if is_network_error {
                record.consecutive_error_count = record.consecutive_error_count.saturating_add(1);
            } else {
                record.is_running = false;
                record.status = JobStatus::Error;
            }
            true
        });
    }

    /// Resets the consecutive error counter after a successful poll
    pub fn clear_errors(&self, module: ModuleId) {
        self.update(module, |record| {
            if record.consecutive_error_count == 0 {
                return false;
            }
            record.consecutive_error_count = 0;
            true
        });
    }

    /// Delivers a log line to subscribers without touching the record
    pub fn emit_log(&self, module: ModuleId, text: impl Into<String>) {
        let _delivery = self.delivery();
        self.notify(&RegistryEvent::Log(LogEvent::now(module, text)));
    }

    /// Registers an observer
    ///
    /// Observers run in subscription order on every mutation and every log
    /// line. Records they receive are snapshots.
    pub fn subscribe<F>(&self, callback: F)
    where
        F: Fn(&RegistryEvent) + Send + Sync + 'static,
    {
        self.subscribers().push(Arc::new(callback));
    }

    /// Applies `change` to a module's record and notifies when it reports a change
    fn update(&self, module: ModuleId, change: impl FnOnce(&mut JobRecord) -> bool) {
        let _delivery = self.delivery();
        let snapshot = {
            let mut records = self.records();
            let record = records.entry(module).or_default();
            if !change(record) {
                return;
            }
            record.clone()
        };

        debug!(
            "{} is now {} ({} consecutive errors)",
            module, snapshot.status, snapshot.consecutive_error_count
        );
        self.notify(&RegistryEvent::StateChanged {
            module,
            record: snapshot,
        });
    }

    fn notify(&self, event: &RegistryEvent) {
        let subscribers = self.subscribers().clone();
        for subscriber in subscribers {
            subscriber(event);
        }
    }

    fn records(&self) -> MutexGuard<'_, BTreeMap<ModuleId, JobRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn delivery(&self) -> MutexGuard<'_, ()> {
        self.delivery.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn subscribers(&self) -> MutexGuard<'_, Vec<Subscriber>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}
