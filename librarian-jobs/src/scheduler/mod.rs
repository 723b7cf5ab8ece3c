//! Scheduler layer
//!
//! Polling loops never sleep inline. Each iteration hands its continuation
//! to a [`Scheduler`] together with a delay and gets back a [`TaskHandle`].
//! [`TokioScheduler`] runs continuations on the tokio runtime;
//! [`ManualScheduler`] keeps them on a virtual clock for deterministic tests.

mod manual;

pub use manual::{ManualScheduler, ScheduledTask};

use librarian_core::domain::module::ModuleId;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tracing::debug;

/// A scheduled continuation
pub type Task = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Which of a module's two polling loops a task belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LoopKind {
    Status,
    Output,
}

/// Identifies one polling loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoopKey {
    pub module: ModuleId,
    pub kind: LoopKind,
}

impl LoopKey {
    pub fn status(module: ModuleId) -> Self {
        Self {
            module,
            kind: LoopKind::Status,
        }
    }

    pub fn output(module: ModuleId) -> Self {
        Self {
            module,
            kind: LoopKind::Output,
        }
    }
}

impl fmt::Display for LoopKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            LoopKind::Status => "status",
            LoopKind::Output => "output",
        };
        write!(f, "{}/{}", self.module, kind)
    }
}

/// Runs continuations after a delay
pub trait Scheduler: Send + Sync {
    /// Schedules `task` to run once `delay` has elapsed
    fn schedule(&self, key: LoopKey, delay: Duration, task: Task) -> TaskHandle;
}

/// Handle to a scheduled continuation
///
/// Aborting prevents a pending continuation from running. A continuation
/// that is already running is interrupted at its next suspension point.
pub struct TaskHandle {
    abort: Box<dyn Fn() + Send + Sync>,
}

impl TaskHandle {
    pub fn new(abort: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            abort: Box::new(abort),
        }
    }

    pub fn abort(&self) {
        (self.abort)();
    }
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle").finish_non_exhaustive()
    }
}

/// Scheduler backed by the tokio runtime
///
/// Each continuation becomes its own task that sleeps for the delay first.
/// Must be used from within a runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioScheduler;

impl Scheduler for TokioScheduler {
    fn schedule(&self, key: LoopKey, delay: Duration, task: Task) -> TaskHandle {
        debug!("Scheduling {} in {:?}", key, delay);
        let handle = tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            task.await;
        });

        let abort = handle.abort_handle();
        TaskHandle::new(move || abort.abort())
    }
}
