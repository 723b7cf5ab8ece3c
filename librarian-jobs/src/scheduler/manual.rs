//! Virtual-clock scheduler
//!
//! Continuations are queued instead of spawned. Tests decide when they run,
//! and time only moves when a queued continuation is run or the clock is
//! advanced explicitly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::{LoopKey, Scheduler, Task, TaskHandle};

/// A continuation as recorded by [`ManualScheduler`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledTask {
    pub key: LoopKey,
    /// Delay requested by the loop
    pub delay: Duration,
    /// Virtual time at which the continuation becomes due
    pub due: Duration,
}

struct Entry {
    seq: u64,
    info: ScheduledTask,
    cancelled: Arc<AtomicBool>,
    task: Task,
}

#[derive(Default)]
struct State {
    now: Duration,
    next_seq: u64,
    queue: Vec<Entry>,
    history: Vec<ScheduledTask>,
}

/// Deterministic scheduler driven by the caller
#[derive(Default)]
pub struct ManualScheduler {
    state: Mutex<State>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current virtual time
    pub fn now(&self) -> Duration {
        self.state().now
    }

    /// Continuations waiting to run, earliest first
    pub fn pending(&self) -> Vec<ScheduledTask> {
        let mut state = self.state();
        state.queue.retain(|entry| !entry.cancelled.load(Ordering::SeqCst));
        let mut entries: Vec<_> = state
            .queue
            .iter()
            .map(|entry| (entry.info.due, entry.seq, entry.info))
            .collect();
        entries.sort_by_key(|(due, seq, _)| (*due, *seq));
        entries.into_iter().map(|(_, _, info)| info).collect()
    }

    /// Every schedule request ever made, in request order
    pub fn history(&self) -> Vec<ScheduledTask> {
        self.state().history.clone()
    }

    /// Delays requested for one loop, in request order
    pub fn delays_for(&self, key: LoopKey) -> Vec<Duration> {
        self.state()
            .history
            .iter()
            .filter(|task| task.key == key)
            .map(|task| task.delay)
            .collect()
    }

    /// Runs the earliest due continuation, advancing the clock to its due time
    pub async fn run_next(&self) -> Option<LoopKey> {
        self.run_first_matching(|_| true).await
    }

    /// Runs the earliest pending continuation of one loop
    ///
    /// Other loops' continuations are left queued even if they were due
    /// earlier.
    pub async fn run_next_for(&self, key: LoopKey) -> bool {
        self.run_first_matching(|info| info.key == key).await.is_some()
    }

    /// Advances the clock by `by`, running every continuation that falls due
    ///
    /// Continuations scheduled while advancing run too if they fall inside
    /// the window. Returns the number of continuations run.
    pub async fn advance(&self, by: Duration) -> usize {
        let target = self.now() + by;
        let mut ran = 0;

        loop {
            let next = self.take_first(|info| info.due <= target);
            match next {
                Some((_, task)) => {
                    task.await;
                    ran += 1;
                }
                None => break,
            }
        }

        let mut state = self.state();
        state.now = state.now.max(target);
        ran
    }

    /// Runs continuations until the queue is empty or `max_steps` have run
    pub async fn run_until_idle(&self, max_steps: usize) -> usize {
        let mut ran = 0;
        while ran < max_steps && self.run_next().await.is_some() {
            ran += 1;
        }
        ran
    }

    async fn run_first_matching(&self, matches: impl Fn(&ScheduledTask) -> bool) -> Option<LoopKey> {
        let (key, task) = self.take_first(matches)?;
        task.await;
        Some(key)
    }

    /// Removes the earliest matching live entry and moves the clock to its due time
    fn take_first(&self, matches: impl Fn(&ScheduledTask) -> bool) -> Option<(LoopKey, Task)> {
        let mut state = self.state();
        state.queue.retain(|entry| !entry.cancelled.load(Ordering::SeqCst));

        let index = state
            .queue
            .iter()
            .enumerate()
            .filter(|(_, entry)| matches(&entry.info))
            .min_by_key(|(_, entry)| (entry.info.due, entry.seq))
            .map(|(index, _)| index)?;

        let entry = state.queue.swap_remove(index);
        state.now = state.now.max(entry.info.due);
        Some((entry.info.key, entry.task))
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, key: LoopKey, delay: Duration, task: Task) -> TaskHandle {
        let mut state = self.state();
        let info = ScheduledTask {
            key,
            delay,
            due: state.now + delay,
        };
        let cancelled = Arc::new(AtomicBool::new(false));
        let seq = state.next_seq;
        state.next_seq += 1;
        state.history.push(info);
        state.queue.push(Entry {
            seq,
            info,
            cancelled: Arc::clone(&cancelled),
            task,
        });

        TaskHandle::new(move || cancelled.store(true, Ordering::SeqCst))
    }
}
