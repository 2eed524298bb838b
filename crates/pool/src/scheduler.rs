//! Bounded worker pool over a FIFO queue of shell commands.
//!
//! [`Scheduler`] keeps at most `max_tasks` commands running at once. Tasks
//! start in the order they were added, each in the lowest free worker slot,
//! with the worker-id token in the command replaced by that slot's index.
//!
//! All state mutation and every observer callback happens under one mutex,
//! which is never held across an `.await`. A panicking observer is logged
//! and skipped. Only the commands themselves run
//! concurrently, as Tokio tasks spawned on the runtime captured at
//! construction.

use std::any::Any;
use std::cell::Cell;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use futures::FutureExt;
use parexec_core::PoolConfig;
use parexec_runner::{ExecError, ProcessRunner, TaskOutcome};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, info, warn};

use crate::observer::{ChannelObserver, SchedulerEvent, TaskObserver};
use crate::slots::{InFlight, WorkerSlots};
use crate::template::{substitute_worker_id, DEFAULT_WORKER_ID_TOKEN};

thread_local! {
    /// Address of the scheduler whose observers are running on this thread (0 = none).
    static NOTIFYING: Cell<usize> = const { Cell::new(0) };
}

// ── State ────────────────────────────────────────────────────────────

struct SchedulerState {
    queue: VecDeque<String>,
    slots: WorkerSlots,
    running_tasks: usize,
    running: bool,
    observers: Vec<Arc<dyn TaskObserver>>,
}

impl SchedulerState {
    fn new(max_tasks: usize, observers: Vec<Arc<dyn TaskObserver>>) -> Self {
        Self {
            queue: VecDeque::new(),
            slots: WorkerSlots::new(max_tasks),
            running_tasks: 0,
            running: false,
            observers,
        }
    }

    /// There is queued work, the pool was started, and a slot is free.
    fn can_start(&self) -> bool {
        !self.queue.is_empty() && self.running && self.running_tasks < self.slots.capacity()
    }

    fn is_drained(&self) -> bool {
        self.running && self.queue.is_empty() && self.running_tasks == 0
    }
}

struct Inner<R: ProcessRunner> {
    max_tasks: usize,
    worker_id_token: String,
    runner: R,
    options: R::Options,
    runtime: Handle,
    state: Mutex<SchedulerState>,
    drained: Notify,
}

impl<R: ProcessRunner> Inner<R> {
    fn id(&self) -> usize {
        self as *const Self as usize
    }

    /// # Panics
    ///
    /// Panics when called from one of this scheduler's own observer
    /// callbacks, which would otherwise deadlock on the state lock.
    fn lock_state(&self) -> MutexGuard<'_, SchedulerState> {
        if NOTIFYING.with(Cell::get) == self.id() {
            panic!("observer called back into its own scheduler while being notified");
        }
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `notify` against every observer in registration order.
    ///
    /// A panicking observer is logged and skipped; the state it was notified
    /// about has already been applied, so dispatch carries on regardless.
    fn notify(
        &self,
        state: &SchedulerState,
        event: &'static str,
        notify: impl Fn(&dyn TaskObserver),
    ) {
        let previous = NOTIFYING.with(|n| n.replace(self.id()));
        for (index, observer) in state.observers.iter().enumerate() {
            let result = panic::catch_unwind(AssertUnwindSafe(|| notify(observer.as_ref())));
            if let Err(payload) = result {
                warn!(
                    event,
                    observer = index,
                    panic = %panic_message(payload.as_ref()),
                    "observer panicked"
                );
            }
        }
        NOTIFYING.with(|n| n.set(previous));
    }

    /// Pop the head of the queue into the lowest free slot and launch it.
    ///
    /// Returns `false` when nothing could be started.
    fn start_next_task(self: &Arc<Self>, state: &mut SchedulerState) -> bool {
        if !state.can_start() {
            return false;
        }
        let Some(template) = state.queue.pop_front() else {
            return false;
        };
        let Some(worker_id) = state.slots.lowest_free() else {
            panic!(
                "could not find a free worker slot ({} running of {}): pool bookkeeping is corrupt",
                state.running_tasks, self.max_tasks
            );
        };

        let command = substitute_worker_id(&template, &self.worker_id_token, worker_id);
        let claimed = state.slots.claim(InFlight {
            template: template.clone(),
            command: command.clone(),
            started_at: Instant::now(),
        });
        debug_assert_eq!(claimed, Some(worker_id));
        state.running_tasks += 1;
        debug_assert_eq!(state.running_tasks, state.slots.busy());

        debug!(worker_id, command = %command, running = state.running_tasks, "dispatching task");
        self.notify(state, "started_task", |o| o.started_task(&template, worker_id));

        let inner = Arc::clone(self);
        self.runtime.spawn(async move {
            let outcome = AssertUnwindSafe(inner.runner.run(&command, &inner.options))
                .catch_unwind()
                .await
                .unwrap_or_else(|payload| {
                    let message = panic_message(payload.as_ref());
                    warn!(worker_id, command = %command, panic = %message, "process runner panicked");
                    TaskOutcome::failure(ExecError::RunnerPanicked(message))
                });
            inner.complete(worker_id, outcome);
        });

        true
    }

    /// Free the slot, report the outcome, then refill or signal the drain.
    fn complete(self: &Arc<Self>, worker_id: usize, outcome: TaskOutcome) {
        let mut state = self.lock_state();
        let Some(task) = state.slots.release(worker_id) else {
            panic!("completion reported for idle worker slot {worker_id}");
        };
        state.running_tasks -= 1;

        debug!(
            worker_id,
            command = %task.command,
            elapsed = ?task.started_at.elapsed(),
            success = outcome.is_success(),
            "task completed"
        );
        self.notify(&state, "finished_task", |o| {
            o.finished_task(&task.template, worker_id, &outcome)
        });

        if state.can_start() {
            self.start_next_task(&mut state);
        } else if state.running_tasks == 0 {
            info!("worker pool drained");
            self.notify(&state, "finished", |o| o.finished());
            self.drained.notify_waiters();
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

// ── Scheduler ────────────────────────────────────────────────────────

/// Runs queued commands on a fixed number of worker slots.
///
/// Cloning yields another handle to the same pool. In-flight tasks keep the
/// pool alive until they complete.
///
/// # Example
/// ```ignore
/// let scheduler = Scheduler::new(2, ShellRunner, RunOptions::new());
/// let mut events = scheduler.subscribe_channel();
/// scheduler.add_task("cargo test --jobs 1 -- --port 80#workerId#");
/// scheduler.add_task("cargo bench -- --device #workerId#");
/// scheduler.start();
/// scheduler.wait_drained().await;
/// ```
pub struct Scheduler<R: ProcessRunner> {
    inner: Arc<Inner<R>>,
}

impl<R: ProcessRunner> Clone for Scheduler<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: ProcessRunner> Scheduler<R> {
    /// Create a pool with `max_tasks` free slots and an empty queue.
    ///
    /// `options` is handed unchanged to the runner for every command.
    ///
    /// # Panics
    ///
    /// Panics if `max_tasks` is zero, or if called outside a Tokio runtime.
    pub fn new(max_tasks: usize, runner: R, options: R::Options) -> Self {
        Self::builder(runner, options).max_tasks(max_tasks).build()
    }

    /// Create a pool sized and configured from a loaded [`PoolConfig`].
    ///
    /// # Panics
    ///
    /// Same as [`Scheduler::new`]; run [`PoolConfig::validate`] first.
    pub fn from_config(config: &PoolConfig, runner: R, options: R::Options) -> Self {
        Self::builder(runner, options)
            .max_tasks(config.max_tasks)
            .worker_id_token(config.worker_id_token.clone())
            .build()
    }

    pub fn builder(runner: R, options: R::Options) -> SchedulerBuilder<R> {
        SchedulerBuilder::new(runner, options)
    }

    /// Append a command template to the queue.
    ///
    /// If the pool is running and a slot is free, the task starts before this
    /// call returns.
    pub fn add_task(&self, template: impl Into<String>) {
        let mut state = self.inner.lock_state();
        state.queue.push_back(template.into());
        if state.can_start() {
            self.inner.start_next_task(&mut state);
        }
    }

    /// Mark the pool running and fill every free slot from the queue.
    ///
    /// Safe to call again; it never runs more than `max_tasks` at once. With
    /// an empty queue the pool is simply armed, so later `add_task` calls
    /// dispatch immediately.
    pub fn start(&self) {
        let mut state = self.inner.lock_state();
        state.running = true;
        info!(
            max_tasks = self.inner.max_tasks,
            queued = state.queue.len(),
            "starting worker pool"
        );

        let free = self.inner.max_tasks - state.running_tasks;
        for _ in 0..free {
            if !self.inner.start_next_task(&mut state) {
                break;
            }
        }

        if state.is_drained() {
            self.inner.drained.notify_waiters();
        }
    }

    /// Register an observer. Takes effect for the next event.
    pub fn subscribe(&self, observer: Arc<dyn TaskObserver>) {
        self.inner.lock_state().observers.push(observer);
    }

    /// Register a [`ChannelObserver`] and return its receiving end.
    pub fn subscribe_channel(&self) -> mpsc::UnboundedReceiver<SchedulerEvent> {
        let (observer, rx) = ChannelObserver::new();
        self.subscribe(Arc::new(observer));
        rx
    }

    /// Wait until the pool is running with nothing queued or in flight.
    ///
    /// Returns immediately if that is already the case.
    pub async fn wait_drained(&self) {
        loop {
            let notified = self.inner.drained.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_drained() {
                return;
            }
            notified.await;
        }
    }

    pub fn max_tasks(&self) -> usize {
        self.inner.max_tasks
    }

    pub fn worker_id_token(&self) -> &str {
        &self.inner.worker_id_token
    }

    pub fn running_tasks(&self) -> usize {
        self.inner.lock_state().running_tasks
    }

    pub fn queued_tasks(&self) -> usize {
        self.inner.lock_state().queue.len()
    }

    pub fn is_running(&self) -> bool {
        self.inner.lock_state().running
    }

    pub fn is_drained(&self) -> bool {
        self.inner.lock_state().is_drained()
    }

    /// Substituted commands currently running, indexed by worker slot.
    pub fn in_flight(&self) -> Vec<Option<String>> {
        let state = self.inner.lock_state();
        (0..state.slots.capacity())
            .map(|id| state.slots.get(id).map(|task| task.command.clone()))
            .collect()
    }
}

// ── SchedulerBuilder ─────────────────────────────────────────────────

/// Fluent builder for a [`Scheduler`].
pub struct SchedulerBuilder<R: ProcessRunner> {
    runner: R,
    options: R::Options,
    max_tasks: usize,
    worker_id_token: String,
    observers: Vec<Arc<dyn TaskObserver>>,
    runtime: Option<Handle>,
}

impl<R: ProcessRunner> SchedulerBuilder<R> {
    /// Defaults: one slot per available CPU, `#workerId#` token, no observers.
    pub fn new(runner: R, options: R::Options) -> Self {
        Self {
            runner,
            options,
            max_tasks: PoolConfig::default().max_tasks,
            worker_id_token: DEFAULT_WORKER_ID_TOKEN.to_string(),
            observers: Vec::new(),
            runtime: None,
        }
    }

    pub fn max_tasks(mut self, max_tasks: usize) -> Self {
        self.max_tasks = max_tasks;
        self
    }

    pub fn worker_id_token(mut self, token: impl Into<String>) -> Self {
        self.worker_id_token = token.into();
        self
    }

    pub fn observer(mut self, observer: Arc<dyn TaskObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Runtime that runs the commands (default: the current one).
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    /// # Panics
    ///
    /// Panics if `max_tasks` is zero, or if no runtime was given and this is
    /// called outside a Tokio runtime.
    pub fn build(self) -> Scheduler<R> {
        assert!(self.max_tasks >= 1, "scheduler needs at least one worker slot");
        let runtime = self.runtime.unwrap_or_else(Handle::current);

        Scheduler {
            inner: Arc::new(Inner {
                max_tasks: self.max_tasks,
                worker_id_token: self.worker_id_token,
                runner: self.runner,
                options: self.options,
                runtime,
                state: Mutex::new(SchedulerState::new(self.max_tasks, self.observers)),
                drained: Notify::new(),
            }),
        }
    }
}
