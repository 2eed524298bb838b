//! Typed lifecycle notifications.
//!
//! Observers are called synchronously from inside `add_task`, `start`, and
//! completion handling, in registration order, while the scheduler's state
//! lock is held. Calling back into the same scheduler from a callback
//! panics instead of deadlocking; spawn a task if an observer needs to add
//! work. A panicking observer is logged and the remaining observers still
//! run.

use parexec_runner::TaskOutcome;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Receives scheduler lifecycle callbacks. Every method defaults to a no-op.
pub trait TaskObserver: Send + Sync {
    /// A task left the queue and occupies `worker_id`. `command` is the
    /// template as queued, before worker-id substitution.
    fn started_task(&self, _command: &str, _worker_id: usize) {}

    /// A task completed and its slot is free again.
    fn finished_task(&self, _command: &str, _worker_id: usize, _outcome: &TaskOutcome) {}

    /// The queue is empty and nothing is running.
    fn finished(&self) {}
}

/// Owned form of the observer callbacks, for channel delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerEvent {
    StartedTask {
        command: String,
        worker_id: usize,
    },
    FinishedTask {
        command: String,
        worker_id: usize,
        outcome: TaskOutcome,
    },
    Finished,
}

/// Forwards every callback into an unbounded channel.
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<SchedulerEvent>,
}

impl ChannelObserver {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SchedulerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: SchedulerEvent) {
        // Receiver gone means nobody is listening anymore.
        let _ = self.tx.send(event);
    }
}

impl TaskObserver for ChannelObserver {
    fn started_task(&self, command: &str, worker_id: usize) {
        self.send(SchedulerEvent::StartedTask {
            command: command.to_string(),
            worker_id,
        });
    }

    fn finished_task(&self, command: &str, worker_id: usize, outcome: &TaskOutcome) {
        self.send(SchedulerEvent::FinishedTask {
            command: command.to_string(),
            worker_id,
            outcome: outcome.clone(),
        });
    }

    fn finished(&self) {
        self.send(SchedulerEvent::Finished);
    }
}

/// Logs task lifecycle through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl TaskObserver for TracingObserver {
    fn started_task(&self, command: &str, worker_id: usize) {
        info!(worker_id, command = %command, "task started");
    }

    fn finished_task(&self, command: &str, worker_id: usize, outcome: &TaskOutcome) {
        match &outcome.error {
            None => info!(
                worker_id,
                command = %command,
                stdout_bytes = outcome.stdout.len(),
                "task finished"
            ),
            Some(err) => info!(
                worker_id,
                command = %command,
                error = %err,
                stderr = %outcome.stderr_lossy().trim_end(),
                "task failed"
            ),
        }
    }

    fn finished(&self) {
        debug!("all tasks finished");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parexec_runner::ExecError;

    #[test]
    fn channel_observer_forwards_in_order() {
        let (observer, mut rx) = ChannelObserver::new();
        observer.started_task("echo #workerId#", 0);
        observer.finished_task(
            "echo #workerId#",
            0,
            &TaskOutcome::failure(ExecError::ExitCode(1)),
        );
        observer.finished();

        assert_eq!(
            rx.try_recv().unwrap(),
            SchedulerEvent::StartedTask {
                command: "echo #workerId#".to_string(),
                worker_id: 0,
            }
        );
        match rx.try_recv().unwrap() {
            SchedulerEvent::FinishedTask { outcome, .. } => {
                assert_eq!(outcome.error, Some(ExecError::ExitCode(1)));
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(rx.try_recv().unwrap(), SchedulerEvent::Finished);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn channel_observer_ignores_dropped_receiver() {
        let (observer, rx) = ChannelObserver::new();
        drop(rx);
        observer.finished();
    }
}
