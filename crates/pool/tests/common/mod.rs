//! Shared helpers for scheduler integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;

use parexec_pool::{ExecError, ProcessRunner, SchedulerEvent, TaskOutcome};

pub const TIMEOUT: Duration = Duration::from_secs(5);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Wait for the next scheduler event, failing the test after [`TIMEOUT`].
pub async fn next_event(rx: &mut mpsc::UnboundedReceiver<SchedulerEvent>) -> SchedulerEvent {
    timeout(TIMEOUT, rx.recv())
        .await
        .expect("timed out waiting for scheduler event")
        .expect("event channel closed")
}

pub fn started(command: &str, worker_id: usize) -> SchedulerEvent {
    SchedulerEvent::StartedTask {
        command: command.to_string(),
        worker_id,
    }
}

/// One pending command: the runner side waits on `rx`, the test side sends on `tx`.
struct Gate {
    tx: Option<oneshot::Sender<TaskOutcome>>,
    rx: Option<oneshot::Receiver<TaskOutcome>>,
}

impl Gate {
    fn new() -> Self {
        let (tx, rx) = oneshot::channel();
        Self {
            tx: Some(tx),
            rx: Some(rx),
        }
    }
}

/// Runner whose commands only complete when the test releases them.
///
/// Commands are keyed by their substituted text, so a release may happen
/// before or after the runner future is first polled.
#[derive(Default)]
pub struct GatedRunner {
    gates: Mutex<HashMap<String, Gate>>,
    calls: Mutex<Vec<String>>,
}

impl GatedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn release(&self, command: &str, outcome: TaskOutcome) {
        let tx = self
            .gates
            .lock()
            .unwrap()
            .entry(command.to_string())
            .or_insert_with(Gate::new)
            .tx
            .take()
            .unwrap_or_else(|| panic!("command {command:?} released twice"));
        tx.send(outcome).expect("runner side of the gate is gone");
    }

    pub fn succeed(&self, command: &str) {
        self.release(command, TaskOutcome::success(format!("{command}\n"), ""));
    }

    /// Commands the runner has been polled with, in poll order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProcessRunner for GatedRunner {
    type Options = ();

    async fn run(&self, command: &str, _options: &()) -> TaskOutcome {
        self.calls.lock().unwrap().push(command.to_string());
        let rx = self
            .gates
            .lock()
            .unwrap()
            .entry(command.to_string())
            .or_insert_with(Gate::new)
            .rx
            .take();
        match rx {
            Some(rx) => rx
                .await
                .unwrap_or_else(|_| TaskOutcome::failure(ExecError::Io("gate dropped".into()))),
            None => TaskOutcome::failure(ExecError::Io(format!("{command:?} ran twice"))),
        }
    }
}
