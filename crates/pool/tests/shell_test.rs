//! End-to-end tests running real shell commands through the pool.

#![cfg(unix)]

mod common;

use std::collections::HashMap;
use std::sync::Arc;

use common::{init_tracing, next_event};
use parexec_pool::{
    ExecError, RunOptions, Scheduler, SchedulerEvent, ShellRunner, TaskOutcome, TracingObserver,
};

/// Drain the event stream up to the first `Finished`, keyed by template.
async fn collect_outcomes(
    events: &mut tokio::sync::mpsc::UnboundedReceiver<SchedulerEvent>,
) -> HashMap<String, (usize, TaskOutcome)> {
    let mut outcomes = HashMap::new();
    loop {
        match next_event(events).await {
            SchedulerEvent::FinishedTask {
                command,
                worker_id,
                outcome,
            } => {
                outcomes.insert(command, (worker_id, outcome));
            }
            SchedulerEvent::Finished => return outcomes,
            SchedulerEvent::StartedTask { .. } => {}
        }
    }
}

#[tokio::test]
async fn echo_tasks_see_their_worker_id() {
    init_tracing();
    let scheduler = Scheduler::builder(ShellRunner, RunOptions::new())
        .max_tasks(2)
        .observer(Arc::new(TracingObserver))
        .build();
    let mut events = scheduler.subscribe_channel();

    scheduler.add_task("echo a #workerId#");
    scheduler.add_task("echo b #workerId#");
    scheduler.add_task("echo c #workerId#");
    scheduler.start();

    let outcomes = collect_outcomes(&mut events).await;
    assert_eq!(outcomes.len(), 3);

    let (id, a) = &outcomes["echo a #workerId#"];
    assert_eq!((*id, a.stdout_lossy().trim()), (0, "a 0"));
    let (id, b) = &outcomes["echo b #workerId#"];
    assert_eq!((*id, b.stdout_lossy().trim()), (1, "b 1"));
    let (id, c) = &outcomes["echo c #workerId#"];
    assert!(*id < 2);
    assert_eq!(c.stdout_lossy().trim(), format!("c {id}"));
}

#[tokio::test]
async fn failing_command_does_not_stop_the_pool() {
    let scheduler = Scheduler::new(1, ShellRunner, RunOptions::new());
    let mut events = scheduler.subscribe_channel();

    scheduler.add_task("echo broken >&2; exit 3");
    scheduler.add_task("echo fine");
    scheduler.start();

    let outcomes = collect_outcomes(&mut events).await;
    let (_, broken) = &outcomes["echo broken >&2; exit 3"];
    assert_eq!(broken.error, Some(ExecError::ExitCode(3)));
    assert_eq!(broken.stderr_lossy().trim(), "broken");

    let (_, fine) = &outcomes["echo fine"];
    assert!(fine.is_success());
    assert_eq!(fine.stdout_lossy().trim(), "fine");
}

#[tokio::test]
async fn options_pass_through_to_every_command() {
    let dir = tempfile::tempdir().unwrap();
    let options = RunOptions::new()
        .working_dir(dir.path())
        .env("PAREXEC_SUFFIX", "log");
    let scheduler = Scheduler::new(3, ShellRunner, options);

    for _ in 0..3 {
        scheduler.add_task("touch worker_#workerId#.$PAREXEC_SUFFIX");
    }
    scheduler.start();
    scheduler.wait_drained().await;

    for id in 0..3 {
        let path = dir.path().join(format!("worker_{id}.log"));
        assert!(path.exists(), "missing {}", path.display());
    }
}
