pub mod observer;
pub mod scheduler;
pub mod slots;
pub mod template;

pub use observer::{ChannelObserver, SchedulerEvent, TaskObserver, TracingObserver};
pub use scheduler::{Scheduler, SchedulerBuilder};
pub use slots::{InFlight, WorkerSlots};
pub use template::{substitute_worker_id, DEFAULT_WORKER_ID_TOKEN};

pub use parexec_runner::{ExecError, ProcessRunner, RunOptions, ShellRunner, TaskOutcome};
