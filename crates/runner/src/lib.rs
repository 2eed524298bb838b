pub mod error;
pub mod options;
pub mod outcome;
pub mod runner;
pub mod shell;

pub use error::ExecError;
pub use options::RunOptions;
pub use outcome::TaskOutcome;
pub use runner::ProcessRunner;
pub use shell::ShellRunner;
