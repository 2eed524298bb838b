//! Process runner trait.

use std::sync::Arc;

use async_trait::async_trait;

use crate::outcome::TaskOutcome;

/// Executes one command string and reports how it went.
///
/// Returning the [`TaskOutcome`] is the completion report, so it happens
/// exactly once per call whether the command succeeded, failed, or could not
/// be spawned at all. `Options` is an opaque bag chosen by the implementation
/// (working directory, environment, ...) that callers pass through untouched.
#[async_trait]
pub trait ProcessRunner: Send + Sync + 'static {
    type Options: Send + Sync + 'static;

    async fn run(&self, command: &str, options: &Self::Options) -> TaskOutcome;
}

/// Blanket implementation so `Arc<R>` and `Arc<dyn ProcessRunner<Options = O>>`
/// can be used directly.
#[async_trait]
impl<T: ProcessRunner + ?Sized> ProcessRunner for Arc<T> {
    type Options = T::Options;

    async fn run(&self, command: &str, options: &Self::Options) -> TaskOutcome {
        (**self).run(command, options).await
    }
}
