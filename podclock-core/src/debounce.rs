//! Trailing-edge debounce.
//!
//! [`DelayedTask::schedule`] arms a timer; scheduling again before it fires
//! replaces the pending run, so a burst of mutations produces one run
//! `delay` after the last of them.
//!
//! Only the wait is cancellable. Once the delay elapses the job moves to its
//! own task, so a later `schedule` or [`DelayedTask::cancel`] never aborts a
//! job that has already started.

use std::future::Future;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;

/// A single cancellable delayed job.
#[derive(Debug)]
pub struct DelayedTask {
    name: &'static str,
    delay: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl DelayedTask {
    pub fn new(name: &'static str, delay: Duration) -> Self {
        Self {
            name,
            delay,
            pending: Mutex::new(None),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Run `job` after the delay, cancelling any run still waiting.
    ///
    /// Outside a tokio runtime nothing is scheduled; callers that need the
    /// effect regardless must flush explicitly.
    pub fn schedule<F>(&self, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::debug!(task = self.name, "No runtime, debounce skipped");
            return;
        };

        let delay = self.delay;
        let name = self.name;
        let handle = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            tracing::trace!(task = name, "Debounce fired");
            tokio::spawn(job);
        });

        let previous = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    /// Drop the waiting run, if any. Returns true if one was cancelled.
    pub fn cancel(&self) -> bool {
        let pending = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match pending {
            Some(handle) if !handle.is_finished() => {
                handle.abort();
                true
            }
            _ => false,
        }
    }

    /// True while a run is armed and its delay has not elapsed.
    pub fn is_pending(&self) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }
}

impl Drop for DelayedTask {
    fn drop(&mut self) {
        if let Some(handle) = self
            .pending
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }
}
