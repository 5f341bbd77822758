//! Dedicated execution context for display calls
//!
//! Operator UIs usually require their widgets to be touched from one thread.
//! `UiContext` owns that thread: jobs are submitted from proxy tasks and run
//! in submission order, and the submitter awaits the result.

use crate::error::{panic_message, BreakpointError};
use crate::Result;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread::ThreadId;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Handle to the UI thread. Clones share the same thread, which exits once
/// every handle is dropped.
#[derive(Debug, Clone)]
pub struct UiContext {
    jobs: mpsc::UnboundedSender<Job>,
    thread_id: ThreadId,
}

impl UiContext {
    /// Spawn the UI thread
    pub fn spawn(name: &str) -> Result<Self> {
        let (jobs, mut rx) = mpsc::unbounded_channel::<Job>();
        let thread_name = name.to_string();

        let handle = std::thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                debug!("UI context '{}' started", thread_name);
                while let Some(job) = rx.blocking_recv() {
                    job();
                }
                debug!("UI context '{}' stopped", thread_name);
            })
            .map_err(|e| BreakpointError::UiUnavailable {
                reason: format!("failed to spawn thread '{}': {}", name, e),
            })?;

        info!("Spawned UI context '{}'", name);
        Ok(Self {
            jobs,
            thread_id: handle.thread().id(),
        })
    }

    /// Whether the caller is already running on the UI thread
    pub fn is_current(&self) -> bool {
        std::thread::current().id() == self.thread_id
    }

    /// Run `f` on the UI thread and wait for its result.
    pub async fn invoke_and_wait<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job: Job = Box::new(move || {
            let outcome = catch_unwind(AssertUnwindSafe(f));
            // Submitter may have gone away; nothing to report to
            let _ = reply_tx.send(outcome);
        });

        self.jobs.send(job).map_err(|_| BreakpointError::UiUnavailable {
            reason: "UI thread has stopped".to_string(),
        })?;

        match reply_rx.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(payload)) => Err(BreakpointError::UiPanicked {
                details: panic_message(payload.as_ref()),
            }),
            Err(_) => Err(BreakpointError::UiCancelled),
        }
    }

    /// Run `f` inline when already on the UI thread, otherwise marshal it.
    pub async fn run_or_invoke<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        if self.is_current() {
            return catch_unwind(AssertUnwindSafe(f)).map_err(|payload| {
                BreakpointError::UiPanicked {
                    details: panic_message(payload.as_ref()),
                }
            });
        }
        self.invoke_and_wait(f).await
    }
}
