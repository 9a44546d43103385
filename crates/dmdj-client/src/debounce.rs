//! Debounced control: coalesces rapid local edits (slider drags) into one
//! commit per quiet period.
//!
//! ```text
//!  input(v) ──► display = v, cancel unfired timer, arm new timer
//!  timer fires ──► commit(v) runs to completion (not cancelled by later input)
//!  sync(server) ──► display = server, but only when nothing is pending
//! ```

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::task::JoinHandle;
use tracing::debug;

/// Sends a value to the remote service.  Errors are already reported by the
/// orchestrator; the control only notes them.
pub type CommitFn<T> = Arc<dyn Fn(T) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Wrap an async closure as a [`CommitFn`].
pub fn commit_fn<T, F, Fut>(f: F) -> CommitFn<T>
where
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |value| -> BoxFuture<'static, anyhow::Result<()>> { Box::pin(f(value)) })
}

/// Default quiet period.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

struct Armed {
    task: JoinHandle<()>,
    /// Claimed once, by the timer when the commit starts or by `disarm`.
    fired: Arc<AtomicBool>,
}

pub struct DebouncedControl<T> {
    delay: Duration,
    display: T,
    armed: Option<Armed>,
    commit: CommitFn<T>,
}

impl<T> DebouncedControl<T>
where
    T: Clone + Send + 'static,
{
    pub fn new(initial: T, delay: Duration, commit: CommitFn<T>) -> Self {
        Self {
            delay,
            display: initial,
            armed: None,
            commit,
        }
    }

    /// Value to show: the local value while editing, otherwise the last
    /// authoritative one.
    pub fn value(&self) -> &T {
        &self.display
    }

    /// True while a timer is armed or its commit is still in flight.
    pub fn is_pending(&self) -> bool {
        self.armed
            .as_ref()
            .map(|a| !a.task.is_finished())
            .unwrap_or(false)
    }

    /// Local edit.  Supersedes an unfired timer; a commit already in flight
    /// is left to finish.
    pub fn input(&mut self, value: T) {
        self.display = value.clone();
        self.cancel_unfired();

        let fired = Arc::new(AtomicBool::new(false));
        let task = {
            let fired = Arc::clone(&fired);
            let commit = Arc::clone(&self.commit);
            let delay = self.delay;
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                if fired.swap(true, Ordering::SeqCst) {
                    // Superseded after the sleep but before the abort landed.
                    return;
                }
                if let Err(e) = commit(value).await {
                    debug!("debounced commit failed: {}", e);
                }
            })
        };
        self.armed = Some(Armed { task, fired });
    }

    /// New authoritative value from the server.  Returns `true` if the
    /// display snapped to it.
    pub fn sync(&mut self, authoritative: T) -> bool {
        if self.is_pending() {
            return false;
        }
        self.armed = None;
        self.display = authoritative;
        true
    }

    fn cancel_unfired(&mut self) {
        if let Some(armed) = self.armed.take() {
            armed.disarm();
        }
    }
}

impl Armed {
    /// Abort unless the timer already claimed `fired`.  A fired task keeps
    /// running detached until its commit returns.
    fn disarm(self) {
        if !self.fired.swap(true, Ordering::SeqCst) {
            self.task.abort();
        }
    }
}

impl<T> Drop for DebouncedControl<T> {
    fn drop(&mut self) {
        if let Some(armed) = self.armed.take() {
            armed.disarm();
        }
    }
}
