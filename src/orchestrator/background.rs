use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{error, warn};

/// Supervisor for detached work.
///
/// Tasks spawned here run to completion even if nobody awaits their
/// handle. Failures and panics are logged by the supervisor itself, so a
/// result that the orchestrator stopped waiting for is never dropped
/// silently.
#[derive(Debug, Clone, Default)]
pub struct BackgroundTasks {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    in_flight: AtomicUsize,
    idle: Notify,
}

/// Decrements the in-flight count when the task ends, including by panic.
struct InFlightGuard {
    inner: Arc<Inner>,
    name: &'static str,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if std::thread::panicking() {
            error!(task = self.name, "Background task panicked");
        }
        if self.inner.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.inner.idle.notify_waiters();
        }
    }
}

impl BackgroundTasks {
    pub fn new() -> Self {
        BackgroundTasks::default()
    }

    /// Spawn a fallible task. An `Err` outcome is logged at `warn` and also
    /// returned through the handle.
    pub fn spawn<F, T, E>(&self, name: &'static str, future: F) -> JoinHandle<Result<T, E>>
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Display + Send + 'static,
    {
        self.inner.in_flight.fetch_add(1, Ordering::AcqRel);
        let guard = InFlightGuard {
            inner: Arc::clone(&self.inner),
            name,
        };

        tokio::spawn(async move {
            let _guard = guard;
            let result = future.await;
            if let Err(e) = &result {
                warn!(task = name, error = %e, "Background task failed");
            }
            result
        })
    }

    /// Number of tasks still running.
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::Acquire)
    }

    /// Wait until no task is running.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }
}
