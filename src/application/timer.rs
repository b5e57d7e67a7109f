use std::future::Future;
use std::ops::ControlFlow;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

/// One-shot countdown bound to a single session.
///
/// Decrements once per second from an initial value (the configured window,
/// or an externally supplied remaining value for a resumed session) and
/// invokes the tick callback with the new remaining count. The callback runs
/// with `0` exactly once, after which the task ends permanently. The
/// callback may also end the countdown early by returning
/// `ControlFlow::Break`.
///
/// Dropping or stopping the timer aborts the task, so a discarded timer can
/// never fire into a session that has been superseded.
pub struct CountdownTimer {
    task: JoinHandle<()>,
}

impl CountdownTimer {
    pub fn arm<F, Fut>(initial_secs: u64, mut on_tick: F) -> Self
    where
        F: FnMut(u64) -> Fut + Send + 'static,
        Fut: Future<Output = ControlFlow<()>> + Send + 'static,
    {
        let task = tokio::spawn(async move {
            // A resumed session can come back with nothing left on the
            // clock; expire it on the spot instead of never firing.
            if initial_secs == 0 {
                let _ = on_tick(0).await;
                return;
            }
            let mut interval = time::interval(Duration::from_secs(1));
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick of a tokio interval resolves immediately.
            interval.tick().await;
            let mut remaining = initial_secs;
            while remaining > 0 {
                interval.tick().await;
                remaining -= 1;
                if on_tick(remaining).await.is_break() {
                    return;
                }
            }
        });
        Self { task }
    }

    pub fn stop(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for CountdownTimer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl std::fmt::Debug for CountdownTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CountdownTimer")
            .field("finished", &self.task.is_finished())
            .finish()
    }
}
