//! Cancellable repeating task
//!
//! Runs an async tick on a fixed period using tokio's clock, so tests can drive
//! it with a paused runtime instead of waiting on wall-clock time. The period is
//! measured from the end of one tick to the start of the next.

use crate::domain::models::LoopExit;
use std::future::Future;
use std::ops::ControlFlow;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::debug;

pub struct RepeatingTask {
    cancel: Option<oneshot::Sender<()>>,
    handle: JoinHandle<LoopExit>,
}

impl RepeatingTask {
    /// Spawn `tick` every `period` until it breaks or the task is stopped
    pub fn spawn<F, Fut>(period: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ControlFlow<LoopExit>> + Send + 'static,
    {
        let (cancel, mut cancelled) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    // Fires on an explicit stop and when the owner is dropped
                    _ = &mut cancelled => return LoopExit::Cancelled,
                    _ = tokio::time::sleep(period) => {}
                }

                if let ControlFlow::Break(exit) = tick().await {
                    return exit;
                }
            }
        });

        Self {
            cancel: Some(cancel),
            handle,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Stop after the in-flight tick, if any, and report how the task ended
    pub async fn stop(mut self) -> LoopExit {
        if let Some(cancel) = self.cancel.take() {
            // Err means the task already ended on its own
            let _ = cancel.send(());
        }

        match (&mut self.handle).await {
            Ok(exit) => exit,
            Err(e) => {
                debug!("Repeating task ended abnormally: {}", e);
                LoopExit::Aborted
            }
        }
    }

    /// Stop immediately, even in the middle of a tick
    pub fn abort(self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting_task(period: Duration, count: Arc<AtomicUsize>) -> RepeatingTask {
        RepeatingTask::spawn(period, move || {
            let count = count.clone();
            async move {
                count.fetch_add(1, Ordering::SeqCst);
                ControlFlow::Continue(())
            }
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_at_period() {
        let count = Arc::new(AtomicUsize::new(0));
        let task = counting_task(Duration::from_millis(100), count.clone());

        tokio::time::sleep(Duration::from_millis(550)).await;
        assert_eq!(count.load(Ordering::SeqCst), 5);

        assert_eq!(task.stop().await, LoopExit::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_ticks_after_stop() {
        let count = Arc::new(AtomicUsize::new(0));
        let task = counting_task(Duration::from_millis(100), count.clone());

        tokio::time::sleep(Duration::from_millis(250)).await;
        task.stop().await;
        let after_stop = count.load(Ordering::SeqCst);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(count.load(Ordering::SeqCst), after_stop);
    }

    #[tokio::test(start_paused = true)]
    async fn test_break_ends_task_with_reason() {
        let count = Arc::new(AtomicUsize::new(0));
        let ticks = count.clone();
        let task = RepeatingTask::spawn(Duration::from_millis(50), move || {
            let n = ticks.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n == 3 {
                    ControlFlow::Break(LoopExit::Failed(TransportError::NotConnected))
                } else {
                    ControlFlow::Continue(())
                }
            }
        });

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(task.is_finished());
        assert_eq!(count.load(Ordering::SeqCst), 3);
        // Stopping a finished task is fine and still reports the reason
        assert_eq!(
            task.stop().await,
            LoopExit::Failed(TransportError::NotConnected)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_and_drop_cancel() {
        let count = Arc::new(AtomicUsize::new(0));
        let task = counting_task(Duration::from_millis(100), count.clone());
        tokio::time::sleep(Duration::from_millis(150)).await;
        task.abort();

        let dropped = counting_task(Duration::from_millis(100), count.clone());
        drop(dropped);

        let before = count.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(count.load(Ordering::SeqCst), before);
    }
}
