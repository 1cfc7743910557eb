use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::error::AgentError;

/// Runs blocking backend calls on tokio's blocking pool so that awaiting
/// them never stalls the scheduler.
///
/// Concurrency is bounded: each in-flight call holds one permit (one worker
/// thread) until the blocking closure returns. The permit is released by the
/// worker, not by the awaiting task, so a caller that times out or is
/// cancelled keeps its slot occupied until the backend actually answers.
#[derive(Debug, Clone)]
pub struct BlockingBridge {
    permits: Arc<Semaphore>,
    workers: usize,
}

impl BlockingBridge {
    pub fn new(workers: usize) -> Self {
        let workers = workers.max(1);
        Self {
            permits: Arc::new(Semaphore::new(workers)),
            workers,
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Worker slots not currently taken by an in-flight call.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Executes `f` on a worker and resolves with its result.
    ///
    /// An `Err` from `f` comes back exactly as returned. A panic inside `f`
    /// is resumed on the awaiting task.
    pub async fn run<F, T>(&self, f: F) -> Result<T, AgentError>
    where
        F: FnOnce() -> Result<T, AgentError> + Send + 'static,
        T: Send + 'static,
    {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| AgentError::Cancelled)?;

        let handle = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            f()
        });

        match handle.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(_) => Err(AgentError::Cancelled),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ProviderKind;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn returns_the_closure_value() {
        let bridge = BlockingBridge::new(2);
        let value = bridge.run(|| Ok(21 * 2)).await.unwrap();
        assert_eq!(value, 42);
        assert_eq!(bridge.available(), 2);
    }

    #[tokio::test]
    async fn errors_surface_unaltered() {
        let bridge = BlockingBridge::new(1);
        let err = bridge
            .run::<_, ()>(|| Err(AgentError::provider(ProviderKind::MessagesStyle, "429 rate limited")))
            .await
            .unwrap_err();

        match err {
            AgentError::ProviderRequest { provider, detail } => {
                assert_eq!(provider, ProviderKind::MessagesStyle);
                assert_eq!(detail, "429 rate limited");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    #[should_panic(expected = "backend exploded")]
    async fn panics_are_resumed_on_the_caller() {
        let bridge = BlockingBridge::new(1);
        let _ = bridge.run::<_, ()>(|| panic!("backend exploded")).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn in_flight_calls_are_bounded_by_worker_count() {
        let bridge = BlockingBridge::new(2);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..6 {
            let bridge = bridge.clone();
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            tasks.push(tokio::spawn(async move {
                bridge.run(move || {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(30));
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                }).await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(bridge.available(), 2);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn scheduler_keeps_running_while_worker_blocks() {
        let bridge = BlockingBridge::new(1);
        let ticks = Arc::new(AtomicUsize::new(0));

        let ticker = {
            let ticks = Arc::clone(&ticks);
            tokio::spawn(async move {
                loop {
                    ticks.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
            })
        };

        bridge.run(|| {
            std::thread::sleep(Duration::from_millis(100));
            Ok(())
        }).await.unwrap();
        ticker.abort();

        assert!(ticks.load(Ordering::SeqCst) > 3, "ticker starved while the worker blocked");
    }
}
