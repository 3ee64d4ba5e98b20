use std::sync::Arc;
use std::sync::RwLock;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::error::Result;

/// Context provided to background tasks during execution
pub struct Context {
    pub task_name: &'static str,
    pub shutdown: broadcast::Receiver<()>,
}

/// Trait for long-running background tasks
#[async_trait::async_trait]
pub trait BackgroundTask: Send + Sync {
    /// Task name for logging
    fn name(&self) -> &'static str;

    /// Run the task. Implementations loop until their work source closes
    /// or `ctx.shutdown` fires.
    async fn run(&self, ctx: Context) -> Result<()>;
}

/// Scheduler manages background tasks with graceful shutdown
pub struct Scheduler {
    tasks: RwLock<Vec<JoinHandle<()>>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Scheduler {
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            tasks: RwLock::new(Vec::new()),
            shutdown_tx,
        }
    }

    /// Register and spawn a background task
    pub fn register<T: BackgroundTask + 'static>(&self, task: Arc<T>) -> &Self {
        let shutdown = self.shutdown_tx.subscribe();
        let handle = tokio::spawn(async move {
            let name = task.name();
            let ctx = Context {
                task_name: name,
                shutdown,
            };
            if let Err(e) = task.run(ctx).await {
                tracing::error!(task = name, error = %e, "Task failed");
            }
            tracing::info!(task = name, "Task stopped");
        });
        self.tasks.write().unwrap().push(handle);
        self
    }

    /// Graceful shutdown - signal and wait for all tasks
    pub async fn shutdown(self) -> Result<()> {
        self.shutdown_tx.send(()).ok();

        for task in self.tasks.write().unwrap().drain(..) {
            task.await?;
        }

        Ok(())
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct TickingTask {
        counter: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl BackgroundTask for TickingTask {
        fn name(&self) -> &'static str {
            "ticking-task"
        }

        async fn run(&self, mut ctx: Context) -> Result<()> {
            let mut ticker = tokio::time::interval(Duration::from_millis(5));
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.counter.fetch_add(1, Ordering::SeqCst);
                    }
                    _ = ctx.shutdown.recv() => return Ok(()),
                }
            }
        }
    }

    #[tokio::test]
    async fn test_scheduler_runs_task() -> Result<()> {
        let scheduler = Scheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));

        scheduler.register(Arc::new(TickingTask {
            counter: counter.clone(),
        }));

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(counter.load(Ordering::SeqCst) > 0);

        scheduler.shutdown().await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_scheduler_graceful_shutdown() -> Result<()> {
        let scheduler = Scheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));

        scheduler.register(Arc::new(TickingTask {
            counter: counter.clone(),
        }));

        tokio::time::sleep(Duration::from_millis(20)).await;
        scheduler.shutdown().await?;

        let count_after_shutdown = counter.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Should not have increased after shutdown
        assert_eq!(counter.load(Ordering::SeqCst), count_after_shutdown);
        Ok(())
    }
}
