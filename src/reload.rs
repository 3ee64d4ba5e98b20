//! Reload coordination.
//!
//! A hang-up signal and the `/reload` endpoint both funnel into one
//! bounded queue consumed by a single task, so concurrent reload requests
//! serialize into one remap at a time and duplicates coalesce.

use std::sync::Arc;

use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::{mpsc, Mutex};

use crate::db::Db;
use crate::error::Result;
use crate::scheduler::{BackgroundTask, Context};

/// Queue depth for pending reloads. Senders block once it fills.
const RELOAD_QUEUE_DEPTH: usize = 4;

pub fn reload_channel() -> (mpsc::Sender<()>, mpsc::Receiver<()>) {
    mpsc::channel(RELOAD_QUEUE_DEPTH)
}

/// Drains the reload queue and remaps the database.
///
/// A failed remap is fatal: the old snapshot is already gone by the time
/// the open fails, and exiting beats serving stale data.
pub struct ReloadTask {
    db: Arc<Db>,
    rx: Mutex<mpsc::Receiver<()>>,
}

impl ReloadTask {
    pub fn new(db: Arc<Db>, rx: mpsc::Receiver<()>) -> Self {
        Self {
            db,
            rx: Mutex::new(rx),
        }
    }
}

#[async_trait::async_trait]
impl BackgroundTask for ReloadTask {
    fn name(&self) -> &'static str {
        "reload"
    }

    async fn run(&self, mut ctx: Context) -> Result<()> {
        let mut rx = self.rx.lock().await;
        loop {
            tokio::select! {
                received = rx.recv() => {
                    if received.is_none() {
                        return Ok(());
                    }
                    if let Err(e) = self.db.remap() {
                        tracing::error!(error = %e, "DB remap failed");
                        std::process::exit(1);
                    }
                }
                _ = ctx.shutdown.recv() => return Ok(()),
            }
        }
    }
}

/// Forwards SIGHUP into the reload queue.
pub struct SignalTask {
    tx: mpsc::Sender<()>,
}

impl SignalTask {
    pub fn new(tx: mpsc::Sender<()>) -> Self {
        Self { tx }
    }
}

#[async_trait::async_trait]
impl BackgroundTask for SignalTask {
    fn name(&self) -> &'static str {
        "sighup"
    }

    async fn run(&self, mut ctx: Context) -> Result<()> {
        let mut hangup = signal(SignalKind::hangup())?;
        loop {
            tokio::select! {
                received = hangup.recv() => {
                    if received.is_none() {
                        return Ok(());
                    }
                    tracing::info!("SIGHUP received, scheduling reload");
                    if self.tx.send(()).await.is_err() {
                        return Ok(());
                    }
                }
                _ = ctx.shutdown.recv() => return Ok(()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{DEFAULT_LINE_ENDING, DEFAULT_RECORD_SEPARATOR};
    use crate::scheduler::Scheduler;
    use crate::tmpfs::NamedTempFile;
    use std::time::Duration;

    #[tokio::test]
    async fn test_reload_task_remaps() -> Result<()> {
        let tmp = NamedTempFile::create(b"a\tone\n").expect("create temp file");
        let db = Db::new(DEFAULT_RECORD_SEPARATOR, DEFAULT_LINE_ENDING, false);
        db.open(tmp.path()).expect("open");
        let db = Arc::new(db);

        let (tx, rx) = reload_channel();
        let scheduler = Scheduler::new();
        scheduler.register(Arc::new(ReloadTask::new(db.clone(), rx)));

        let seeks_before = {
            db.search(b"a");
            db.seek_count()
        };

        tx.send(()).await.expect("enqueue reload");
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Same file: identical results, seek counter preserved.
        assert_eq!(db.search(b"a"), Some(b"a\tone".to_vec()));
        assert!(db.seek_count() >= seeks_before);

        scheduler.shutdown().await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_pending_reloads_coalesce() -> Result<()> {
        let tmp = NamedTempFile::create(b"a\tone\n").expect("create temp file");
        let db = Arc::new(
            Db::open_path(tmp.path(), DEFAULT_RECORD_SEPARATOR, false).expect("open"),
        );

        let (tx, rx) = reload_channel();
        let scheduler = Scheduler::new();
        scheduler.register(Arc::new(ReloadTask::new(db.clone(), rx)));

        for _ in 0..10 {
            tx.send(()).await.expect("enqueue reload");
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(db.search(b"a"), Some(b"a\tone".to_vec()));

        scheduler.shutdown().await?;
        Ok(())
    }
}
