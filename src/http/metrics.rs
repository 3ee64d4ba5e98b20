//! Per-endpoint request counters and the `/stats` document.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::error::Result;
use crate::http::AppState;
use crate::metrics::TimerMetrics;
use crate::scheduler::{BackgroundTask, Context};

/// How often the metrics task logs a counters snapshot.
const METRICS_LOG_INTERVAL: Duration = Duration::from_secs(60);

/// Counters and latency samples for one endpoint.
pub struct EndpointMetrics {
    pub requests: AtomicU64,
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub timing: TimerMetrics,
}

impl EndpointMetrics {
    fn new() -> Self {
        Self {
            requests: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            timing: TimerMetrics::new(),
        }
    }
}

/// All counters exposed via `/stats`. Reads are eventually consistent
/// with concurrent increments; no exact snapshotting.
pub struct HttpMetrics {
    pub total_requests: AtomicU64,
    pub get: EndpointMetrics,
    pub mget: EndpointMetrics,
    pub fwmatch: EndpointMetrics,
    pub range: EndpointMetrics,
}

impl HttpMetrics {
    pub fn new() -> Self {
        Self {
            total_requests: AtomicU64::new(0),
            get: EndpointMetrics::new(),
            mget: EndpointMetrics::new(),
            fwmatch: EndpointMetrics::new(),
            range: EndpointMetrics::new(),
        }
    }

    pub fn snapshot(&self, total_seeks: u64, db_size: i64, db_mtime: i64) -> StatsResponse {
        let get = self.get.timing.stats();
        let mget = self.mget.timing.stats();
        let fwmatch = self.fwmatch.timing.stats();
        let range = self.range.timing.stats();
        StatsResponse {
            total_requests: self.total_requests.load(Ordering::SeqCst),
            total_seeks,
            get_requests: self.get.requests.load(Ordering::SeqCst),
            get_hits: self.get.hits.load(Ordering::SeqCst),
            get_misses: self.get.misses.load(Ordering::SeqCst),
            get_average_request: get.avg.as_micros() as u64,
            get_p95: get.p95.as_micros() as u64,
            get_p99: get.p99.as_micros() as u64,
            mget_requests: self.mget.requests.load(Ordering::SeqCst),
            mget_hits: self.mget.hits.load(Ordering::SeqCst),
            mget_misses: self.mget.misses.load(Ordering::SeqCst),
            mget_average_request: mget.avg.as_micros() as u64,
            mget_p95: mget.p95.as_micros() as u64,
            mget_p99: mget.p99.as_micros() as u64,
            fwmatch_requests: self.fwmatch.requests.load(Ordering::SeqCst),
            fwmatch_hits: self.fwmatch.hits.load(Ordering::SeqCst),
            fwmatch_misses: self.fwmatch.misses.load(Ordering::SeqCst),
            fwmatch_average_request: fwmatch.avg.as_micros() as u64,
            fwmatch_p95: fwmatch.p95.as_micros() as u64,
            fwmatch_p99: fwmatch.p99.as_micros() as u64,
            range_requests: self.range.requests.load(Ordering::SeqCst),
            range_hits: self.range.hits.load(Ordering::SeqCst),
            range_misses: self.range.misses.load(Ordering::SeqCst),
            range_average_request: range.avg.as_micros() as u64,
            range_p95: range.p95.as_micros() as u64,
            range_p99: range.p99.as_micros() as u64,
            db_size,
            db_mtime,
        }
    }
}

impl Default for HttpMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// The `/stats` JSON document. Latency figures are microseconds.
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub total_requests: u64,
    pub total_seeks: u64,
    pub get_requests: u64,
    pub get_hits: u64,
    pub get_misses: u64,
    pub get_average_request: u64,
    #[serde(rename = "get_95")]
    pub get_p95: u64,
    #[serde(rename = "get_99")]
    pub get_p99: u64,
    pub mget_requests: u64,
    pub mget_hits: u64,
    pub mget_misses: u64,
    pub mget_average_request: u64,
    #[serde(rename = "mget_95")]
    pub mget_p95: u64,
    #[serde(rename = "mget_99")]
    pub mget_p99: u64,
    pub fwmatch_requests: u64,
    pub fwmatch_hits: u64,
    pub fwmatch_misses: u64,
    pub fwmatch_average_request: u64,
    #[serde(rename = "fwmatch_95")]
    pub fwmatch_p95: u64,
    #[serde(rename = "fwmatch_99")]
    pub fwmatch_p99: u64,
    pub range_requests: u64,
    pub range_hits: u64,
    pub range_misses: u64,
    pub range_average_request: u64,
    #[serde(rename = "range_95")]
    pub range_p95: u64,
    #[serde(rename = "range_99")]
    pub range_p99: u64,
    pub db_size: i64,
    pub db_mtime: i64,
}

/// Periodically logs a counters snapshot so operators can follow request
/// and seek rates without polling `/stats`.
pub struct MetricsTask {
    state: Arc<AppState>,
    interval: Duration,
}

impl MetricsTask {
    pub fn new(state: Arc<AppState>) -> Self {
        Self::with_interval(state, METRICS_LOG_INTERVAL)
    }

    pub fn with_interval(state: Arc<AppState>, interval: Duration) -> Self {
        Self { state, interval }
    }
}

#[async_trait::async_trait]
impl BackgroundTask for MetricsTask {
    fn name(&self) -> &'static str {
        "metrics"
    }

    async fn run(&self, mut ctx: Context) -> Result<()> {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let (db_size, _) = self.state.db.info();
                    let metrics = &self.state.metrics;
                    tracing::info!(
                        total_requests = metrics.total_requests.load(Ordering::SeqCst),
                        total_seeks = self.state.db.seek_count(),
                        get_requests = metrics.get.requests.load(Ordering::SeqCst),
                        mget_requests = metrics.mget.requests.load(Ordering::SeqCst),
                        fwmatch_requests = metrics.fwmatch.requests.load(Ordering::SeqCst),
                        range_requests = metrics.range.requests.load(Ordering::SeqCst),
                        db_size,
                        "HTTP metrics"
                    );
                }
                _ = ctx.shutdown.recv() => return Ok(()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_field_names() {
        let metrics = HttpMetrics::new();
        metrics.total_requests.fetch_add(3, Ordering::SeqCst);
        metrics.get.requests.fetch_add(2, Ordering::SeqCst);
        metrics.get.hits.fetch_add(1, Ordering::SeqCst);
        metrics.get.misses.fetch_add(1, Ordering::SeqCst);
        metrics.get.timing.record(Duration::from_micros(10));

        let snapshot = metrics.snapshot(42, 1024, 1_700_000_000);
        let json = serde_json::to_value(&snapshot).expect("serialize stats");

        assert_eq!(json["total_requests"], 3);
        assert_eq!(json["total_seeks"], 42);
        assert_eq!(json["get_requests"], 2);
        assert_eq!(json["get_hits"], 1);
        assert_eq!(json["get_misses"], 1);
        assert_eq!(json["get_average_request"], 10);
        assert_eq!(json["get_95"], 10);
        assert_eq!(json["get_99"], 10);
        assert_eq!(json["mget_requests"], 0);
        assert_eq!(json["fwmatch_95"], 0);
        assert_eq!(json["range_99"], 0);
        assert_eq!(json["db_size"], 1024);
        assert_eq!(json["db_mtime"], 1_700_000_000i64);
    }

    #[tokio::test]
    async fn test_metrics_task_shuts_down() -> Result<()> {
        use crate::db::Db;
        use crate::reload::reload_channel;
        use crate::scheduler::Scheduler;
        use crate::tmpfs::NamedTempFile;

        let tmp = NamedTempFile::create(b"a\tone\n").expect("create temp file");
        let db = Arc::new(Db::open_path(tmp.path(), b'\t', false).expect("open"));
        let (reload_tx, _reload_rx) = reload_channel();
        let state = Arc::new(AppState {
            db,
            reload_tx,
            metrics: HttpMetrics::new(),
        });

        let scheduler = Scheduler::new();
        scheduler.register(Arc::new(MetricsTask::with_interval(
            state,
            Duration::from_millis(5),
        )));
        tokio::time::sleep(Duration::from_millis(20)).await;
        scheduler.shutdown().await
    }
}
