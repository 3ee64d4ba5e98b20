use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tokio::signal::unix::{signal, SignalKind};
use tracing_subscriber::EnvFilter;

use flatdb::config::Args;
use flatdb::db::{Db, DEFAULT_LINE_ENDING};
use flatdb::http::metrics::{HttpMetrics, MetricsTask};
use flatdb::http::{self, AppState};
use flatdb::reload::{self, ReloadTask, SignalTask};
use flatdb::scheduler::Scheduler;
use flatdb::Result;

#[tokio::main]
async fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(e) = run(args).await {
        tracing::error!(error = %e, "fatal");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let separator = args.separator_byte()?;
    let addr = args.listen_addr()?;

    let db = Arc::new(Db::new(separator, DEFAULT_LINE_ENDING, args.mlock));
    db.open(&args.db_file)?;

    let (reload_tx, reload_rx) = reload::reload_channel();

    let scheduler = Scheduler::new();
    scheduler.register(Arc::new(ReloadTask::new(db.clone(), reload_rx)));
    scheduler.register(Arc::new(SignalTask::new(reload_tx.clone())));

    let state = Arc::new(AppState {
        db: db.clone(),
        reload_tx,
        metrics: HttpMetrics::new(),
    });
    scheduler.register(Arc::new(MetricsTask::new(state.clone())));
    let app = http::router(state, args.enable_logging);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %addr, "HTTP listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    scheduler.shutdown().await?;
    db.close();
    Ok(())
}

/// Resolves when SIGINT or SIGTERM arrives; in-flight requests then drain
/// before the server returns.
async fn shutdown_signal() {
    let mut interrupt = signal(SignalKind::interrupt()).expect("register SIGINT handler");
    let mut terminate = signal(SignalKind::terminate()).expect("register SIGTERM handler");
    tokio::select! {
        _ = interrupt.recv() => {}
        _ = terminate.recv() => {}
    }
    tracing::info!("shutdown signal received");
}
