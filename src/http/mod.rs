//! The HTTP request surface.
//!
//! A fixed dispatch table on the request path: `/ping`, `/get`, `/mget`,
//! `/fwmatch`, `/range`, `/reload`, `/stats`. Unknown paths 404. Keys
//! arrive as percent-encoded query parameters and are decoded to raw
//! bytes, so queries are 8-bit clean end to end.

pub mod logging;
pub mod metrics;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::http::{header, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{middleware, Router};
use tokio::sync::mpsc;

use crate::db::Db;
use crate::http::metrics::HttpMetrics;

/// Shared state for all handlers.
pub struct AppState {
    pub db: Arc<Db>,
    pub reload_tx: mpsc::Sender<()>,
    pub metrics: HttpMetrics,
}

pub fn router(state: Arc<AppState>, enable_logging: bool) -> Router {
    let mut router = Router::new()
        .route("/ping", get(ping))
        .route("/get", get(get_key))
        .route("/mget", get(mget))
        .route("/fwmatch", get(fwmatch))
        .route("/range", get(range))
        .route("/reload", get(reload).post(reload))
        .route("/stats", get(stats))
        .fallback(not_found)
        .with_state(state);
    if enable_logging {
        router = router.layer(middleware::from_fn(logging::access_log));
    }
    router
}

async fn ping() -> &'static str {
    "OK"
}

async fn get_key(State(state): State<Arc<AppState>>, uri: Uri) -> Response {
    let Some(key) = query_value(uri.query(), "key") else {
        return bad_request("MISSING_ARG_KEY");
    };
    let start = Instant::now();
    state.metrics.total_requests.fetch_add(1, Ordering::SeqCst);
    let ep = &state.metrics.get;
    ep.requests.fetch_add(1, Ordering::SeqCst);

    let response = match state.db.search(&key) {
        Some(line) => {
            ep.hits.fetch_add(1, Ordering::SeqCst);
            // Only the value goes out: strip the needle and separator,
            // terminate with one line ending.
            let mut value = line[key.len() + 1..].to_vec();
            value.push(state.db.line_ending());
            plain_response(value)
        }
        None => {
            ep.misses.fetch_add(1, Ordering::SeqCst);
            miss_response()
        }
    };
    ep.timing.record(start.elapsed());
    response
}

async fn mget(State(state): State<Arc<AppState>>, uri: Uri) -> Response {
    let keys = query_values(uri.query(), "key");
    if keys.is_empty() {
        return bad_request("MISSING_ARG_KEY");
    }
    let start = Instant::now();
    state.metrics.total_requests.fetch_add(1, Ordering::SeqCst);
    let ep = &state.metrics.mget;
    ep.requests.fetch_add(1, Ordering::SeqCst);

    let mut body = Vec::new();
    let mut found = 0usize;
    for key in &keys {
        if let Some(line) = state.db.search(key) {
            found += 1;
            body.extend_from_slice(&line);
            body.push(state.db.line_ending());
        }
    }
    if found == 0 {
        ep.misses.fetch_add(1, Ordering::SeqCst);
    } else {
        ep.hits.fetch_add(1, Ordering::SeqCst);
    }

    let response = plain_response(body);
    ep.timing.record(start.elapsed());
    response
}

async fn fwmatch(State(state): State<Arc<AppState>>, uri: Uri) -> Response {
    let Some(key) = query_value(uri.query(), "key") else {
        return bad_request("MISSING_ARG_KEY");
    };
    let start = Instant::now();
    state.metrics.total_requests.fetch_add(1, Ordering::SeqCst);
    let ep = &state.metrics.fwmatch;
    ep.requests.fetch_add(1, Ordering::SeqCst);

    let records = state.db.forward_match(&key);
    let response = if records.is_empty() {
        ep.misses.fetch_add(1, Ordering::SeqCst);
        miss_response()
    } else {
        ep.hits.fetch_add(1, Ordering::SeqCst);
        plain_response(records)
    };
    ep.timing.record(start.elapsed());
    response
}

async fn range(State(state): State<Arc<AppState>>, uri: Uri) -> Response {
    let Some(start_key) = query_value(uri.query(), "start") else {
        return bad_request("MISSING_ARG_START");
    };
    let Some(end_key) = query_value(uri.query(), "end") else {
        return bad_request("MISSING_ARG_END");
    };
    if end_key < start_key {
        return bad_request("MALFORMED_RANGE");
    }
    let start = Instant::now();
    state.metrics.total_requests.fetch_add(1, Ordering::SeqCst);
    let ep = &state.metrics.range;
    ep.requests.fetch_add(1, Ordering::SeqCst);

    let records = state.db.range_match(&start_key, Some(&end_key));
    let response = if records.is_empty() {
        ep.misses.fetch_add(1, Ordering::SeqCst);
        miss_response()
    } else {
        ep.hits.fetch_add(1, Ordering::SeqCst);
        plain_response(records)
    };
    ep.timing.record(start.elapsed());
    response
}

async fn reload(State(state): State<Arc<AppState>>) -> &'static str {
    // Blocks if the queue is full; pending reloads coalesce.
    let _ = state.reload_tx.send(()).await;
    "OK"
}

async fn stats(State(state): State<Arc<AppState>>) -> Response {
    let (db_size, db_mtime) = state.db.info();
    let snapshot = state
        .metrics
        .snapshot(state.db.seek_count(), db_size, db_mtime);
    match serde_json::to_vec(&snapshot) {
        Ok(json) => (
            [(header::CONTENT_TYPE, "application/json; charset=utf-8")],
            json,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "stats serialization failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR\n").into_response()
        }
    }
}

async fn not_found(uri: Uri) -> Response {
    tracing::warn!(path = %uri.path(), "404");
    (StatusCode::NOT_FOUND, "404 page not found\n").into_response()
}

fn plain_response(body: Vec<u8>) -> Response {
    ([(header::CONTENT_TYPE, "text/plain")], body).into_response()
}

fn bad_request(token: &'static str) -> Response {
    (StatusCode::BAD_REQUEST, format!("{token}\n")).into_response()
}

fn miss_response() -> Response {
    (StatusCode::NOT_FOUND, "NOT_FOUND\n").into_response()
}

/// All values for the query parameter `name`, percent-decoded to raw
/// bytes with `+` treated as space. Empty values are dropped, matching
/// the original's missing-argument handling.
fn query_values(query: Option<&str>, name: &str) -> Vec<Vec<u8>> {
    let Some(query) = query else {
        return Vec::new();
    };
    let mut values = Vec::new();
    for pair in query.split('&') {
        if pair.is_empty() {
            continue;
        }
        let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
        if decode_component(k) == name.as_bytes() {
            let value = decode_component(v);
            if !value.is_empty() {
                values.push(value);
            }
        }
    }
    values
}

/// The first value for the query parameter `name`, if present and
/// non-empty.
fn query_value(query: Option<&str>, name: &str) -> Option<Vec<u8>> {
    query_values(query, name).into_iter().next()
}

fn decode_component(s: &str) -> Vec<u8> {
    // Map form-encoded '+' to space before percent-decoding so that an
    // encoded %2B still comes through as a literal plus.
    let mapped: Vec<u8> = s
        .bytes()
        .map(|b| if b == b'+' { b' ' } else { b })
        .collect();
    percent_encoding::percent_decode(&mapped).collect()
}
