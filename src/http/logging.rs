//! Per-request access logging, Common Log Format plus a trailing request
//! duration in seconds. Lines go to stdout, not through tracing.

use std::net::SocketAddr;
use std::time::Instant;

use axum::body::HttpBody;
use axum::extract::{ConnectInfo, Request};
use axum::http::header::USER_AGENT;
use axum::middleware::Next;
use axum::response::Response;

pub async fn access_log(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let timestamp = chrono::Local::now();

    let host = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip().to_string())
        .unwrap_or_else(|| "-".to_string());
    let method = req.method().to_string();
    let uri = req.uri().to_string();
    let proto = format!("{:?}", req.version());
    let user_agent = req
        .headers()
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    let response = next.run(req).await;

    let size = response.body().size_hint().exact().unwrap_or(0);
    let line = log_line(
        &host,
        &timestamp.format("%d/%b/%Y:%H:%M:%S %z").to_string(),
        &method,
        &uri,
        &proto,
        response.status().as_u16(),
        size,
        &user_agent,
        start.elapsed().as_secs_f64(),
    );
    println!("{line}");
    response
}

#[allow(clippy::too_many_arguments)]
fn log_line(
    host: &str,
    timestamp: &str,
    method: &str,
    uri: &str,
    proto: &str,
    status: u16,
    size: u64,
    user_agent: &str,
    seconds: f64,
) -> String {
    format!(
        "{host} - - [{timestamp}] \"{method} {uri} {proto}\" {status} {size} \"{user_agent}\" {seconds:.3}"
    )
}
