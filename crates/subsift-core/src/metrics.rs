//! Prometheus metrics helpers for subsift.
//!
//! # Usage
//!
//! ```rust,ignore
//! use subsift_core::metrics::{init_metrics, start_metrics_server};
//!
//! #[tokio::main]
//! async fn main() {
//!     let handle = init_metrics();
//!     start_metrics_server(9091, handle).await.unwrap();
//!
//!     metrics::counter!("subsift_records_total").increment(1);
//! }
//! ```
//!
//! # Metric Naming Conventions
//!
//! - Prefix: `subsift_`
//! - Suffix: unit or type (`_total`, `_bytes`)
//! - Labels: `category` on match counters, `type` on byte counters

use axum::{Router, routing::get};
use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;

/// Initialize the Prometheus metrics recorder.
///
/// # Panics
///
/// Panics if a recorder is already installed.
pub fn init_metrics() -> PrometheusHandle {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus recorder");

    register_metrics();

    handle
}

/// Like [`init_metrics`] but returns `None` if a recorder is already installed.
pub fn try_init_metrics() -> Option<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder().ok()?;
    register_metrics();
    Some(handle)
}

/// Serve `/metrics` on `port` from a background task.
pub async fn start_metrics_server(
    port: u16,
    handle: PrometheusHandle,
) -> Result<(), std::io::Error> {
    let app = Router::new().route(
        "/metrics",
        get(move || {
            let handle = handle.clone();
            async move { handle.render() }
        }),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Metrics server listening on http://{}/metrics", addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::warn!("Metrics server stopped: {}", e);
        }
    });

    Ok(())
}

fn register_metrics() {
    describe_counter!(
        "subsift_records_total",
        "Non-blank records read from source files"
    );
    describe_counter!(
        "subsift_records_matched_total",
        "Records routed to a category sink (label: category)"
    );
    describe_counter!(
        "subsift_records_invalid_total",
        "Records skipped because they failed to parse or lacked the discriminator"
    );
    describe_counter!(
        "subsift_files_total",
        "Source files streamed to completion"
    );
    describe_counter!(
        "subsift_files_failed_total",
        "Source files abandoned after a framing or I/O error"
    );
    describe_counter!(
        "subsift_bytes_total",
        "Bytes consumed from source files (label: type)"
    );
    describe_gauge!(
        "subsift_running",
        "Whether an extraction run is in progress (1=yes, 0=no)"
    );
}

/// Record a byte total with a `type` label.
pub fn record_bytes(byte_type: &'static str, bytes: u64) {
    metrics::counter!("subsift_bytes_total", "type" => byte_type).increment(bytes);
}

/// Set a gauge value.
#[inline]
pub fn set_gauge(name: &'static str, value: f64) {
    metrics::gauge!(name).set(value);
}
