//! Prometheus export for client metrics.
//!
//! The core records through the `metrics` facade; this installs the
//! recorder and its HTTP listener.

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// Start the Prometheus metrics listener on localhost.
///
/// # Errors
///
/// Returns an error if the recorder cannot be installed.
pub fn start_metrics_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = format!("127.0.0.1:{}", port).parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    wayfarer_core::metrics::describe();

    info!("Metrics server listening on {}", addr);
    Ok(())
}
