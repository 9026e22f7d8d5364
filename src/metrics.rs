// src/metrics.rs
//! Prometheus exposition. The recorder installs once at boot; the pipeline
//! loops record through the `metrics` facade and the handle renders the
//! current snapshot on every `/metrics` scrape.

use axum::{routing::get, Router};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the process-wide recorder and return the `/metrics` router.
pub fn install() -> Router {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("prometheus: install recorder");
    Router::new().route(
        "/metrics",
        get(move || {
            let h = handle.clone();
            async move { h.render() }
        }),
    )
}
