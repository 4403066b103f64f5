// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use std::sync::OnceLock;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub const REPORTS_INGESTED: &str = "tamperseal_reports_ingested_total";
pub const ANCHORS_COMMITTED: &str = "tamperseal_anchors_committed_total";
pub const LEDGER_FAILURES: &str = "tamperseal_ledger_failures_total";
pub const LEDGER_SUBMIT_SECONDS: &str = "tamperseal_ledger_submit_duration_seconds";
pub const BREACHES_DETECTED: &str = "tamperseal_breaches_detected_total";
pub const KNOWN_DEVICES: &str = "tamperseal_known_devices";

/// Installs the log subscriber and the Prometheus recorder. Call once at start-up.
pub fn init_telemetry() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "tamperseal_collector=debug,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            if PROM_HANDLE.set(handle).is_err() {
                tracing::warn!("Prometheus recorder installed twice; keeping the first handle");
            }
        }
        Err(e) => {
            tracing::error!("Failed to install Prometheus recorder: {}", e);
            return;
        }
    }

    metrics::describe_counter!(REPORTS_INGESTED, "Device reports accepted by the collector");
    metrics::describe_counter!(ANCHORS_COMMITTED, "Fingerprints committed to the ledger");
    metrics::describe_counter!(LEDGER_FAILURES, "Failed ledger submissions by kind");
    metrics::describe_histogram!(LEDGER_SUBMIT_SECONDS, "Time taken by one ledger submission");
    metrics::describe_counter!(BREACHES_DETECTED, "Fingerprint mismatches against committed values");
    metrics::describe_gauge!(KNOWN_DEVICES, "Devices known to the collector");

    metrics::gauge!("tamperseal_collector_up", 1.0);
}

/// Get the Prometheus handle to render metrics
pub fn get_metrics() -> String {
    if let Some(handle) = PROM_HANDLE.get() {
        handle.render()
    } else {
        "# metrics not initialized".to_string()
    }
}
