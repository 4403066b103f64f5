// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Forensic audit of submitted block histories.
//!
//! Verification always runs on the request's own copy of the blocks (or the
//! stored copy), never on data that ingestion can mutate underneath it.

use tamperseal_kernel::forensic::{report_id, verify_with, BreachSummary, WindowParams};
use tamperseal_kernel::Block;
use tracing::{info, warn};

use crate::api::{ForensicResponse, ReportListing};
use crate::errors::CollectorError;
use crate::store::{CollectorStore, StoredHistory};

/// Upper bound on blocks accepted in one submission.
pub const MAX_HISTORY_BLOCKS: usize = 100_000;

pub fn window_params(context: Option<usize>, tail: Option<usize>) -> WindowParams {
    let defaults = WindowParams::default();
    WindowParams {
        context: context.unwrap_or(defaults.context),
        tail: tail.unwrap_or(defaults.tail),
    }
}

async fn build_response(
    store: &CollectorStore,
    history: &StoredHistory,
    params: WindowParams,
) -> ForensicResponse {
    let report = verify_with(&history.blocks, params);
    let device = store.devices.snapshot_of(&history.device_id).await;
    let breach = BreachSummary::new(
        history.report_id.clone(),
        &report,
        device.as_ref().and_then(|d| d.current_fingerprint.clone()),
        device.and_then(|d| d.committed_fingerprint),
    );

    ForensicResponse {
        report_id: history.report_id.clone(),
        device_id: history.device_id.clone(),
        received_at: history.received_at,
        report,
        breach,
    }
}

/// Stores and analyses a history submitted for a known device.
pub async fn submit_history(
    store: &CollectorStore,
    device_id: &str,
    blocks: Vec<Block>,
    params: WindowParams,
    now: u64,
) -> Result<ForensicResponse, CollectorError> {
    if store.devices.get(device_id).is_none() {
        return Err(CollectorError::NotFound(format!("device '{}'", device_id)));
    }
    if blocks.len() > MAX_HISTORY_BLOCKS {
        return Err(CollectorError::Validation(format!(
            "history has {} blocks, limit is {}",
            blocks.len(),
            MAX_HISTORY_BLOCKS
        )));
    }

    let history = StoredHistory {
        report_id: report_id(device_id, &blocks),
        device_id: device_id.to_string(),
        received_at: now,
        blocks,
    };
    let response = build_response(store, &history, params).await;
    store.reports.insert(history);

    match response.report.first_break_index {
        Some(index) => {
            warn!(
                device_id = %device_id,
                report_id = %response.report_id,
                first_break = index,
                affected = response.report.affected_block_count,
                anomalies = response.report.anomalies.len(),
                "Chain break found in submitted history"
            );
            metrics::counter!(crate::telemetry::BREACHES_DETECTED, 1, "protocol" => "chain");
        }
        None => info!(
            device_id = %device_id,
            report_id = %response.report_id,
            blocks = response.report.total_blocks,
            "Submitted history is intact"
        ),
    }

    Ok(response)
}

/// Re-analyses a stored history, possibly with a different window.
pub async fn load_report(
    store: &CollectorStore,
    report_id: &str,
    params: WindowParams,
) -> Result<ForensicResponse, CollectorError> {
    let history = store
        .reports
        .get(report_id)
        .ok_or_else(|| CollectorError::NotFound(format!("report '{}'", report_id)))?;
    Ok(build_response(store, &history, params).await)
}

pub fn list_reports(store: &CollectorStore, device_id: &str) -> Result<Vec<ReportListing>, CollectorError> {
    if store.devices.get(device_id).is_none() {
        return Err(CollectorError::NotFound(format!("device '{}'", device_id)));
    }
    Ok(store
        .reports
        .ids_for_device(device_id)
        .into_iter()
        .map(|(report_id, received_at)| ReportListing {
            report_id,
            received_at,
        })
        .collect())
}
