// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use axum::{
    extract::{Path, Query, Request, State},
    middleware::{from_fn_with_state, Next},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use axum_extra::TypedHeader;
use headers::authorization::{Authorization, Bearer};
use std::sync::Arc;
use tamperseal_kernel::status::connection_status;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api::*;
use crate::clock::unix_now;
use crate::config::CollectorConfig;
use crate::errors::CollectorError;
use crate::forensics;
use crate::ingest::ingest_report;
use crate::ledger::SharedLedger;
use crate::scheduler::{AnchorScheduler, CycleReport};
use crate::security::assess_device;
use crate::store::CollectorStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<CollectorStore>,
    pub ledger: SharedLedger,
    pub scheduler: Arc<AnchorScheduler>,
    pub config: Arc<CollectorConfig>,
}

async fn admin_guard(
    State(token): State<Arc<Option<String>>>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    req: Request,
    next: Next,
) -> Result<Response, CollectorError> {
    let Some(expected) = token.as_deref() else {
        return Err(CollectorError::AdminDisabled);
    };
    match bearer {
        Some(TypedHeader(Authorization(given))) if given.token() == expected => Ok(next.run(req).await),
        _ => {
            tracing::warn!("Rejected admin request with missing or wrong token");
            Err(CollectorError::Unauthorized)
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let admin_token = Arc::new(state.config.admin_token.clone());
    if admin_token.is_some() {
        tracing::info!("Admin API enabled: Bearer token required");
    } else {
        tracing::warn!("Admin API disabled: no token configured");
    }

    let admin = Router::new()
        .route("/v1/admin/reset", post(reset))
        .route("/v1/admin/anchor-cycle", post(run_anchor_cycle))
        .route_layer(from_fn_with_state(admin_token, admin_guard));

    Router::new()
        .route("/health", get(health))
        // Ingestion. `/anchor` is the path older firmware posts to.
        .route("/v1/report", post(report))
        .route("/anchor", post(report))
        // Devices
        .route("/v1/devices", get(list_devices))
        .route("/v1/devices/:device_id/security", get(device_security))
        .route("/v1/devices/:device_id/forensic", post(submit_forensic))
        .route("/v1/devices/:device_id/reports", get(device_reports))
        // Forensic reports
        .route("/v1/reports/:report_id", get(get_report))
        // Anchors
        .route("/v1/anchors", get(list_anchors))
        .route("/v1/anchors/:txid/verify", get(verify_anchor))
        // Observability
        .route("/metrics", get(metrics_handler))
        .merge(admin)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        ledger: state.ledger.name().to_string(),
        devices: state.store.devices.len(),
        anchors: state.store.anchors.len(),
        last_cycle: state.scheduler.last_cycle(),
        timestamp: unix_now(),
    })
}

async fn report(
    State(state): State<AppState>,
    Json(req): Json<DeviceReport>,
) -> Result<Json<ReportResponse>, CollectorError> {
    let outcome = ingest_report(&state.store, &state.config, req, unix_now()).await?;
    // A new device gets its bootstrap commit without waiting a full period.
    if outcome.created {
        state.scheduler.kick();
    }
    Ok(Json(outcome.response))
}

async fn list_devices(State(state): State<AppState>) -> Json<DevicesResponse> {
    let now = unix_now();
    let devices: Vec<DeviceSummary> = state
        .store
        .devices
        .all()
        .await
        .into_iter()
        .map(|d| {
            let security = assess_device(&d, &state.store.anchors);
            DeviceSummary {
                connection: connection_status(d.last_report_at, now, state.config.connection),
                last_seen: d.last_report_at,
                seconds_ago: d.last_report_at.map(|t| now.saturating_sub(t)),
                security: security.overall,
                anchor_count: state.store.anchors.count_for(&d.device_id),
                finalized_slots: d.finalized_slots().count(),
                current_fingerprint: d.current_fingerprint,
                committed_fingerprint: d.committed_fingerprint,
                last_commit_at: d.last_commit_at,
                last_txid: d.last_txid,
                metadata: d.metadata,
                device_id: d.device_id,
            }
        })
        .collect();

    Json(DevicesResponse {
        total: devices.len(),
        devices,
        timestamp: now,
    })
}

async fn device_security(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> Result<Json<SecurityResponse>, CollectorError> {
    let device = state
        .store
        .devices
        .snapshot_of(&device_id)
        .await
        .ok_or_else(|| CollectorError::NotFound(format!("device '{}'", device_id)))?;
    let security = assess_device(&device, &state.store.anchors);
    let last_anchor = state.store.anchors.last_for(&device_id);

    Ok(Json(SecurityResponse {
        device_id,
        status: security.overall,
        local_hash: security.legacy.local,
        blockchain_hash: security.legacy.committed,
        matches: security.legacy.matches,
        last_anchor_time: last_anchor.as_ref().map(|a| a.committed_at),
        ledger_txid: last_anchor.map(|a| a.ledger_txid),
        slots: security.slots,
    }))
}

async fn submit_forensic(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    Json(req): Json<ForensicRequest>,
) -> Result<Json<ForensicResponse>, CollectorError> {
    let params = forensics::window_params(req.context, req.tail);
    let response = forensics::submit_history(&state.store, &device_id, req.blocks, params, unix_now()).await?;
    Ok(Json(response))
}

async fn device_reports(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> Result<Json<Vec<ReportListing>>, CollectorError> {
    Ok(Json(forensics::list_reports(&state.store, &device_id)?))
}

async fn get_report(
    State(state): State<AppState>,
    Path(report_id): Path<String>,
    Query(query): Query<WindowQuery>,
) -> Result<Json<ForensicResponse>, CollectorError> {
    let params = forensics::window_params(query.context, query.tail);
    Ok(Json(forensics::load_report(&state.store, &report_id, params).await?))
}

async fn list_anchors(
    State(state): State<AppState>,
    Query(query): Query<AnchorsQuery>,
) -> Json<AnchorsResponse> {
    let limit = query.limit.unwrap_or(DEFAULT_ANCHOR_LIMIT).min(MAX_ANCHOR_LIMIT);
    let anchors = state.store.anchors.recent(query.device_id.as_deref(), limit);
    Json(AnchorsResponse {
        total: anchors.len(),
        anchors,
    })
}

async fn verify_anchor(
    State(state): State<AppState>,
    Path(txid): Path<String>,
) -> Result<Json<AnchorVerification>, CollectorError> {
    let record = state
        .store
        .anchors
        .by_txid(&txid)
        .ok_or_else(|| CollectorError::NotFound(format!("anchor '{}'", txid)))?;

    let timeout = std::time::Duration::from_secs(state.config.ledger_timeout_secs);
    let on_ledger = tokio::time::timeout(timeout, state.ledger.read(&txid))
        .await
        .map_err(|_| CollectorError::LedgerSubmission("ledger read timed out".into()))??;

    let verified = on_ledger
        .as_deref()
        .is_some_and(|fp| tamperseal_kernel::fingerprint::fingerprints_match(fp, &record.fingerprint));

    Ok(Json(AnchorVerification {
        ledger_txid: record.ledger_txid,
        device_id: record.device_id,
        recorded_fingerprint: record.fingerprint,
        ledger_fingerprint: on_ledger,
        verified,
    }))
}

async fn reset(State(state): State<AppState>) -> Result<Json<ResetResponse>, CollectorError> {
    Ok(Json(state.scheduler.reset_store(unix_now()).await?))
}

async fn run_anchor_cycle(State(state): State<AppState>) -> Json<CycleReport> {
    Json(state.scheduler.run_cycle(unix_now()).await)
}

async fn metrics_handler() -> String {
    crate::telemetry::get_metrics()
}
