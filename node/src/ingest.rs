// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Device report ingestion.
//!
//! A report is validated in full before anything is stored, then applied to
//! the device under its lock. Slot verdicts are computed after the lock is
//! released, against the anchor store.

use chrono::NaiveDate;
use tamperseal_kernel::fingerprint::{is_hex, normalize};
use tamperseal_kernel::status::SecurityStatus;
use tracing::{debug, info, warn};

use crate::api::{DeviceReport, ReportResponse, SlotFinding, SlotVerdict};
use crate::config::CollectorConfig;
use crate::errors::CollectorError;
use crate::security::assess_slot;
use crate::store::{CollectorStore, DeviceState, SlotKey, SlotState};
use crate::telemetry;

pub const MAX_DEVICE_ID_LEN: usize = 128;
/// Upper bound on a fingerprint, in hex characters.
pub const MAX_FINGERPRINT_LEN: usize = 256;

#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub response: ReportResponse,
    /// First report ever seen from this device.
    pub created: bool,
    /// A legacy commit is due now.
    pub commit_due: bool,
}

pub fn validate(report: &DeviceReport) -> Result<(), CollectorError> {
    let id = report.device_id.trim();
    if id.is_empty() {
        return Err(CollectorError::Validation("device_id is required".into()));
    }
    if id.len() > MAX_DEVICE_ID_LEN {
        return Err(CollectorError::Validation("device_id is too long".into()));
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'))
    {
        return Err(CollectorError::Validation(format!(
            "device_id '{}' has invalid characters",
            id
        )));
    }

    let slots = report.slots.as_deref().unwrap_or_default();
    if report.fingerprint.is_none() && slots.is_empty() {
        return Err(CollectorError::Validation(
            "report carries neither a fingerprint nor slots".into(),
        ));
    }

    if let Some(fp) = &report.fingerprint {
        check_fingerprint("fingerprint", fp)?;
    }

    for slot in slots {
        check_fingerprint("slot_hash", &slot.slot_hash)?;
        if NaiveDate::parse_from_str(&slot.date, "%Y-%m-%d").is_err() {
            return Err(CollectorError::Validation(format!(
                "slot {} has invalid date '{}'",
                slot.slot_id, slot.date
            )));
        }
    }

    Ok(())
}

fn check_fingerprint(field: &str, value: &str) -> Result<(), CollectorError> {
    let value = value.trim();
    if !is_hex(value) || value.len() % 2 != 0 {
        return Err(CollectorError::Validation(format!("{} must be even-length hex", field)));
    }
    if value.len() > MAX_FINGERPRINT_LEN {
        return Err(CollectorError::Validation(format!("{} is too long", field)));
    }
    Ok(())
}

/// Records a slot claim. `slot_hash` is frozen once the slot is finalized;
/// later claims only move `reported_hash`.
fn apply_slot(device: &mut DeviceState, key: SlotKey, hash: String, finalized: bool, now: u64) -> SlotState {
    let slot = device.slots.entry(key.clone()).or_insert_with(|| SlotState {
        key,
        slot_hash: hash.clone(),
        reported_hash: hash.clone(),
        finalized: false,
        first_seen_at: now,
        finalized_at: None,
    });

    if !slot.finalized {
        slot.slot_hash = hash.clone();
    }
    slot.reported_hash = hash;
    if finalized && !slot.finalized {
        slot.finalized = true;
        slot.finalized_at = Some(now);
    }
    slot.clone()
}

pub async fn ingest_report(
    store: &CollectorStore,
    config: &CollectorConfig,
    report: DeviceReport,
    now: u64,
) -> Result<IngestOutcome, CollectorError> {
    validate(&report)?;

    let device_id = report.device_id.trim().to_string();
    let metadata = report.metadata();
    let fingerprint = report.fingerprint.as_deref().map(normalize);
    let has_fingerprint = fingerprint.is_some();
    let slot_reports = report.slots;
    let has_slots = slot_reports.is_some();
    let interval = config.anchor_interval_secs;

    let ((finalized, next_commit_in, commit_due), created) = store
        .devices
        .upsert(&device_id, |device| {
            device.metadata.merge(metadata);
            device.last_report_at = Some(now);
            if let Some(fp) = fingerprint {
                device.current_fingerprint = Some(fp);
            }

            let mut finalized = Vec::new();
            for slot in slot_reports.unwrap_or_default() {
                let key = SlotKey::new(slot.date, slot.slot_id);
                let state = apply_slot(device, key, normalize(&slot.slot_hash), slot.finalized, now);
                if state.finalized {
                    finalized.push(state);
                }
            }

            (
                finalized,
                has_fingerprint.then(|| device.next_commit_in(now, interval)),
                has_fingerprint && device.commit_due(now, interval),
            )
        })
        .await;

    metrics::counter!(telemetry::REPORTS_INGESTED, 1);
    if created {
        info!(device_id = %device_id, "New device registered");
    }

    let slots = has_slots.then(|| slot_verdict(store, &device_id, &finalized));
    if let Some(verdict) = &slots {
        if verdict.breach_detected {
            metrics::counter!(
                telemetry::BREACHES_DETECTED,
                verdict.compromised_slots.len() as u64,
                "protocol" => "slot"
            );
            for finding in &verdict.compromised_slots {
                warn!(
                    device_id = %device_id,
                    date = %finding.date,
                    slot_id = finding.slot_id,
                    expected = %finding.expected_hash,
                    reported = %finding.reported_hash,
                    "Slot fingerprint changed after finalization"
                );
            }
        }
    }

    debug!(device_id = %device_id, slots = finalized.len(), commit_due, "Report ingested");

    Ok(IngestOutcome {
        response: ReportResponse {
            status: "received",
            timestamp: now,
            next_commit_in,
            slots,
        },
        created,
        commit_due,
    })
}

fn slot_verdict(store: &CollectorStore, device_id: &str, finalized: &[SlotState]) -> SlotVerdict {
    let mut verdict = SlotVerdict {
        breach_detected: false,
        compromised_slots: Vec::new(),
        secure_slots: Vec::new(),
        pending_slots: Vec::new(),
    };

    for slot in finalized {
        let view = assess_slot(device_id, slot, &store.anchors);
        match view.status {
            SecurityStatus::Breach => verdict.compromised_slots.push(SlotFinding {
                slot_id: slot.key.slot_id,
                date: slot.key.date.clone(),
                reported_hash: slot.reported_hash.clone(),
                expected_hash: view.anchored_hash.unwrap_or_else(|| slot.slot_hash.clone()),
                ledger_txid: view.ledger_txid,
            }),
            SecurityStatus::Secure => verdict.secure_slots.push(slot.key.clone()),
            SecurityStatus::Pending | SecurityStatus::NoData => verdict.pending_slots.push(slot.key.clone()),
        }
    }

    verdict.breach_detected = !verdict.compromised_slots.is_empty();
    verdict
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::SlotReport;

    fn slot(id: u32, hash: &str, finalized: bool) -> SlotReport {
        SlotReport {
            slot_id: id,
            date: "2025-06-01".into(),
            slot_hash: hash.into(),
            finalized,
        }
    }

    #[test]
    fn test_validation_rejects_bad_reports() {
        let empty = DeviceReport {
            device_id: "r1".into(),
            ..Default::default()
        };
        assert!(validate(&empty).is_err());

        let bad_id = DeviceReport {
            device_id: "r 1".into(),
            fingerprint: Some("aa".into()),
            ..Default::default()
        };
        assert!(validate(&bad_id).is_err());

        let odd_hex = DeviceReport {
            device_id: "r1".into(),
            fingerprint: Some("abc".into()),
            ..Default::default()
        };
        assert!(validate(&odd_hex).is_err());

        let bad_date = DeviceReport {
            device_id: "r1".into(),
            slots: Some(vec![SlotReport {
                date: "06/01/2025".into(),
                ..slot(1, "aa", true)
            }]),
            ..Default::default()
        };
        assert!(validate(&bad_date).is_err());
    }

    #[tokio::test]
    async fn test_finalized_slot_hash_is_frozen() {
        let store = CollectorStore::new();
        let cfg = CollectorConfig::default();
        let report = |hash: &str, fin: bool| DeviceReport {
            device_id: "r1".into(),
            slots: Some(vec![slot(3, hash, fin)]),
            ..Default::default()
        };

        ingest_report(&store, &cfg, report("a1", false), 10).await.unwrap();
        ingest_report(&store, &cfg, report("a2", true), 20).await.unwrap();
        let out = ingest_report(&store, &cfg, report("ff", true), 30).await.unwrap();

        let device = store.devices.snapshot_of("r1").await.unwrap();
        let state = &device.slots[&SlotKey::new("2025-06-01", 3)];
        assert_eq!(state.slot_hash, "a2");
        assert_eq!(state.reported_hash, "ff");
        assert_eq!(state.finalized_at, Some(20));

        let verdict = out.response.slots.unwrap();
        assert!(verdict.breach_detected);
        assert_eq!(verdict.compromised_slots[0].expected_hash, "a2");
    }

    #[tokio::test]
    async fn test_legacy_report_schedules_bootstrap() {
        let store = CollectorStore::new();
        let cfg = CollectorConfig::default();
        let out = ingest_report(
            &store,
            &cfg,
            DeviceReport {
                device_id: "r1".into(),
                fingerprint: Some("ABCD".into()),
                name: Some("edge".into()),
                ..Default::default()
            },
            100,
        )
        .await
        .unwrap();

        assert!(out.created);
        assert!(out.commit_due);
        assert_eq!(out.response.next_commit_in, Some(0));
        assert!(out.response.slots.is_none());

        let device = store.devices.snapshot_of("r1").await.unwrap();
        assert_eq!(device.current_fingerprint.as_deref(), Some("abcd"));
        assert_eq!(device.metadata.name.as_deref(), Some("edge"));
    }
}
