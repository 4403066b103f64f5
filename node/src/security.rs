// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Device-level security verdicts on top of the kernel decision table.

use tamperseal_kernel::fingerprint::fingerprints_match;
use tamperseal_kernel::status::{aggregate, evaluate, evaluate_pair, SecurityAssessment, SecurityStatus};

use crate::api::SlotStatusView;
use crate::store::{AnchorStore, DeviceState, SlotState};

#[derive(Debug, Clone)]
pub struct DeviceSecurity {
    pub overall: SecurityStatus,
    pub legacy: SecurityAssessment,
    pub slots: Vec<SlotStatusView>,
}

/// Verdict for one finalized slot.
///
/// Anchored: the latest claim must match the committed value. Not anchored
/// yet: a claim that drifted from the frozen value is already a breach.
pub fn assess_slot(device_id: &str, slot: &SlotState, anchors: &AnchorStore) -> SlotStatusView {
    let anchor = anchors.get_slot(device_id, &slot.key);
    let status = match &anchor {
        Some(record) => evaluate_pair(Some(&slot.reported_hash), Some(&record.fingerprint)).status,
        None if !fingerprints_match(&slot.reported_hash, &slot.slot_hash) => SecurityStatus::Breach,
        None => SecurityStatus::Pending,
    };

    SlotStatusView {
        slot_id: slot.key.slot_id,
        date: slot.key.date.clone(),
        status,
        reported_hash: slot.reported_hash.clone(),
        anchored_hash: anchor.as_ref().map(|r| r.fingerprint.clone()),
        ledger_txid: anchor.map(|r| r.ledger_txid),
    }
}

pub fn assess_device(device: &DeviceState, anchors: &AnchorStore) -> DeviceSecurity {
    let legacy = evaluate(device);
    let slots: Vec<SlotStatusView> = device
        .finalized_slots()
        .map(|slot| assess_slot(&device.device_id, slot, anchors))
        .collect();

    let legacy_status = device.uses_legacy().then_some(legacy.status);
    let overall = aggregate(slots.iter().map(|s| s.status).chain(legacy_status));

    DeviceSecurity {
        overall,
        legacy,
        slots,
    }
}
