// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use serde::{Deserialize, Serialize};
use tamperseal_kernel::forensic::{BreachSummary, ForensicReport};
use tamperseal_kernel::status::{ConnectionStatus, SecurityStatus};
use tamperseal_kernel::Block;

use crate::scheduler::CycleReport;
use crate::store::{AnchorRecord, DeviceMetadata, SlotKey};

// --- Ingestion ---

/// Periodic report from a device. Older firmware uses the `router_*` names.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeviceReport {
    #[serde(alias = "router_id")]
    pub device_id: String,
    /// Rolling fingerprint (legacy protocol).
    #[serde(default, alias = "hash")]
    pub fingerprint: Option<String>,
    /// Per-slot fingerprints (slot protocol).
    #[serde(default)]
    pub slots: Option<Vec<SlotReport>>,
    #[serde(default, alias = "router_name")]
    pub name: Option<String>,
    #[serde(default, alias = "router_ip")]
    pub ip: Option<String>,
    #[serde(default)]
    pub local_ip: Option<String>,
    #[serde(default, alias = "router_mac")]
    pub mac_address: Option<String>,
    #[serde(default)]
    pub hash_interval: Option<u64>,
    #[serde(default)]
    pub block_interval: Option<u64>,
    #[serde(default)]
    pub retention_days: Option<u64>,
    #[serde(default)]
    pub total_blocks: Option<u64>,
}

impl DeviceReport {
    pub fn metadata(&self) -> DeviceMetadata {
        DeviceMetadata {
            name: self.name.clone(),
            ip: self.ip.clone(),
            local_ip: self.local_ip.clone(),
            mac_address: self.mac_address.clone(),
            hash_interval: self.hash_interval,
            block_interval: self.block_interval,
            retention_days: self.retention_days,
            total_blocks: self.total_blocks,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SlotReport {
    pub slot_id: u32,
    pub date: String,
    pub slot_hash: String,
    #[serde(default)]
    pub finalized: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SlotFinding {
    pub slot_id: u32,
    pub date: String,
    pub reported_hash: String,
    /// Anchored value, or the frozen one while the anchor is pending.
    pub expected_hash: String,
    pub ledger_txid: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SlotVerdict {
    pub breach_detected: bool,
    pub compromised_slots: Vec<SlotFinding>,
    pub secure_slots: Vec<SlotKey>,
    pub pending_slots: Vec<SlotKey>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportResponse {
    pub status: &'static str,
    pub timestamp: u64,
    /// Present for legacy reports.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_commit_in: Option<u64>,
    /// Present for slot reports.
    #[serde(flatten)]
    pub slots: Option<SlotVerdict>,
}

// --- Devices ---

#[derive(Debug, Clone, Serialize)]
pub struct DeviceSummary {
    pub device_id: String,
    #[serde(flatten)]
    pub metadata: DeviceMetadata,
    pub connection: ConnectionStatus,
    pub last_seen: Option<u64>,
    pub seconds_ago: Option<u64>,
    pub security: SecurityStatus,
    pub current_fingerprint: Option<String>,
    pub committed_fingerprint: Option<String>,
    pub last_commit_at: Option<u64>,
    pub last_txid: Option<String>,
    pub anchor_count: usize,
    pub finalized_slots: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DevicesResponse {
    pub devices: Vec<DeviceSummary>,
    pub total: usize,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SlotStatusView {
    pub slot_id: u32,
    pub date: String,
    pub status: SecurityStatus,
    pub reported_hash: String,
    pub anchored_hash: Option<String>,
    pub ledger_txid: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SecurityResponse {
    pub device_id: String,
    pub status: SecurityStatus,
    pub local_hash: Option<String>,
    pub blockchain_hash: Option<String>,
    #[serde(rename = "match")]
    pub matches: bool,
    pub last_anchor_time: Option<u64>,
    pub ledger_txid: Option<String>,
    pub slots: Vec<SlotStatusView>,
}

// --- Anchors ---

pub const DEFAULT_ANCHOR_LIMIT: usize = 20;
pub const MAX_ANCHOR_LIMIT: usize = 500;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnchorsQuery {
    pub device_id: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnchorsResponse {
    pub anchors: Vec<AnchorRecord>,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnchorVerification {
    pub ledger_txid: String,
    pub device_id: String,
    pub recorded_fingerprint: String,
    pub ledger_fingerprint: Option<String>,
    pub verified: bool,
}

// --- Forensics ---

#[derive(Debug, Clone, Deserialize)]
pub struct ForensicRequest {
    pub blocks: Vec<Block>,
    #[serde(default)]
    pub context: Option<usize>,
    #[serde(default)]
    pub tail: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WindowQuery {
    pub context: Option<usize>,
    pub tail: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ForensicResponse {
    pub report_id: String,
    pub device_id: String,
    pub received_at: u64,
    pub report: ForensicReport,
    pub breach: BreachSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportListing {
    pub report_id: String,
    pub received_at: u64,
}

// --- Admin ---

#[derive(Debug, Clone, Serialize)]
pub struct ResetResponse {
    pub status: &'static str,
    pub backup: Option<String>,
    pub cleared_devices: usize,
    pub cleared_anchors: usize,
    pub cleared_reports: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub ledger: String,
    pub devices: usize,
    pub anchors: usize,
    pub last_cycle: Option<CycleReport>,
    pub timestamp: u64,
}
