// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Chain Integrity Check & Forensic Window
//!
//! # Purpose
//! - Localise the first broken link in a device's block chain
//! - Report every later break as a secondary anomaly
//! - Compute the blast radius (blocks at or after the first break)
//! - Select the slice of history worth showing to a human
//!
//! # Guarantees
//! - Single linear pass, no backtracking
//! - Never panics on malformed blocks
//! - Read-only over the input: safe on a shared snapshot

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use serde::{Deserialize, Serialize};

use crate::chain::Block;

/// Healthy blocks shown before the first break.
pub const DEFAULT_CONTEXT: usize = 2;
/// Recency sample shown for an intact chain.
pub const DEFAULT_TAIL: usize = 30;

/// One broken link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Anomaly {
    pub index: usize,
    /// `chain_hash` of the predecessor.
    pub expected: Option<String>,
    /// `prev_hash` found on this block.
    pub actual: Option<String>,
    pub timestamp: Option<u64>,
    /// Set on the earliest break only.
    pub primary: bool,
}

/// A block together with its position in the full history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowedBlock {
    pub index: usize,
    pub block: Block,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowParams {
    pub context: usize,
    pub tail: usize,
}

impl Default for WindowParams {
    fn default() -> Self {
        Self {
            context: DEFAULT_CONTEXT,
            tail: DEFAULT_TAIL,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForensicReport {
    pub total_blocks: usize,
    pub first_break_index: Option<usize>,
    pub anomalies: Vec<Anomaly>,
    pub affected_block_count: usize,
    pub display_window: Vec<WindowedBlock>,
}

impl ForensicReport {
    pub fn is_intact(&self) -> bool {
        self.first_break_index.is_none()
    }

    pub fn primary_anomaly(&self) -> Option<&Anomaly> {
        self.anomalies.iter().find(|a| a.primary)
    }
}

/// Verifies a chain with the default window parameters.
pub fn verify(blocks: &[Block]) -> ForensicReport {
    verify_with(blocks, WindowParams::default())
}

pub fn verify_with(blocks: &[Block], params: WindowParams) -> ForensicReport {
    let mut anomalies = Vec::new();
    let mut first_break_index = None;

    for i in 1..blocks.len() {
        let prev = &blocks[i - 1];
        let current = &blocks[i];
        if current.links_to(prev) {
            continue;
        }

        let primary = first_break_index.is_none();
        if primary {
            first_break_index = Some(i);
        }
        anomalies.push(Anomaly {
            index: i,
            expected: prev.chain_hash.clone(),
            actual: current.prev_hash.clone(),
            timestamp: current.timestamp,
            primary,
        });
    }

    let affected_block_count = first_break_index
        .map(|k| blocks.len() - k)
        .unwrap_or(0);

    let mut display_window = select_window(blocks, first_break_index, params.context, params.tail);
    // anomalies are pushed in index order
    for entry in display_window.iter_mut() {
        entry.block.is_broken = anomalies
            .binary_search_by_key(&entry.index, |a| a.index)
            .is_ok();
    }

    ForensicReport {
        total_blocks: blocks.len(),
        first_break_index,
        anomalies,
        affected_block_count,
        display_window,
    }
}

/// Selects the blocks worth presenting.
///
/// With a break at `k`: blocks `max(0, k - context)..` to the end, since everything
/// after the break is suspect. Without one: the last `tail` blocks.
/// Indices are those of the full history. `is_broken` is cleared; only
/// verification sets it.
pub fn select_window(
    blocks: &[Block],
    first_break_index: Option<usize>,
    context: usize,
    tail: usize,
) -> Vec<WindowedBlock> {
    let start = match first_break_index {
        Some(k) => k.saturating_sub(context).min(blocks.len()),
        None => blocks.len().saturating_sub(tail),
    };

    blocks[start..]
        .iter()
        .enumerate()
        .map(|(offset, block)| {
            let mut block = block.clone();
            block.is_broken = false;
            WindowedBlock {
                index: start + offset,
                block,
            }
        })
        .collect()
}

/// Stable identifier for a forensic submission.
///
/// BLAKE3 over the device id and every block field, with presence markers so
/// a missing field hashes differently from an empty one.
pub fn report_id(device_id: &str, blocks: &[Block]) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&(device_id.len() as u64).to_le_bytes());
    hasher.update(device_id.as_bytes());
    hasher.update(&(blocks.len() as u64).to_le_bytes());

    for block in blocks {
        for field in [
            &block.logs_hash,
            &block.prev_hash,
            &block.chain_hash,
            &block.global_hash,
        ] {
            match field {
                Some(value) => {
                    hasher.update(&[1]);
                    hasher.update(&(value.len() as u64).to_le_bytes());
                    hasher.update(value.as_bytes());
                }
                None => {
                    hasher.update(&[0]);
                }
            }
        }
        match block.timestamp {
            Some(ts) => {
                hasher.update(&[1]);
                hasher.update(&ts.to_le_bytes());
            }
            None => {
                hasher.update(&[0]);
            }
        }
    }

    let digest = hasher.finalize();
    format!("FR-{}", &hex::encode(digest.as_bytes())[..16])
}

/// Short summary of a breach for dashboards and alerts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreachSummary {
    pub report_id: String,
    pub first_break_index: Option<usize>,
    pub affected_block_count: usize,
    /// Fingerprint the device currently reports.
    pub router_hash: Option<String>,
    /// Fingerprint committed to the ledger.
    pub bsv_hash: Option<String>,
}

impl BreachSummary {
    pub fn new(
        report_id: String,
        report: &ForensicReport,
        router_hash: Option<String>,
        bsv_hash: Option<String>,
    ) -> Self {
        Self {
            report_id,
            first_break_index: report.first_break_index,
            affected_block_count: report.affected_block_count,
            router_hash,
            bsv_hash,
        }
    }
}
