// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use anyhow::{bail, Context};
use comfy_table::presets::UTF8_FULL;
use comfy_table::{ContentArrangement, Table};
use serde::Deserialize;
use std::path::Path;
use tamperseal_kernel::forensic::{report_id, verify_with, ForensicReport, WindowParams};
use tamperseal_kernel::Block;

use super::{format_ts, short};

/// Accepts either a bare block array or `{"blocks": [...]}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum HistoryFile {
    Bare(Vec<Block>),
    Wrapped { blocks: Vec<Block> },
}

pub fn load_blocks(path: &Path) -> anyhow::Result<Vec<Block>> {
    let data = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let history: HistoryFile =
        serde_json::from_slice(&data).with_context(|| format!("parsing {}", path.display()))?;
    Ok(match history {
        HistoryFile::Bare(blocks) | HistoryFile::Wrapped { blocks } => blocks,
    })
}

/// Verifies a block history file. Fails (non-zero exit) when the chain is broken.
pub fn run(
    history_path: &str,
    device_id: Option<&str>,
    context: usize,
    tail: usize,
) -> anyhow::Result<ForensicReport> {
    let blocks = load_blocks(Path::new(history_path))?;
    let report = verify_with(&blocks, WindowParams { context, tail });

    println!("\nChain Verification");
    println!("------------------");
    println!("Blocks:    {}", report.total_blocks);
    if let Some(device) = device_id {
        println!("Report ID: {}", report_id(device, &blocks));
    }

    if !report.anomalies.is_empty() {
        let mut anomalies = Table::new();
        anomalies
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec!["Block", "Kind", "Expected prev_hash", "Found prev_hash", "Time"]);
        for a in &report.anomalies {
            anomalies.add_row(vec![
                a.index.to_string(),
                if a.primary { "FIRST BREAK" } else { "secondary" }.to_string(),
                short(a.expected.as_deref(), 16),
                short(a.actual.as_deref(), 16),
                format_ts(a.timestamp),
            ]);
        }
        println!("\nAnomalies\n{anomalies}");
    }

    let mut window = Table::new();
    window
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["#", "Status", "prev_hash", "chain_hash", "Time"]);
    for entry in &report.display_window {
        window.add_row(vec![
            entry.index.to_string(),
            if entry.block.is_broken { "BROKEN" } else { "ok" }.to_string(),
            short(entry.block.prev_hash.as_deref(), 16),
            short(entry.block.chain_hash.as_deref(), 16),
            format_ts(entry.block.timestamp),
        ]);
    }
    println!("\nDisplay window\n{window}");

    match report.first_break_index {
        None => {
            println!("\n✅ INTACT\n");
            Ok(report)
        }
        Some(index) => {
            println!("\n❌ BROKEN\n");
            println!("First break:     block {}", index);
            println!("Affected blocks: {}", report.affected_block_count);
            println!("Anomalies:       {}\n", report.anomalies.len());
            bail!(
                "chain broken at block {} ({} blocks affected)",
                index,
                report.affected_block_count
            )
        }
    }
}
