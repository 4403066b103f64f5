// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use anyhow::Context;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{ContentArrangement, Table};
use std::path::Path;
use tamperseal_collector::persistence::SnapshotManager;
use tamperseal_collector::security::assess_device;
use tamperseal_collector::store::CollectorStore;

use super::{format_ts, short};

/// Summarises a collector snapshot: one row per device with its security verdict.
pub fn run(snapshot_path: &str) -> anyhow::Result<()> {
    let (meta, image) = SnapshotManager::load(Path::new(snapshot_path))
        .with_context(|| format!("loading snapshot {}", snapshot_path))?;

    println!("\nCollector Snapshot");
    println!("------------------");
    println!("Saved:    {}", format_ts(Some(meta.timestamp)));
    println!("Devices:  {}", meta.device_count);
    println!("Anchors:  {}", meta.anchor_count);
    println!("Reports:  {}", meta.report_count);

    let devices = image.devices.clone();
    let store = CollectorStore::new();
    store.restore(image);

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            "Device", "Name", "Status", "Reported", "Committed", "Slots", "Anchors", "Last seen",
        ]);

    for device in &devices {
        let security = assess_device(device, &store.anchors);
        table.add_row(vec![
            device.device_id.clone(),
            device.metadata.name.clone().unwrap_or_else(|| "-".into()),
            security.overall.to_string().to_uppercase(),
            short(device.current_fingerprint.as_deref(), 12),
            short(device.committed_fingerprint.as_deref(), 12),
            device.finalized_slots().count().to_string(),
            store.anchors.count_for(&device.device_id).to_string(),
            format_ts(device.last_report_at),
        ]);
    }
    println!("\n{table}\n");
    Ok(())
}
