// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use comfy_table::presets::UTF8_FULL;
use comfy_table::{ContentArrangement, Table};
use tamperseal_kernel::pushdata::{decode_detailed, select_fingerprint};

/// Prints the pushes carried by a data-carrier output script.
/// Returns the selected fingerprint, if any.
pub fn run(script_hex: &str) -> anyhow::Result<Option<String>> {
    let decoded = decode_detailed(script_hex);

    if decoded.items.is_empty() && decoded.stopped.is_none() {
        println!("\nNo OP_RETURN data in script.\n");
        return Ok(None);
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["#", "Bytes", "Hex", "Text"]);
    for (i, item) in decoded.items.iter().enumerate() {
        let text = std::str::from_utf8(item)
            .ok()
            .filter(|s| s.chars().all(|c| !c.is_control()))
            .unwrap_or("")
            .to_string();
        table.add_row(vec![i.to_string(), item.len().to_string(), hex::encode(item), text]);
    }
    println!("\n{table}");

    if let Some(reason) = &decoded.stopped {
        println!("⚠️  Decoding stopped early: {}", reason);
    }

    let fingerprint = select_fingerprint(&decoded.items).map(hex::encode);
    match &fingerprint {
        Some(fp) => println!("Fingerprint: {}\n", fp),
        None => println!("Fingerprint: none\n"),
    }
    Ok(fingerprint)
}
