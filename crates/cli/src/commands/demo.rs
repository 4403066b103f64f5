// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use anyhow::{bail, Context};
use std::path::Path;
use tamperseal_kernel::{Block, ChainBuilder};

const DEMO_START: u64 = 1_700_000_000;

/// Builds a chain of `count` blocks, one a minute, optionally tampered at `break_at`.
pub fn generate(count: usize, break_at: Option<usize>) -> anyhow::Result<Vec<Block>> {
    if let Some(k) = break_at {
        if k == 0 || k >= count {
            bail!("--break-at must be between 1 and {}", count.saturating_sub(1));
        }
    }

    let mut chain = ChainBuilder::new();
    for i in 0..count {
        let logs = format!("demo log batch {i}: sshd accepted publickey for admin");
        chain.append_logs(logs.as_bytes(), DEMO_START + 60 * i as u64);
    }
    let mut blocks = chain.into_blocks();

    // Simulates someone rewriting history: block k no longer points at its predecessor.
    if let Some(k) = break_at {
        blocks[k].prev_hash = Some("deadbeef".repeat(8));
    }
    Ok(blocks)
}

pub fn run(out: &str, count: usize, break_at: Option<usize>) -> anyhow::Result<()> {
    let blocks = generate(count, break_at)?;
    let json = serde_json::to_vec_pretty(&serde_json::json!({ "blocks": blocks }))?;
    std::fs::write(Path::new(out), json).with_context(|| format!("writing {}", out))?;

    println!("🎬 Wrote {} blocks to {}", count, out);
    if let Some(k) = break_at {
        println!("   Tampered at block {}", k);
    }
    Ok(())
}
