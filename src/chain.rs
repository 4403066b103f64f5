// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Log Hash-Chain Block Model
//!
//! Each device keeps an append-only chain of blocks over its activity logs:
//!
//! ```text
//! block[0]            block[1]            block[2]
//! prev = GENESIS      prev = chain[0]     prev = chain[1]
//! chain[0]      <---  chain[1]      <---  chain[2]
//! ```
//!
//! # Invariant
//! For every `i > 0`: `block[i].prev_hash == block[i-1].chain_hash`.
//!
//! Blocks are produced by the device and arrive here as untrusted payloads,
//! so every hash field is optional. A missing hash never satisfies a link.

use alloc::string::String;
use alloc::vec::Vec;
use serde::{Deserialize, Serialize};

use crate::fingerprint::{optional_match, to_hex};

/// `prev_hash` of the first block in a chain.
pub const GENESIS_PREV_HASH: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

/// One unit of a device's log hash chain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Fingerprint of the log content covered by this block.
    #[serde(default)]
    pub logs_hash: Option<String>,
    /// Copy of the previous block's `chain_hash` (or [`GENESIS_PREV_HASH`]).
    #[serde(default)]
    pub prev_hash: Option<String>,
    /// Cumulative fingerprint binding this block to its predecessor.
    #[serde(default)]
    pub chain_hash: Option<String>,
    /// Fingerprint over the whole chain state up to this block.
    #[serde(default)]
    pub global_hash: Option<String>,
    /// Unix seconds, as stamped by the device.
    #[serde(default)]
    pub timestamp: Option<u64>,
    /// Derived by verification. Whatever the device sends here is ignored.
    #[serde(default)]
    pub is_broken: bool,
}

impl Block {
    /// True when this block's `prev_hash` equals `prev.chain_hash`.
    pub fn links_to(&self, prev: &Block) -> bool {
        optional_match(self.prev_hash.as_deref(), prev.chain_hash.as_deref())
    }

    pub fn is_genesis(&self) -> bool {
        optional_match(self.prev_hash.as_deref(), Some(GENESIS_PREV_HASH))
    }
}

/// `chain_hash = BLAKE3(prev_hash || logs_hash)` over the lowercase hex strings.
pub fn chain_hash(prev_hash: &str, logs_hash: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(prev_hash.to_ascii_lowercase().as_bytes());
    hasher.update(logs_hash.to_ascii_lowercase().as_bytes());
    to_hex(hasher.finalize().as_bytes())
}

/// `global_hash = BLAKE3(prev_global || chain_hash)`.
pub fn global_hash(prev_global: &str, chain_hash: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(prev_global.to_ascii_lowercase().as_bytes());
    hasher.update(chain_hash.to_ascii_lowercase().as_bytes());
    to_hex(hasher.finalize().as_bytes())
}

/// Reference chain producer.
///
/// Mirrors what a device does when it seals a block: fingerprint the logs,
/// bind to the previous `chain_hash`, roll the global hash forward.
#[derive(Debug, Clone)]
pub struct ChainBuilder {
    prev_chain: String,
    prev_global: String,
    blocks: Vec<Block>,
}

impl Default for ChainBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ChainBuilder {
    pub fn new() -> Self {
        Self {
            prev_chain: String::from(GENESIS_PREV_HASH),
            prev_global: String::from(GENESIS_PREV_HASH),
            blocks: Vec::new(),
        }
    }

    /// Seals a block over raw log bytes.
    pub fn append_logs(&mut self, logs: &[u8], timestamp: u64) -> &Block {
        let logs_hash = to_hex(blake3::hash(logs).as_bytes());
        self.append_logs_hash(logs_hash, timestamp)
    }

    /// Seals a block over an already computed logs fingerprint.
    pub fn append_logs_hash(&mut self, logs_hash: String, timestamp: u64) -> &Block {
        let chain = chain_hash(&self.prev_chain, &logs_hash);
        let global = global_hash(&self.prev_global, &chain);

        let block = Block {
            logs_hash: Some(logs_hash),
            prev_hash: Some(self.prev_chain.clone()),
            chain_hash: Some(chain.clone()),
            global_hash: Some(global.clone()),
            timestamp: Some(timestamp),
            is_broken: false,
        };

        self.prev_chain = chain;
        self.prev_global = global;
        self.blocks.push(block);
        &self.blocks[self.blocks.len() - 1]
    }

    /// `chain_hash` of the newest block (the device's rolling fingerprint).
    pub fn head(&self) -> &str {
        &self.prev_chain
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn into_blocks(self) -> Vec<Block> {
        self.blocks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_links_blocks() {
        let mut builder = ChainBuilder::new();
        for i in 0..4u64 {
            builder.append_logs(format!("log line {}", i).as_bytes(), 1_700_000_000 + i * 30);
        }
        let blocks = builder.blocks();

        assert!(blocks[0].is_genesis());
        for i in 1..blocks.len() {
            assert!(blocks[i].links_to(&blocks[i - 1]), "block {} must link", i);
        }
        assert_eq!(builder.head(), blocks[3].chain_hash.as_deref().unwrap());
    }

    #[test]
    fn test_chain_hash_deterministic() {
        let a = chain_hash(GENESIS_PREV_HASH, "ABCD");
        let b = chain_hash(GENESIS_PREV_HASH, "abcd");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_missing_hash_never_links() {
        let prev = Block::default();
        let cur = Block::default();
        assert!(!cur.links_to(&prev));
    }

    #[test]
    fn test_block_deserializes_with_missing_fields() {
        let block: Block = serde_json::from_str(r#"{"chain_hash":"ab","is_broken":true}"#).unwrap();
        assert_eq!(block.chain_hash.as_deref(), Some("ab"));
        assert!(block.prev_hash.is_none());
    }
}
