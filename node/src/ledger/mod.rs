// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Public-ledger access.
//!
//! Commitments are `OP_FALSE OP_RETURN <fingerprint>` data outputs. How a
//! transaction gets funded, signed and broadcast is the gateway's business;
//! the collector only hands over a fingerprint and keeps the returned txid.

pub mod client;
pub mod memory;

pub use client::HttpLedgerClient;
pub use memory::MemoryLedger;

use async_trait::async_trait;
use std::sync::Arc;
use tamperseal_kernel::fingerprint::is_hex;

use crate::errors::CollectorError;

#[async_trait]
pub trait LedgerClient: Send + Sync {
    fn name(&self) -> &str;

    /// Commits `fingerprint` (hex) and returns the transaction id.
    ///
    /// Errors are `LedgerSubmission` (retry later) or `LedgerUnderfunded`
    /// (needs an operator).
    async fn submit(&self, fingerprint: &str) -> Result<String, CollectorError>;

    /// Reads the fingerprint carried by `txid`, `None` for an unknown transaction.
    async fn read(&self, txid: &str) -> Result<Option<String>, CollectorError>;
}

pub type SharedLedger = Arc<dyn LedgerClient>;

/// Bytes pushed on-chain for a hex fingerprint.
pub fn fingerprint_payload(fingerprint: &str) -> Result<Vec<u8>, CollectorError> {
    if fingerprint.is_empty() || !is_hex(fingerprint) {
        return Err(CollectorError::Validation(format!(
            "fingerprint '{}' is not hex",
            fingerprint
        )));
    }
    hex::decode(fingerprint).map_err(|e| CollectorError::Validation(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_requires_even_hex() {
        assert_eq!(fingerprint_payload("0aFF").unwrap(), vec![0x0a, 0xff]);
        assert!(fingerprint_payload("").is_err());
        assert!(fingerprint_payload("abc").is_err());
        assert!(fingerprint_payload("zz").is_err());
    }
}
