// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use async_trait::async_trait;
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tamperseal_kernel::pushdata;

use super::{fingerprint_payload, LedgerClient};
use crate::errors::CollectorError;

/// In-process ledger. Keeps every script it "broadcasts" and can be told to fail.
///
/// Used when no gateway is configured and throughout the tests.
#[derive(Default)]
pub struct MemoryLedger {
    scripts: Mutex<FxHashMap<String, Vec<u8>>>,
    submissions: AtomicUsize,
    fail_next: AtomicUsize,
    underfunded: AtomicBool,
    latency: Mutex<Option<Duration>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Successful submissions so far.
    pub fn submissions(&self) -> usize {
        self.submissions.load(Ordering::SeqCst)
    }

    /// The next `n` submissions fail as transient errors.
    pub fn fail_next(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    pub fn set_underfunded(&self, underfunded: bool) {
        self.underfunded.store(underfunded, Ordering::SeqCst);
    }

    /// Every submission sleeps this long before answering.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock().unwrap_or_else(|e| e.into_inner()) = latency;
    }

    /// Raw output script of a transaction.
    pub fn script(&self, txid: &str) -> Option<Vec<u8>> {
        self.scripts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(txid)
            .cloned()
    }
}

#[async_trait]
impl LedgerClient for MemoryLedger {
    fn name(&self) -> &str {
        "memory"
    }

    async fn submit(&self, fingerprint: &str) -> Result<String, CollectorError> {
        let latency = *self.latency.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        if self.underfunded.load(Ordering::SeqCst) {
            return Err(CollectorError::LedgerUnderfunded("memory wallet is empty".into()));
        }
        let injected = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(CollectorError::LedgerSubmission("injected failure".into()));
        }

        let payload = fingerprint_payload(fingerprint)?;
        let script = pushdata::encode(&payload);
        let seq = self.submissions.fetch_add(1, Ordering::SeqCst) as u64;

        let mut hasher = blake3::Hasher::new();
        hasher.update(&seq.to_le_bytes());
        hasher.update(&script);
        let txid = hasher.finalize().to_hex().to_string();

        self.scripts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(txid.clone(), script);
        Ok(txid)
    }

    async fn read(&self, txid: &str) -> Result<Option<String>, CollectorError> {
        let script = self.script(txid);
        Ok(script.and_then(|s| pushdata::fingerprint_from_script(&hex::encode(s))))
    }
}
