// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::sync::{PoisonError, RwLock};

use super::devices::SlotKey;

/// One fingerprint committed to the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorRecord {
    pub device_id: String,
    pub fingerprint: String,
    pub ledger_txid: String,
    pub committed_at: u64,
    /// Set for slot commitments, `None` for legacy ones.
    pub slot: Option<SlotKey>,
}

/// Append-only record of commitments.
///
/// At most one record exists per `(device, slot)`; legacy records are
/// unconstrained.
#[derive(Default)]
pub struct AnchorStore {
    inner: RwLock<AnchorIndex>,
}

#[derive(Default)]
struct AnchorIndex {
    records: Vec<AnchorRecord>,
    by_slot: FxHashMap<(String, SlotKey), usize>,
    by_device: FxHashMap<String, Vec<usize>>,
    by_txid: FxHashMap<String, usize>,
}

impl AnchorIndex {
    fn push(&mut self, record: AnchorRecord) -> bool {
        if let Some(slot) = &record.slot {
            let key = (record.device_id.clone(), slot.clone());
            if self.by_slot.contains_key(&key) {
                return false;
            }
            self.by_slot.insert(key, self.records.len());
        }
        let pos = self.records.len();
        self.by_device
            .entry(record.device_id.clone())
            .or_default()
            .push(pos);
        self.by_txid.insert(record.ledger_txid.clone(), pos);
        self.records.push(record);
        true
    }
}

impl AnchorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `record` unless its slot is already committed.
    /// Returns false (and stores nothing) on a duplicate slot.
    pub fn insert_if_absent(&self, record: AnchorRecord) -> bool {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record)
    }

    pub fn contains_slot(&self, device_id: &str, slot: &SlotKey) -> bool {
        self.get_slot(device_id, slot).is_some()
    }

    pub fn get_slot(&self, device_id: &str, slot: &SlotKey) -> Option<AnchorRecord> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner
            .by_slot
            .get(&(device_id.to_string(), slot.clone()))
            .map(|&pos| inner.records[pos].clone())
    }

    pub fn by_txid(&self, txid: &str) -> Option<AnchorRecord> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.by_txid.get(txid).map(|&pos| inner.records[pos].clone())
    }

    /// Oldest first.
    pub fn by_device(&self, device_id: &str) -> Vec<AnchorRecord> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner
            .by_device
            .get(device_id)
            .map(|positions| positions.iter().map(|&p| inner.records[p].clone()).collect())
            .unwrap_or_default()
    }

    pub fn count_for(&self, device_id: &str) -> usize {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.by_device.get(device_id).map(Vec::len).unwrap_or(0)
    }

    pub fn last_for(&self, device_id: &str) -> Option<AnchorRecord> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner
            .by_device
            .get(device_id)
            .and_then(|positions| positions.last())
            .map(|&p| inner.records[p].clone())
    }

    /// Newest first, optionally for one device.
    pub fn recent(&self, device_id: Option<&str>, limit: usize) -> Vec<AnchorRecord> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner
            .records
            .iter()
            .rev()
            .filter(|r| device_id.map_or(true, |id| r.device_id == id))
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn all(&self) -> Vec<AnchorRecord> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .records
            .clone()
    }

    pub fn clear(&self) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = AnchorIndex::default();
    }

    pub fn restore(&self, records: Vec<AnchorRecord>) {
        let mut index = AnchorIndex::default();
        for record in records {
            if !index.push(record) {
                tracing::warn!("Dropping duplicate slot anchor while restoring");
            }
        }
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = index;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot_record(device: &str, slot_id: u32, txid: &str) -> AnchorRecord {
        AnchorRecord {
            device_id: device.into(),
            fingerprint: "ab".repeat(32),
            ledger_txid: txid.into(),
            committed_at: 10,
            slot: Some(SlotKey::new("2025-03-01", slot_id)),
        }
    }

    #[test]
    fn test_slot_records_are_unique() {
        let store = AnchorStore::new();
        assert!(store.insert_if_absent(slot_record("r1", 1, "tx-a")));
        assert!(!store.insert_if_absent(slot_record("r1", 1, "tx-b")));
        assert!(store.insert_if_absent(slot_record("r2", 1, "tx-c")));
        assert_eq!(store.len(), 2);
        assert_eq!(
            store.get_slot("r1", &SlotKey::new("2025-03-01", 1)).map(|r| r.ledger_txid),
            Some("tx-a".to_string())
        );
        assert!(store.by_txid("tx-b").is_none());
    }

    #[test]
    fn test_legacy_records_append() {
        let store = AnchorStore::new();
        for txid in ["t1", "t2", "t3"] {
            let mut r = slot_record("r1", 0, txid);
            r.slot = None;
            assert!(store.insert_if_absent(r));
        }
        assert_eq!(store.count_for("r1"), 3);
        assert_eq!(store.last_for("r1").map(|r| r.ledger_txid), Some("t3".to_string()));

        let recent: Vec<String> = store.recent(Some("r1"), 2).into_iter().map(|r| r.ledger_txid).collect();
        assert_eq!(recent, vec!["t3", "t2"]);
    }

    #[test]
    fn test_restore_rebuilds_indexes() {
        let store = AnchorStore::new();
        store.restore(vec![slot_record("r1", 4, "tx-4"), slot_record("r1", 4, "tx-dup")]);
        assert_eq!(store.len(), 1);
        assert!(store.contains_slot("r1", &SlotKey::new("2025-03-01", 4)));
        assert!(store.by_txid("tx-4").is_some());
    }
}
