// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::sync::{PoisonError, RwLock};
use tamperseal_kernel::Block;

/// A block history submitted for forensic analysis, kept as received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredHistory {
    pub report_id: String,
    pub device_id: String,
    pub received_at: u64,
    pub blocks: Vec<Block>,
}

#[derive(Default)]
pub struct ForensicStore {
    histories: RwLock<FxHashMap<String, StoredHistory>>,
}

impl ForensicStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Identical submissions share a report id; the later one replaces the earlier.
    pub fn insert(&self, history: StoredHistory) {
        self.histories
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(history.report_id.clone(), history);
    }

    pub fn get(&self, report_id: &str) -> Option<StoredHistory> {
        self.histories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(report_id)
            .cloned()
    }

    /// `(report_id, received_at)` pairs for one device, newest first.
    pub fn ids_for_device(&self, device_id: &str) -> Vec<(String, u64)> {
        let histories = self.histories.read().unwrap_or_else(PoisonError::into_inner);
        let mut ids: Vec<(String, u64)> = histories
            .values()
            .filter(|h| h.device_id == device_id)
            .map(|h| (h.report_id.clone(), h.received_at))
            .collect();
        ids.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ids
    }

    pub fn len(&self) -> usize {
        self.histories.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn all(&self) -> Vec<StoredHistory> {
        let mut all: Vec<StoredHistory> = self
            .histories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        all.sort_by(|a, b| a.report_id.cmp(&b.report_id));
        all
    }

    pub fn clear(&self) {
        self.histories.write().unwrap_or_else(PoisonError::into_inner).clear();
    }

    pub fn restore(&self, histories: Vec<StoredHistory>) {
        let mut map = self.histories.write().unwrap_or_else(PoisonError::into_inner);
        map.clear();
        for h in histories {
            map.insert(h.report_id.clone(), h);
        }
    }
}
