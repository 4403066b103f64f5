// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Per-device state.
//!
//! The registry map is behind a short-lived `std` lock; each device sits behind
//! its own async mutex so ingestion and the scheduler serialize per device
//! without blocking each other across devices.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use tamperseal_kernel::status::TrackedFingerprints;
use tokio::sync::Mutex;

use crate::errors::CollectorError;

/// Identifies one time slot of one device's log stream.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SlotKey {
    /// `YYYY-MM-DD`, as reported by the device.
    pub date: String,
    pub slot_id: u32,
}

impl SlotKey {
    pub fn new(date: impl Into<String>, slot_id: u32) -> Self {
        Self {
            date: date.into(),
            slot_id,
        }
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.date, self.slot_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotState {
    pub key: SlotKey,
    /// Frozen once the slot is finalized. This is the value that gets committed.
    pub slot_hash: String,
    /// Latest value the device claimed for this slot.
    pub reported_hash: String,
    pub finalized: bool,
    pub first_seen_at: u64,
    pub finalized_at: Option<u64>,
}

/// Descriptive fields a device reports about itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceMetadata {
    pub name: Option<String>,
    pub ip: Option<String>,
    pub local_ip: Option<String>,
    pub mac_address: Option<String>,
    pub hash_interval: Option<u64>,
    pub block_interval: Option<u64>,
    pub retention_days: Option<u64>,
    pub total_blocks: Option<u64>,
}

impl DeviceMetadata {
    /// Takes every field `update` carries; keeps the rest.
    pub fn merge(&mut self, update: DeviceMetadata) {
        fn take<T>(slot: &mut Option<T>, value: Option<T>) {
            if value.is_some() {
                *slot = value;
            }
        }
        take(&mut self.name, update.name);
        take(&mut self.ip, update.ip);
        take(&mut self.local_ip, update.local_ip);
        take(&mut self.mac_address, update.mac_address);
        take(&mut self.hash_interval, update.hash_interval);
        take(&mut self.block_interval, update.block_interval);
        take(&mut self.retention_days, update.retention_days);
        take(&mut self.total_blocks, update.total_blocks);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceState {
    pub device_id: String,
    pub metadata: DeviceMetadata,
    /// Most recent rolling fingerprint (legacy protocol).
    pub current_fingerprint: Option<String>,
    /// Value carried by the last successful legacy commit.
    pub committed_fingerprint: Option<String>,
    /// The device's fingerprint frozen when that commit succeeded. Security
    /// verdicts compare against this, never against `current_fingerprint`.
    pub fingerprint_at_commit: Option<String>,
    pub last_report_at: Option<u64>,
    /// Last successful legacy commit.
    pub last_commit_at: Option<u64>,
    pub last_txid: Option<String>,
    #[serde(with = "slot_map")]
    pub slots: BTreeMap<SlotKey, SlotState>,
}

impl DeviceState {
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            ..Default::default()
        }
    }

    /// Legacy protocol: a device with a fingerprint is due on its first report,
    /// then once `interval` has passed since the last commit.
    pub fn commit_due(&self, now: u64, interval: u64) -> bool {
        if self.current_fingerprint.is_none() {
            return false;
        }
        match self.last_commit_at {
            None => true,
            Some(at) => now.saturating_sub(at) >= interval,
        }
    }

    /// Seconds until the next legacy commit becomes due.
    pub fn next_commit_in(&self, now: u64, interval: u64) -> u64 {
        match self.last_commit_at {
            None => 0,
            Some(at) => interval.saturating_sub(now.saturating_sub(at)),
        }
    }

    /// Freezes `fingerprint` as the committed value. The caller passes what it
    /// actually submitted, never a re-read of `current_fingerprint`.
    pub fn record_commit(&mut self, fingerprint: String, txid: String, now: u64) {
        self.fingerprint_at_commit = Some(fingerprint.clone());
        self.committed_fingerprint = Some(fingerprint);
        self.last_txid = Some(txid);
        self.last_commit_at = Some(now);
    }

    pub fn finalized_slots(&self) -> impl Iterator<Item = &SlotState> {
        self.slots.values().filter(|s| s.finalized)
    }

    pub fn uses_legacy(&self) -> bool {
        self.current_fingerprint.is_some() || self.committed_fingerprint.is_some()
    }
}

impl TrackedFingerprints for DeviceState {
    fn current_fingerprint(&self) -> Option<&str> {
        self.current_fingerprint.as_deref()
    }

    fn committed_fingerprint(&self) -> Option<&str> {
        self.committed_fingerprint.as_deref()
    }

    fn fingerprint_at_commit(&self) -> Option<&str> {
        self.fingerprint_at_commit.as_deref()
    }
}

/// Slots serialize as a plain sequence so the state stays JSON friendly.
mod slot_map {
    use super::{SlotKey, SlotState};
    use serde::{Deserialize, Deserializer, Serializer};
    use std::collections::BTreeMap;

    pub fn serialize<S: Serializer>(
        map: &BTreeMap<SlotKey, SlotState>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(map.values())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<SlotKey, SlotState>, D::Error> {
        let slots = Vec::<SlotState>::deserialize(deserializer)?;
        Ok(slots.into_iter().map(|s| (s.key.clone(), s)).collect())
    }
}

pub type DeviceHandle = Arc<Mutex<DeviceState>>;

#[derive(Default)]
pub struct DeviceRegistry {
    devices: RwLock<FxHashMap<String, DeviceHandle>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, device_id: &str) -> Option<DeviceHandle> {
        self.devices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(device_id)
            .cloned()
    }

    /// Returns the device handle, creating an empty device if needed.
    /// The flag is true when the device was created by this call.
    pub fn get_or_create(&self, device_id: &str) -> (DeviceHandle, bool) {
        if let Some(handle) = self.get(device_id) {
            return (handle, false);
        }
        let mut devices = self.devices.write().unwrap_or_else(PoisonError::into_inner);
        // Re-check: another writer may have won the race.
        if let Some(handle) = devices.get(device_id) {
            return (handle.clone(), false);
        }
        let handle = Arc::new(Mutex::new(DeviceState::new(device_id)));
        devices.insert(device_id.to_string(), handle.clone());
        metrics::gauge!(crate::telemetry::KNOWN_DEVICES, devices.len() as f64);
        (handle, true)
    }

    /// Copy of one device's state.
    pub async fn snapshot_of(&self, device_id: &str) -> Option<DeviceState> {
        let handle = self.get(device_id)?;
        let state = handle.lock().await;
        Some(state.clone())
    }

    fn is_registered(&self, device_id: &str, handle: &DeviceHandle) -> bool {
        self.devices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(device_id)
            .is_some_and(|h| Arc::ptr_eq(h, handle))
    }

    /// Applies `f` under the device lock, creating the device first if needed.
    ///
    /// A handle dropped by [`DeviceRegistry::clear`] before its lock was won is
    /// never written; the update goes to the device registered now.
    pub async fn upsert<F, R>(&self, device_id: &str, f: F) -> (R, bool)
    where
        F: FnOnce(&mut DeviceState) -> R,
    {
        loop {
            let (handle, created) = self.get_or_create(device_id);
            let mut state = handle.lock().await;
            if self.is_registered(device_id, &handle) {
                return (f(&mut state), created);
            }
        }
    }

    /// Applies `update` only when `check` still holds, both under one lock.
    /// Returns whether the update was applied.
    pub async fn compare_and_swap<C, U>(
        &self,
        device_id: &str,
        check: C,
        update: U,
    ) -> Result<bool, CollectorError>
    where
        C: FnOnce(&DeviceState) -> bool,
        U: FnOnce(&mut DeviceState),
    {
        let handle = self
            .get(device_id)
            .ok_or_else(|| CollectorError::NotFound(format!("device '{}'", device_id)))?;
        let mut state = handle.lock().await;
        if !check(&state) {
            return Ok(false);
        }
        update(&mut state);
        Ok(true)
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .devices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.devices.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copies of every device, sorted by id. Each device is locked briefly on its own.
    pub async fn all(&self) -> Vec<DeviceState> {
        let handles: Vec<DeviceHandle> = {
            let devices = self.devices.read().unwrap_or_else(PoisonError::into_inner);
            devices.values().cloned().collect()
        };
        let mut out = Vec::with_capacity(handles.len());
        for handle in handles {
            out.push(handle.lock().await.clone());
        }
        out.sort_by(|a, b| a.device_id.cmp(&b.device_id));
        out
    }

    /// Drops every device, then waits out updates already holding a device lock.
    pub async fn clear(&self) {
        let handles: Vec<DeviceHandle> = {
            let mut devices = self.devices.write().unwrap_or_else(PoisonError::into_inner);
            devices.drain().map(|(_, handle)| handle).collect()
        };
        metrics::gauge!(crate::telemetry::KNOWN_DEVICES, 0.0);
        for handle in handles {
            drop(handle.lock().await);
        }
    }

    pub fn restore(&self, states: Vec<DeviceState>) {
        let mut devices = self.devices.write().unwrap_or_else(PoisonError::into_inner);
        devices.clear();
        for state in states {
            devices.insert(state.device_id.clone(), Arc::new(Mutex::new(state)));
        }
        metrics::gauge!(crate::telemetry::KNOWN_DEVICES, devices.len() as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_due_bootstrap_and_interval() {
        let mut d = DeviceState::new("r1");
        assert!(!d.commit_due(100, 3600), "nothing to commit yet");

        d.current_fingerprint = Some("aa".into());
        assert!(d.commit_due(100, 3600));
        assert_eq!(d.next_commit_in(100, 3600), 0);

        d.record_commit("aa".into(), "tx1".into(), 100);
        assert_eq!(d.fingerprint_at_commit.as_deref(), Some("aa"));
        assert!(!d.commit_due(3699, 3600));
        assert_eq!(d.next_commit_in(700, 3600), 3000);
        assert!(d.commit_due(3700, 3600));
    }

    #[test]
    fn test_metadata_merge_keeps_known_values() {
        let mut meta = DeviceMetadata {
            name: Some("edge-1".into()),
            retention_days: Some(3),
            ..Default::default()
        };
        meta.merge(DeviceMetadata {
            ip: Some("10.0.0.7".into()),
            ..Default::default()
        });
        assert_eq!(meta.name.as_deref(), Some("edge-1"));
        assert_eq!(meta.ip.as_deref(), Some("10.0.0.7"));
        assert_eq!(meta.retention_days, Some(3));
    }

    #[test]
    fn test_slots_serialize_as_sequence() {
        let mut d = DeviceState::new("r1");
        let key = SlotKey::new("2025-01-02", 7);
        d.slots.insert(
            key.clone(),
            SlotState {
                key: key.clone(),
                slot_hash: "ab".into(),
                reported_hash: "ab".into(),
                finalized: true,
                first_seen_at: 1,
                finalized_at: Some(2),
            },
        );
        let json = serde_json::to_value(&d).unwrap();
        assert!(json["slots"].is_array());
        let back: DeviceState = serde_json::from_value(json).unwrap();
        assert_eq!(back.slots.get(&key).map(|s| s.finalized), Some(true));
    }

    #[tokio::test]
    async fn test_compare_and_swap_respects_check() {
        let registry = DeviceRegistry::new();
        registry.upsert("r1", |d| d.current_fingerprint = Some("aa".into())).await;

        let applied = registry
            .compare_and_swap("r1", |d| d.last_commit_at.is_some(), |d| d.last_commit_at = Some(1))
            .await
            .unwrap();
        assert!(!applied);

        let applied = registry
            .compare_and_swap("r1", |d| d.last_commit_at.is_none(), |d| d.last_commit_at = Some(1))
            .await
            .unwrap();
        assert!(applied);

        assert!(registry
            .compare_and_swap("ghost", |_| true, |_| {})
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_update_on_cleared_handle_lands_on_fresh_device() {
        let registry = Arc::new(DeviceRegistry::new());
        registry.upsert("r1", |d| d.current_fingerprint = Some("aa".into())).await;

        let stale = registry.get("r1").unwrap();
        let guard = stale.lock().await;

        let pending = {
            let registry = registry.clone();
            tokio::spawn(async move {
                registry
                    .upsert("r1", |d| d.current_fingerprint = Some("bb".into()))
                    .await
                    .1
            })
        };
        tokio::task::yield_now().await;

        let clearing = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.clear().await })
        };
        tokio::task::yield_now().await;
        drop(guard);

        clearing.await.unwrap();
        let created = pending.await.unwrap();

        let state = registry.snapshot_of("r1").await;
        if created {
            assert_eq!(state.and_then(|d| d.current_fingerprint).as_deref(), Some("bb"));
        } else {
            // Applied before the clear finished, so it was cleared with the rest.
            assert!(state.is_none());
        }
    }
}
