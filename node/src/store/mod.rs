// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
pub mod anchors;
pub mod devices;
pub mod reports;

pub use anchors::{AnchorRecord, AnchorStore};
pub use devices::{DeviceMetadata, DeviceRegistry, DeviceState, SlotKey, SlotState};
pub use reports::{ForensicStore, StoredHistory};

use serde::{Deserialize, Serialize};

/// Everything the collector remembers between restarts.
#[derive(Default)]
pub struct CollectorStore {
    pub devices: DeviceRegistry,
    pub anchors: AnchorStore,
    pub reports: ForensicStore,
}

/// Point-in-time copy of a [`CollectorStore`], the body of a snapshot file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreImage {
    pub devices: Vec<DeviceState>,
    pub anchors: Vec<AnchorRecord>,
    pub reports: Vec<StoredHistory>,
}

impl CollectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn image(&self) -> StoreImage {
        StoreImage {
            devices: self.devices.all().await,
            anchors: self.anchors.all(),
            reports: self.reports.all(),
        }
    }

    pub fn restore(&self, image: StoreImage) {
        self.devices.restore(image.devices);
        self.anchors.restore(image.anchors);
        self.reports.restore(image.reports);
    }

    pub async fn clear(&self) {
        self.devices.clear().await;
        self.anchors.clear();
        self.reports.clear();
    }
}
