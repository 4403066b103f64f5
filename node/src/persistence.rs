// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use crc32fast::Hasher;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::errors::CollectorError;
use crate::store::{CollectorStore, StoreImage};

const MAGIC: u32 = 0x5453_4C53; // TSLS
const SCHEMA_VERSION: u32 = 1;
const HEADER_LEN: usize = 12;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SnapshotMeta {
    pub version: u32,
    pub timestamp: u64,
    pub body_len: u64,
    pub device_count: u64,
    pub anchor_count: u64,
    pub report_count: u64,
}

/// Snapshot file layout:
/// `[MAGIC][VERSION][META_LEN][META JSON][BODY bincode][CRC32]`, little endian.
pub struct SnapshotManager;

impl SnapshotManager {
    pub fn save(path: &Path, image: &StoreImage, timestamp: u64) -> Result<SnapshotMeta, CollectorError> {
        let body = bincode::serde::encode_to_vec(image, bincode::config::standard())
            .map_err(|e| CollectorError::Persistence(format!("encode failed: {}", e)))?;

        let meta = SnapshotMeta {
            version: SCHEMA_VERSION,
            timestamp,
            body_len: body.len() as u64,
            device_count: image.devices.len() as u64,
            anchor_count: image.anchors.len() as u64,
            report_count: image.reports.len() as u64,
        };
        let meta_json = serde_json::to_vec(&meta)
            .map_err(|e| CollectorError::Persistence(e.to_string()))?;

        let tmp_path = path.with_extension("tmp");
        {
            let mut file = File::create(&tmp_path)?;
            let mut hasher = Hasher::new();

            let mut write_chunk = |data: &[u8]| -> std::io::Result<()> {
                file.write_all(data)?;
                hasher.update(data);
                Ok(())
            };

            write_chunk(&MAGIC.to_le_bytes())?;
            write_chunk(&SCHEMA_VERSION.to_le_bytes())?;
            write_chunk(&(meta_json.len() as u32).to_le_bytes())?;
            write_chunk(&meta_json)?;
            write_chunk(&body)?;

            let checksum = hasher.finalize();
            file.write_all(&checksum.to_le_bytes())?;
            file.sync_all()?;
        }

        // Keep one previous version.
        if path.exists() {
            if let Err(e) = std::fs::rename(path, prev_path(path)) {
                tracing::warn!("Could not rotate previous snapshot: {}", e);
            }
        }

        std::fs::rename(&tmp_path, path)?;
        Ok(meta)
    }

    pub fn parse(buffer: &[u8]) -> Result<(SnapshotMeta, StoreImage), CollectorError> {
        let corrupt = |msg: &str| CollectorError::Persistence(msg.to_string());

        if buffer.len() < HEADER_LEN + 4 {
            return Err(corrupt("snapshot too short"));
        }

        let (content, trailer) = buffer.split_at(buffer.len() - 4);
        let stored_crc = read_u32(trailer, 0).ok_or_else(|| corrupt("missing checksum"))?;
        let mut hasher = Hasher::new();
        hasher.update(content);
        if hasher.finalize() != stored_crc {
            return Err(corrupt("checksum mismatch"));
        }

        if read_u32(content, 0) != Some(MAGIC) {
            return Err(corrupt("invalid magic"));
        }
        if read_u32(content, 4) != Some(SCHEMA_VERSION) {
            return Err(corrupt("version mismatch"));
        }

        let meta_len = read_u32(content, 8).ok_or_else(|| corrupt("truncated header"))? as usize;
        let meta_end = HEADER_LEN
            .checked_add(meta_len)
            .filter(|&end| end <= content.len())
            .ok_or_else(|| corrupt("truncated metadata"))?;

        let meta: SnapshotMeta = serde_json::from_slice(&content[HEADER_LEN..meta_end])
            .map_err(|e| CollectorError::Persistence(format!("bad metadata: {}", e)))?;

        let body = &content[meta_end..];
        if body.len() as u64 != meta.body_len {
            return Err(CollectorError::Persistence(format!(
                "meta claims {} body bytes, found {}",
                meta.body_len,
                body.len()
            )));
        }

        let (image, _) = bincode::serde::decode_from_slice::<StoreImage, _>(body, bincode::config::standard())
            .map_err(|e| CollectorError::Persistence(format!("decode failed: {}", e)))?;

        Ok((meta, image))
    }

    pub fn load(path: &Path) -> Result<(SnapshotMeta, StoreImage), CollectorError> {
        let buffer = std::fs::read(path)?;
        Self::parse(&buffer)
    }

    /// Copies the snapshot aside as `<name>.backup_<suffix>`.
    /// Returns `None` when there is nothing to back up.
    pub fn backup(path: &Path, suffix: &str) -> Result<Option<PathBuf>, CollectorError> {
        if !path.exists() {
            return Ok(None);
        }
        let mut name = path.as_os_str().to_owned();
        name.push(format!(".backup_{}", suffix));
        let target = PathBuf::from(name);
        std::fs::copy(path, &target)?;
        Ok(Some(target))
    }
}

fn prev_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".prev");
    PathBuf::from(name)
}

fn read_u32(buf: &[u8], at: usize) -> Option<u32> {
    let bytes: [u8; 4] = buf.get(at..at + 4)?.try_into().ok()?;
    Some(u32::from_le_bytes(bytes))
}

/// Saves and restores a [`CollectorStore`] at a fixed path.
pub struct StorePersister {
    path: PathBuf,
}

impl StorePersister {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Restores the store from disk. A missing file is a fresh start.
    pub async fn load_into(&self, store: &CollectorStore) -> Result<Option<SnapshotMeta>, CollectorError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let path = self.path.clone();
        let (meta, image) = tokio::task::spawn_blocking(move || SnapshotManager::load(&path))
            .await
            .map_err(|_| CollectorError::Internal)??;
        store.restore(image);
        Ok(Some(meta))
    }

    pub async fn persist(&self, store: &CollectorStore, timestamp: u64) -> Result<SnapshotMeta, CollectorError> {
        let image = store.image().await;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || SnapshotManager::save(&path, &image, timestamp))
            .await
            .map_err(|_| CollectorError::Internal)?
    }

    pub fn backup(&self, suffix: &str) -> Result<Option<PathBuf>, CollectorError> {
        SnapshotManager::backup(&self.path, suffix)
    }
}
