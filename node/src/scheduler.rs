// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Anchor scheduler.
//!
//! Each cycle plans submissions from a copy of the device table, then runs
//! them with bounded concurrency. No device lock is held across a ledger call.
//!
//! - Slot protocol: every finalized slot without an anchor record is committed
//!   once. The anchor store refuses a second record for the same slot.
//! - Legacy protocol: a device is committed on its first report, then every
//!   `anchor_interval_secs`. The committed value is the fingerprint read when
//!   the job was planned.
//!
//! Cycles never overlap, so a slot is submitted at most once.

use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Notify};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::api::ResetResponse;
use crate::clock::{format_unix, unix_now};
use crate::config::{AnchorProtocol, CollectorConfig};
use crate::errors::CollectorError;
use crate::ledger::SharedLedger;
use crate::persistence::StorePersister;
use crate::store::{AnchorRecord, CollectorStore, SlotKey};
use crate::telemetry;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub protocol: AnchorProtocol,
    pub anchor_interval_secs: u64,
    pub period: Duration,
    pub ledger_timeout: Duration,
    pub concurrency: usize,
}

impl From<&CollectorConfig> for SchedulerConfig {
    fn from(cfg: &CollectorConfig) -> Self {
        Self {
            protocol: cfg.protocol,
            anchor_interval_secs: cfg.anchor_interval_secs,
            period: Duration::from_secs(cfg.scheduler_period_secs),
            ledger_timeout: Duration::from_secs(cfg.ledger_timeout_secs),
            concurrency: cfg.ledger_concurrency.max(1),
        }
    }
}

/// What one cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub started_at: u64,
    pub slots_committed: usize,
    pub legacy_committed: usize,
    /// Finalized slots that already had an anchor.
    pub already_anchored: usize,
    pub transient_failures: usize,
    pub underfunded_failures: usize,
    /// Jobs skipped after the wallet ran dry.
    pub deferred: usize,
}

impl CycleReport {
    pub fn committed(&self) -> usize {
        self.slots_committed + self.legacy_committed
    }
}

#[derive(Debug, Clone)]
enum Job {
    Slot {
        device_id: String,
        key: SlotKey,
        fingerprint: String,
    },
    Legacy {
        device_id: String,
        fingerprint: String,
        /// `last_commit_at` when planned. The commit is recorded only if unchanged.
        seen_commit_at: Option<u64>,
    },
}

impl Job {
    fn device_id(&self) -> &str {
        match self {
            Job::Slot { device_id, .. } | Job::Legacy { device_id, .. } => device_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    SlotCommitted,
    LegacyCommitted,
    AlreadyAnchored,
    Transient,
    Underfunded,
    Deferred,
}

pub struct AnchorScheduler {
    store: Arc<CollectorStore>,
    ledger: SharedLedger,
    config: SchedulerConfig,
    persister: Option<Arc<StorePersister>>,
    cycle_lock: Mutex<()>,
    kick: Notify,
    last_cycle: RwLock<Option<CycleReport>>,
}

impl AnchorScheduler {
    pub fn new(
        store: Arc<CollectorStore>,
        ledger: SharedLedger,
        config: SchedulerConfig,
        persister: Option<Arc<StorePersister>>,
    ) -> Self {
        Self {
            store,
            ledger,
            config,
            persister,
            cycle_lock: Mutex::new(()),
            kick: Notify::new(),
            last_cycle: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Asks the background loop to run a cycle now.
    pub fn kick(&self) {
        self.kick.notify_one();
    }

    pub fn last_cycle(&self) -> Option<CycleReport> {
        self.last_cycle
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn plan(&self, now: u64, report: &mut CycleReport) -> Vec<Job> {
        let mut jobs = Vec::new();
        for device in self.store.devices.all().await {
            if self.config.protocol.runs_slots() {
                for slot in device.finalized_slots() {
                    if self.store.anchors.contains_slot(&device.device_id, &slot.key) {
                        report.already_anchored += 1;
                        continue;
                    }
                    jobs.push(Job::Slot {
                        device_id: device.device_id.clone(),
                        key: slot.key.clone(),
                        fingerprint: slot.slot_hash.clone(),
                    });
                }
            }

            if self.config.protocol.runs_legacy() && device.commit_due(now, self.config.anchor_interval_secs) {
                if let Some(fingerprint) = device.current_fingerprint.clone() {
                    jobs.push(Job::Legacy {
                        device_id: device.device_id.clone(),
                        fingerprint,
                        seen_commit_at: device.last_commit_at,
                    });
                }
            }
        }
        jobs
    }

    /// Runs one cycle. Safe to call concurrently with ingestion and with
    /// itself; overlapping calls queue up.
    pub async fn run_cycle(&self, now: u64) -> CycleReport {
        let _cycle = self.cycle_lock.lock().await;

        let mut report = CycleReport {
            started_at: now,
            ..Default::default()
        };
        let jobs = self.plan(now, &mut report).await;
        if !jobs.is_empty() {
            debug!(jobs = jobs.len(), "Anchor cycle planned");
        }

        let wallet_empty = AtomicBool::new(false);
        let outcomes: Vec<Outcome> = stream::iter(jobs)
            .map(|job| self.execute(job, now, &wallet_empty))
            .buffer_unordered(self.config.concurrency)
            .collect()
            .await;

        for outcome in outcomes {
            match outcome {
                Outcome::SlotCommitted => report.slots_committed += 1,
                Outcome::LegacyCommitted => report.legacy_committed += 1,
                Outcome::AlreadyAnchored => report.already_anchored += 1,
                Outcome::Transient => report.transient_failures += 1,
                Outcome::Underfunded => report.underfunded_failures += 1,
                Outcome::Deferred => report.deferred += 1,
            }
        }

        if report.committed() > 0 {
            info!(
                slots = report.slots_committed,
                legacy = report.legacy_committed,
                "Anchor cycle committed fingerprints"
            );
            if let Some(persister) = &self.persister {
                if let Err(e) = persister.persist(&self.store, now).await {
                    error!("Failed to persist store after anchor cycle: {}", e);
                }
            }
        }
        if report.underfunded_failures > 0 {
            error!(
                failed = report.underfunded_failures,
                deferred = report.deferred,
                "Ledger wallet is underfunded; commitments are on hold until it is topped up"
            );
        }

        *self.last_cycle.write().unwrap_or_else(PoisonError::into_inner) = Some(report.clone());
        report
    }

    async fn submit(&self, fingerprint: &str) -> Result<String, CollectorError> {
        let started = Instant::now();
        let result = tokio::time::timeout(self.config.ledger_timeout, self.ledger.submit(fingerprint))
            .await
            .unwrap_or_else(|_| {
                Err(CollectorError::LedgerSubmission(format!(
                    "timed out after {:?}",
                    self.config.ledger_timeout
                )))
            });
        metrics::histogram!(telemetry::LEDGER_SUBMIT_SECONDS, started.elapsed().as_secs_f64());
        result
    }

    fn failure(&self, job: &Job, err: &CollectorError, wallet_empty: &AtomicBool) -> Outcome {
        match err {
            CollectorError::LedgerUnderfunded(msg) => {
                wallet_empty.store(true, Ordering::SeqCst);
                metrics::counter!(telemetry::LEDGER_FAILURES, 1, "kind" => "underfunded");
                error!(device_id = %job.device_id(), "Ledger wallet underfunded: {}", msg);
                Outcome::Underfunded
            }
            other => {
                metrics::counter!(telemetry::LEDGER_FAILURES, 1, "kind" => "transient");
                warn!(device_id = %job.device_id(), "Ledger submission failed, retrying next cycle: {}", other);
                Outcome::Transient
            }
        }
    }

    async fn execute(&self, job: Job, now: u64, wallet_empty: &AtomicBool) -> Outcome {
        if wallet_empty.load(Ordering::SeqCst) {
            return Outcome::Deferred;
        }

        match &job {
            Job::Slot {
                device_id,
                key,
                fingerprint,
            } => {
                if self.store.anchors.contains_slot(device_id, key) {
                    return Outcome::AlreadyAnchored;
                }
                let txid = match self.submit(fingerprint).await {
                    Ok(txid) => txid,
                    Err(e) => return self.failure(&job, &e, wallet_empty),
                };
                let inserted = self.store.anchors.insert_if_absent(AnchorRecord {
                    device_id: device_id.clone(),
                    fingerprint: fingerprint.clone(),
                    ledger_txid: txid.clone(),
                    committed_at: now,
                    slot: Some(key.clone()),
                });
                if !inserted {
                    error!(device_id = %device_id, slot = %key, txid = %txid, "Slot was anchored twice");
                    return Outcome::AlreadyAnchored;
                }
                metrics::counter!(telemetry::ANCHORS_COMMITTED, 1, "protocol" => "slot");
                info!(device_id = %device_id, slot = %key, txid = %txid, "Slot anchored");
                Outcome::SlotCommitted
            }
            Job::Legacy {
                device_id,
                fingerprint,
                seen_commit_at,
            } => {
                let txid = match self.submit(fingerprint).await {
                    Ok(txid) => txid,
                    Err(e) => return self.failure(&job, &e, wallet_empty),
                };

                let frozen = fingerprint.clone();
                let recorded = self
                    .store
                    .devices
                    .compare_and_swap(
                        device_id,
                        |d| d.last_commit_at == *seen_commit_at,
                        |d| d.record_commit(frozen, txid.clone(), now),
                    )
                    .await;
                match recorded {
                    Ok(true) => {}
                    Ok(false) => warn!(device_id = %device_id, txid = %txid, "Device committed concurrently; keeping its newer commit"),
                    Err(_) => {
                        warn!(device_id = %device_id, txid = %txid, "Device vanished during commit; anchor not recorded");
                        return Outcome::Transient;
                    }
                }

                // Recorded even when a concurrent commit kept the device state.
                self.store.anchors.insert_if_absent(AnchorRecord {
                    device_id: device_id.clone(),
                    fingerprint: fingerprint.clone(),
                    ledger_txid: txid.clone(),
                    committed_at: now,
                    slot: None,
                });
                metrics::counter!(telemetry::ANCHORS_COMMITTED, 1, "protocol" => "legacy");
                info!(device_id = %device_id, txid = %txid, "Fingerprint anchored");
                Outcome::LegacyCommitted
            }
        }
    }

    /// Wipes the store between cycles: backs up the snapshot, clears devices,
    /// anchors and reports, then persists the empty store.
    pub async fn reset_store(&self, now: u64) -> Result<ResetResponse, CollectorError> {
        let _cycle = self.cycle_lock.lock().await;

        let backup = match &self.persister {
            Some(persister) => persister
                .backup(&format_unix(now))?
                .map(|p| p.to_string_lossy().to_string()),
            None => None,
        };

        let cleared_devices = self.store.devices.len();
        let cleared_anchors = self.store.anchors.len();
        let cleared_reports = self.store.reports.len();
        self.store.clear().await;

        if let Some(persister) = &self.persister {
            persister.persist(&self.store, now).await?;
        }

        warn!(
            devices = cleared_devices,
            anchors = cleared_anchors,
            reports = cleared_reports,
            backup = backup.as_deref().unwrap_or("none"),
            "Collector state reset"
        );

        Ok(ResetResponse {
            status: "reset",
            backup,
            cleared_devices,
            cleared_anchors,
            cleared_reports,
        })
    }

    /// Background loop: a cycle every period, on [`AnchorScheduler::kick`],
    /// and once at start-up.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            period_secs = self.config.period.as_secs(),
            ledger = self.ledger.name(),
            "Anchor scheduler started"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Anchor scheduler stopping");
                    break;
                }
                _ = ticker.tick() => {}
                _ = self.kick.notified() => debug!("Anchor cycle requested"),
            }
            self.run_cycle(unix_now()).await;
        }
    }
}
