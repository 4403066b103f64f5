// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use tamperseal_kernel::status::ConnectionThresholds;

use crate::errors::CollectorError;

/// Which commitment protocol(s) the scheduler runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnchorProtocol {
    /// Commit every finalized slot once.
    Slot,
    /// Commit each device's rolling fingerprint every `anchor_interval_secs`.
    Legacy,
    Both,
}

impl AnchorProtocol {
    pub fn runs_slots(&self) -> bool {
        matches!(self, AnchorProtocol::Slot | AnchorProtocol::Both)
    }

    pub fn runs_legacy(&self) -> bool {
        matches!(self, AnchorProtocol::Legacy | AnchorProtocol::Both)
    }
}

impl FromStr for AnchorProtocol {
    type Err = CollectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "slot" | "slots" => Ok(AnchorProtocol::Slot),
            "legacy" => Ok(AnchorProtocol::Legacy),
            "both" => Ok(AnchorProtocol::Both),
            other => Err(CollectorError::Config(format!("unknown anchor protocol '{}'", other))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub bind_addr: SocketAddr,
    pub protocol: AnchorProtocol,
    /// Legacy protocol: minimum seconds between two commits of one device.
    pub anchor_interval_secs: u64,
    /// Scheduler cycle period.
    pub scheduler_period_secs: u64,
    /// Ledger gateway. `None` runs against the in-process ledger.
    pub ledger_url: Option<String>,
    pub ledger_timeout_secs: u64,
    /// Ledger submissions in flight per cycle.
    pub ledger_concurrency: usize,
    pub admin_token: Option<String>,
    pub snapshot_path: Option<PathBuf>,
    pub auto_snapshot_interval_secs: Option<u64>,
    pub connection: ConnectionThresholds,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 5000)),
            protocol: AnchorProtocol::Both,
            anchor_interval_secs: 3600,
            scheduler_period_secs: 600,
            ledger_url: None,
            ledger_timeout_secs: 20,
            ledger_concurrency: 4,
            admin_token: None,
            snapshot_path: None,
            auto_snapshot_interval_secs: None,
            connection: ConnectionThresholds::default(),
        }
    }
}

impl CollectorConfig {
    /// Defaults overridden by `TAMPERSEAL_*` environment variables.
    pub fn from_env() -> Result<Self, CollectorError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`CollectorConfig::from_env`] over an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, CollectorError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(v) = get("TAMPERSEAL_BIND_ADDR") {
            cfg.bind_addr = parse("TAMPERSEAL_BIND_ADDR", &v)?;
        }
        if let Some(v) = get("TAMPERSEAL_PROTOCOL") {
            cfg.protocol = v.parse()?;
        }
        if let Some(v) = get("TAMPERSEAL_ANCHOR_INTERVAL_SECS") {
            cfg.anchor_interval_secs = parse("TAMPERSEAL_ANCHOR_INTERVAL_SECS", &v)?;
        }
        if let Some(v) = get("TAMPERSEAL_SCHEDULER_PERIOD_SECS") {
            cfg.scheduler_period_secs = parse("TAMPERSEAL_SCHEDULER_PERIOD_SECS", &v)?;
        }
        cfg.ledger_url = get("TAMPERSEAL_LEDGER_URL");
        if let Some(v) = get("TAMPERSEAL_LEDGER_TIMEOUT_SECS") {
            cfg.ledger_timeout_secs = parse("TAMPERSEAL_LEDGER_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("TAMPERSEAL_LEDGER_CONCURRENCY") {
            cfg.ledger_concurrency = parse("TAMPERSEAL_LEDGER_CONCURRENCY", &v)?;
        }
        cfg.admin_token = get("TAMPERSEAL_ADMIN_TOKEN");
        cfg.snapshot_path = get("TAMPERSEAL_SNAPSHOT_PATH").map(PathBuf::from);
        if let Some(v) = get("TAMPERSEAL_AUTO_SNAPSHOT_SECS") {
            cfg.auto_snapshot_interval_secs = Some(parse("TAMPERSEAL_AUTO_SNAPSHOT_SECS", &v)?);
        }
        if let Some(v) = get("TAMPERSEAL_ONLINE_SECS") {
            cfg.connection.online_secs = parse("TAMPERSEAL_ONLINE_SECS", &v)?;
        }
        if let Some(v) = get("TAMPERSEAL_WAITING_SECS") {
            cfg.connection.waiting_secs = parse("TAMPERSEAL_WAITING_SECS", &v)?;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), CollectorError> {
        if self.scheduler_period_secs == 0 {
            return Err(CollectorError::Config("scheduler period must be at least 1s".into()));
        }
        if self.ledger_timeout_secs == 0 {
            return Err(CollectorError::Config("ledger timeout must be at least 1s".into()));
        }
        if self.ledger_concurrency == 0 {
            return Err(CollectorError::Config("ledger concurrency must be at least 1".into()));
        }
        if self.connection.waiting_secs < self.connection.online_secs {
            return Err(CollectorError::Config("waiting threshold below online threshold".into()));
        }
        if self.auto_snapshot_interval_secs.is_some() && self.snapshot_path.is_none() {
            return Err(CollectorError::Config("auto snapshot needs TAMPERSEAL_SNAPSHOT_PATH".into()));
        }
        Ok(())
    }
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T, CollectorError> {
    value
        .parse()
        .map_err(|_| CollectorError::Config(format!("{} has invalid value '{}'", key, value)))
}
