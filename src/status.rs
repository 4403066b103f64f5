// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Security & connection status.
//!
//! Pure decision procedures. No side effects, callable at any rate.

use alloc::string::String;
use core::fmt;
use serde::{Deserialize, Serialize};

use crate::fingerprint::fingerprints_match;

/// Trust classification of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityStatus {
    NoData,
    Pending,
    Secure,
    Breach,
}

impl SecurityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityStatus::NoData => "no_data",
            SecurityStatus::Pending => "pending",
            SecurityStatus::Secure => "secure",
            SecurityStatus::Breach => "breach",
        }
    }
}

impl fmt::Display for SecurityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityAssessment {
    pub status: SecurityStatus,
    pub local: Option<String>,
    pub committed: Option<String>,
    #[serde(rename = "match")]
    pub matches: bool,
}

/// Legacy-protocol view of a device.
pub trait TrackedFingerprints {
    /// Latest value the device reported. Moves on every report.
    fn current_fingerprint(&self) -> Option<&str>;
    /// Value carried by the last successful commit.
    fn committed_fingerprint(&self) -> Option<&str>;
    /// Copy of the device's fingerprint taken when that commit succeeded.
    fn fingerprint_at_commit(&self) -> Option<&str>;
}

/// Device verdict, first match wins:
///
/// 1. nothing reported, nothing committed: `NoData`
/// 2. never committed: `Pending`
/// 3. no report since the commit: `Pending`
/// 4. committed value equals the copy frozen at commit time: `Secure`
/// 5. otherwise: `Breach`
///
/// The live `current_fingerprint` only decides presence. An honest device
/// advancing its chain after a commit stays secure.
pub fn evaluate<D: TrackedFingerprints + ?Sized>(device: &D) -> SecurityAssessment {
    let current = present(device.current_fingerprint());
    let committed = present(device.committed_fingerprint());

    let (status, matches) = match (current, committed) {
        (None, None) => (SecurityStatus::NoData, false),
        (_, None) | (None, Some(_)) => (SecurityStatus::Pending, false),
        (Some(_), Some(committed)) => match present(device.fingerprint_at_commit()) {
            Some(frozen) if fingerprints_match(committed, frozen) => (SecurityStatus::Secure, true),
            _ => (SecurityStatus::Breach, false),
        },
    };

    SecurityAssessment {
        status,
        local: current.map(String::from),
        committed: committed.map(String::from),
        matches,
    }
}

fn present(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.is_empty())
}

/// Pairwise decision table for a reported value against a committed one,
/// first match wins:
///
/// | current | committed | status    |
/// |---------|-----------|-----------|
/// | absent  | absent    | `NoData`  |
/// | any     | absent    | `Pending` |
/// | absent  | present   | `Pending` |
/// | equal   | equal     | `Secure`  |
/// | differs | differs   | `Breach`  |
///
/// Empty strings count as absent.
pub fn evaluate_pair(current: Option<&str>, committed: Option<&str>) -> SecurityAssessment {
    let current = present(current);
    let committed = present(committed);

    let (status, matches) = match (current, committed) {
        (None, None) => (SecurityStatus::NoData, false),
        (_, None) | (None, Some(_)) => (SecurityStatus::Pending, false),
        (Some(local), Some(frozen)) => {
            if fingerprints_match(local, frozen) {
                (SecurityStatus::Secure, true)
            } else {
                (SecurityStatus::Breach, false)
            }
        }
    };

    SecurityAssessment {
        status,
        local: current.map(String::from),
        committed: committed.map(String::from),
        matches,
    }
}

/// Folds per-slot (or per-protocol) verdicts into one device verdict.
///
/// Any breach wins. Otherwise one verified commitment makes the device secure,
/// then pending, then no data.
pub fn aggregate<I: IntoIterator<Item = SecurityStatus>>(statuses: I) -> SecurityStatus {
    let mut result = SecurityStatus::NoData;
    for status in statuses {
        result = match (result, status) {
            (_, SecurityStatus::Breach) | (SecurityStatus::Breach, _) => return SecurityStatus::Breach,
            (SecurityStatus::Secure, _) | (_, SecurityStatus::Secure) => SecurityStatus::Secure,
            (SecurityStatus::Pending, _) | (_, SecurityStatus::Pending) => SecurityStatus::Pending,
            _ => SecurityStatus::NoData,
        };
    }
    result
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Online,
    Waiting,
    Offline,
}

/// Seconds since last report at which a device stops being online / waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionThresholds {
    pub online_secs: u64,
    pub waiting_secs: u64,
}

impl Default for ConnectionThresholds {
    fn default() -> Self {
        Self {
            online_secs: 11,
            waiting_secs: 20,
        }
    }
}

pub fn connection_status(
    last_seen: Option<u64>,
    now: u64,
    thresholds: ConnectionThresholds,
) -> ConnectionStatus {
    let Some(seen) = last_seen else {
        return ConnectionStatus::Offline;
    };
    let elapsed = now.saturating_sub(seen);
    if elapsed <= thresholds.online_secs {
        ConnectionStatus::Online
    } else if elapsed <= thresholds.waiting_secs {
        ConnectionStatus::Waiting
    } else {
        ConnectionStatus::Offline
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate() {
        use SecurityStatus::*;
        assert_eq!(aggregate([]), NoData);
        assert_eq!(aggregate([Pending, NoData]), Pending);
        assert_eq!(aggregate([Pending, Secure]), Secure);
        assert_eq!(aggregate([Secure, Breach, Pending]), Breach);
    }

    #[test]
    fn test_connection_thresholds() {
        let t = ConnectionThresholds::default();
        assert_eq!(connection_status(None, 100, t), ConnectionStatus::Offline);
        assert_eq!(connection_status(Some(100), 111, t), ConnectionStatus::Online);
        assert_eq!(connection_status(Some(100), 112, t), ConnectionStatus::Waiting);
        assert_eq!(connection_status(Some(100), 120, t), ConnectionStatus::Waiting);
        assert_eq!(connection_status(Some(100), 121, t), ConnectionStatus::Offline);
        // clock skew: report stamped in the future
        assert_eq!(connection_status(Some(200), 100, t), ConnectionStatus::Online);
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&SecurityStatus::NoData).unwrap();
        assert_eq!(json, "\"no_data\"");
    }
}
