// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use crate::status::{evaluate, evaluate_pair, SecurityStatus, TrackedFingerprints};
use std::string::String;

struct Device {
    current: Option<String>,
    committed: Option<String>,
    at_commit: Option<String>,
}

impl Device {
    fn new(current: Option<&str>, committed: Option<&str>, at_commit: Option<&str>) -> Self {
        Self {
            current: current.map(String::from),
            committed: committed.map(String::from),
            at_commit: at_commit.map(String::from),
        }
    }
}

impl TrackedFingerprints for Device {
    fn current_fingerprint(&self) -> Option<&str> {
        self.current.as_deref()
    }

    fn committed_fingerprint(&self) -> Option<&str> {
        self.committed.as_deref()
    }

    fn fingerprint_at_commit(&self) -> Option<&str> {
        self.at_commit.as_deref()
    }
}

#[test]
fn test_decision_table() {
    assert_eq!(evaluate_pair(None, None).status, SecurityStatus::NoData);
    assert_eq!(evaluate_pair(Some("abc"), None).status, SecurityStatus::Pending);
    assert_eq!(evaluate_pair(None, Some("abc")).status, SecurityStatus::Pending);
    assert_eq!(evaluate_pair(Some("abc"), Some("ABC")).status, SecurityStatus::Secure);
    assert_eq!(evaluate_pair(Some("abc"), Some("def")).status, SecurityStatus::Breach);
}

#[test]
fn test_empty_strings_are_absent() {
    assert_eq!(evaluate_pair(Some(""), Some("")).status, SecurityStatus::NoData);
    assert_eq!(evaluate_pair(Some("abc"), Some("")).status, SecurityStatus::Pending);
}

#[test]
fn test_device_decision_order() {
    assert_eq!(evaluate(&Device::new(None, None, None)).status, SecurityStatus::NoData);
    assert_eq!(evaluate(&Device::new(Some("abc"), None, None)).status, SecurityStatus::Pending);
    assert_eq!(
        evaluate(&Device::new(None, Some("abc"), Some("abc"))).status,
        SecurityStatus::Pending
    );
    assert_eq!(
        evaluate(&Device::new(Some("abc"), Some("ABC"), Some("abc"))).status,
        SecurityStatus::Secure
    );
}

#[test]
fn test_advanced_report_stays_secure() {
    let device = Device::new(Some("def"), Some("abc"), Some("abc"));
    let assessment = evaluate(&device);
    assert_eq!(assessment.status, SecurityStatus::Secure);
    assert!(assessment.matches);
    assert_eq!(assessment.local.as_deref(), Some("def"));
    assert_eq!(assessment.committed.as_deref(), Some("abc"));
}

#[test]
fn test_committed_value_differing_from_commit_time_copy_is_breach() {
    let device = Device::new(Some("abc"), Some("def"), Some("abc"));
    let assessment = evaluate(&device);
    assert_eq!(assessment.status, SecurityStatus::Breach);
    assert!(!assessment.matches);

    let missing_copy = Device::new(Some("abc"), Some("abc"), None);
    assert_eq!(evaluate(&missing_copy).status, SecurityStatus::Breach);
}

#[test]
fn test_evaluate_is_pure() {
    let device = Device::new(Some("abc"), Some("def"), Some("abc"));
    let first = evaluate(&device);
    for _ in 0..100 {
        assert_eq!(evaluate(&device), first);
    }
    assert_eq!(device.current.as_deref(), Some("abc"));
}

#[test]
fn test_assessment_json_uses_match_key() {
    let json = serde_json::to_value(evaluate_pair(Some("a"), Some("a"))).unwrap();
    assert_eq!(json["status"], "secure");
    assert_eq!(json["match"], true);
}
