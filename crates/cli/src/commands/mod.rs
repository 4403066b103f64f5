// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
pub mod decode;
pub mod demo;
pub mod inspect;
pub mod status;
pub mod verify;

/// Unix seconds as RFC 3339, or `-` when absent.
pub fn format_ts(ts: Option<u64>) -> String {
    ts.and_then(|t| chrono::DateTime::from_timestamp(t as i64, 0))
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| "-".to_string())
}

/// First `n` characters of a fingerprint, for table cells.
pub fn short(fp: Option<&str>, n: usize) -> String {
    match fp {
        Some(fp) if fp.chars().count() > n => format!("{}…", fp.chars().take(n).collect::<String>()),
        Some(fp) => fp.to_string(),
        None => "-".to_string(),
    }
}
