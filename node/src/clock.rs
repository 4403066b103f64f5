// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.

/// Wall-clock unix seconds. Clamped at zero for clocks set before 1970.
pub fn unix_now() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

/// `YYYYmmdd_HHMMSS` rendering of a unix timestamp, used in backup file names.
pub fn format_unix(secs: u64) -> String {
    chrono::DateTime::from_timestamp(secs as i64, 0)
        .map(|dt| dt.format("%Y%m%d_%H%M%S").to_string())
        .unwrap_or_else(|| secs.to_string())
}
