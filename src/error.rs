// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Codec error types.
use core::fmt;

/// Reason a pushdata scan stopped before consuming the whole script.
///
/// Never returned as a failure: decoding always yields whatever was read
/// before the problem. The reason is kept so callers can log it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecError {
    /// Script hex contained a non-hex character or an odd trailing nibble.
    InvalidHex { offset: usize },
    /// A length prefix (1, 2 or 4 bytes) was cut off by the end of the script.
    TruncatedLength { offset: usize, width: usize },
    /// A push declared more bytes than the script still holds.
    TruncatedPayload { offset: usize, declared: usize, available: usize },
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::InvalidHex { offset } => {
                write!(f, "invalid script hex at byte {}", offset)
            }
            CodecError::TruncatedLength { offset, width } => {
                write!(f, "{}-byte length prefix truncated at byte {}", width, offset)
            }
            CodecError::TruncatedPayload { offset, declared, available } => write!(
                f,
                "push at byte {} declares {} bytes but only {} remain",
                offset, declared, available
            ),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for CodecError {}
