// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
#![no_std]

//! tamperseal-kernel: deterministic, no_std building blocks for proving that a
//! device's log hash chain was not altered after it was anchored to a public ledger.

extern crate alloc;

#[cfg(any(test, feature = "std"))]
#[macro_use]
extern crate std;

pub mod error;
pub mod fingerprint;
pub mod pushdata;
pub mod chain;
pub mod forensic;
pub mod status;

pub use chain::{Block, ChainBuilder};
pub use forensic::{verify, select_window, ForensicReport};
pub use status::{evaluate, SecurityAssessment, SecurityStatus};

#[cfg(test)]
pub mod tests;
