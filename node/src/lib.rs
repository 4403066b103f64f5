// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
pub mod api;
pub mod clock;
pub mod config;
pub mod errors;
pub mod forensics;
pub mod ingest;
pub mod ledger;
pub mod persistence;
pub mod scheduler;
pub mod security;
pub mod server;
pub mod store;
pub mod telemetry;
