//! FraudGuard
//!
//! Command-line entry point for the fraud model lifecycle service. The
//! lifecycle itself lives in `fraudguard-core`; the HTTP surface lives in
//! `fraudguard-api`.

pub mod cli;
