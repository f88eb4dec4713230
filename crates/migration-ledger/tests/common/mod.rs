//! Shared test utilities for ledger integration tests.
//!
//! - `MockMetaSource`, an in-process stand-in for the source warehouse
//! - `LedgerHarness` for ledgers backed by a temp-dir store
//! - builders for job configs

pub mod builders;
pub mod harness;
pub mod meta_source;

pub use builders::*;
pub use harness::LedgerHarness;
pub use meta_source::MockMetaSource;
