//! sheetsync - Google Sheets to Bitrix24 lead synchronization
//!
//! Reads lead rows from a spreadsheet, creates or updates the matching
//! Bitrix24 leads, and writes each row's outcome back into the sheet so the
//! next run only touches rows that changed.
//!
//! # Architecture
//!
//! - **config**: YAML configuration, mapping rules and status labels
//! - **integrations**: Google Sheets and Bitrix24 adapters behind client traits
//! - **sync**: Field mapping, duplicate lookup, row reconciliation and runs
//! - **scheduler**: Background daemon running syncs on an interval
//! - **server**: HTTP API for manual triggers and status
//! - **metrics**: Prometheus metrics

// Core modules
pub mod config;
pub mod error;
pub mod logging;

// Components
pub mod integrations;
pub mod metrics;
pub mod scheduler;
pub mod server;
pub mod sync;

// Re-exports
pub use error::{Result, SheetSyncError};
