//! External Integrations
//!
//! Adapters for Google Sheets (the lead source) and Bitrix24 (the CRM).
//!
//! # Overview
//!
//! The sync engine depends only on the [`SheetClient`] and [`CrmClient`]
//! traits. The HTTP adapters below implement them against the real APIs.
//!
//! # Built-in Integrations
//!
//! - **Google Sheets**: REST v4 adapter reading a range and writing status cells
//! - **Bitrix24**: webhook REST adapter for `crm.lead.*` methods
//!
//! # Sync Flow
//!
//! 1. **Read**: fetch the sheet grid, retrying transient failures
//! 2. **Reconcile**: per row, map fields, search for duplicates, create or update
//! 3. **Write back**: record status, record id and timestamp in the row's status cells

pub mod bitrix24;
pub mod client;
pub mod google_sheets;
pub mod retry;

pub use bitrix24::Bitrix24Adapter;
pub use client::{CrmClient, CrmLead, SheetClient, StatusColumn};
pub use google_sheets::GoogleSheetsAdapter;
pub use retry::{with_retry, RetryConfig, RetryDecision, RetryFailure, RetryableError};
