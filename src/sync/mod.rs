//! Synchronization engine
//!
//! Reconciles sheet rows with CRM leads.
//!
//! # Components
//!
//! - [`FieldMapper`]: row -> normalized [`LeadPayload`]
//! - [`DuplicateResolver`]: existing leads sharing a check field value
//! - [`RowReconciler`]: skip, create or update one row, then write its status back
//! - [`SheetReader`]: retrying grid fetch and row parsing
//! - [`SyncEngine`]: a whole run, guarded so only one runs at a time
//!
//! # Example
//!
//! ```no_run
//! use sheetsync::config::AppConfig;
//! use sheetsync::integrations::{Bitrix24Adapter, GoogleSheetsAdapter};
//! use sheetsync::sync::{SyncEngine, SyncSettings};
//! use std::sync::Arc;
//!
//! # async fn example() -> sheetsync::Result<()> {
//! let config = AppConfig::load_default()?;
//! let engine = SyncEngine::new(
//!     Arc::new(GoogleSheetsAdapter::new(config.sheets.clone())?),
//!     Arc::new(Bitrix24Adapter::new(config.crm.clone())?),
//!     SyncSettings::from_config(&config)?,
//! );
//!
//! let result = engine.run().await?;
//! println!("created {} leads", result.stats.created);
//! # Ok(())
//! # }
//! ```

pub mod duplicates;
pub mod engine;
pub mod mapper;
#[cfg(any(test, feature = "test-util"))]
pub mod memory;
pub mod reader;
pub mod reconciler;
pub mod row;
pub mod status;

pub use duplicates::DuplicateResolver;
pub use engine::{ResetReport, RunResult, SyncEngine, SyncSettings, SyncStats};
pub use mapper::{FieldMapper, FieldValue, LeadPayload};
pub use reader::SheetReader;
pub use reconciler::{RowError, RowOutcome, RowReconciler, INVALID_DATA_MESSAGE};
pub use row::{column_index, Row, RowLayout};
pub use status::{StatusSummary, StatusWriter};
