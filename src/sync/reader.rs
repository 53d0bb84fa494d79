//! Sheet reading with retry
//!
//! Fetches the grid through a [`SheetClient`], retrying transient failures
//! with exponential backoff, and parses it into rows.

use super::row::{Row, RowLayout};
use crate::integrations::{with_retry, RetryConfig, RetryDecision, RetryableError, SheetClient};
use crate::metrics;
use crate::{Result, SheetSyncError};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error};

/// Reads all data rows of the sheet
#[derive(Clone)]
pub struct SheetReader {
    sheet: Arc<dyn SheetClient>,
    retry: RetryConfig,
    layout: RowLayout,
    pending_label: String,
}

impl SheetReader {
    pub fn new(
        sheet: Arc<dyn SheetClient>,
        retry: RetryConfig,
        layout: RowLayout,
        pending_label: impl Into<String>,
    ) -> Self {
        Self {
            sheet,
            retry,
            layout,
            pending_label: pending_label.into(),
        }
    }

    /// Read every data row
    ///
    /// Makes up to `retry.max_attempts` attempts whatever the failure,
    /// configuration errors such as a 404 included. The last failure becomes [`SheetSyncError::SourceUnavailable`].
    pub async fn read_all(&self) -> Result<Vec<Row>> {
        let grid = with_retry(&self.retry, "read_sheet", || async {
            self.sheet.fetch_rows().await.map_err(FetchError)
        })
        .await
        .map_err(|failure| {
            metrics::record_api_error("fetch_rows", "sheets");
            error!(attempts = failure.attempts, error = %failure.error, "Failed to read sheet");
            SheetSyncError::SourceUnavailable {
                attempts: failure.attempts,
                message: failure.error.to_string(),
            }
        })?;

        let rows = self.layout.parse(&grid, &self.pending_label);
        debug!(grid_rows = grid.len(), data_rows = rows.len(), "Sheet parsed");
        Ok(rows)
    }
}

/// Fetch failure that always retries
struct FetchError(SheetSyncError);

impl RetryableError for FetchError {
    fn retry_decision(&self) -> RetryDecision {
        RetryDecision::Retry
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SheetsConfig;
    use crate::integrations::StatusColumn;
    use crate::sync::memory::MemorySheet;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    /// Sheet whose spreadsheet cannot be found
    #[derive(Default)]
    struct MissingSheet {
        reads: AtomicU32,
    }

    #[async_trait]
    impl SheetClient for MissingSheet {
        async fn fetch_rows(&self) -> Result<Vec<Vec<String>>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Err(SheetSyncError::Config(
                "spreadsheet not found (404)".to_string(),
            ))
        }

        async fn write_cell(&self, _: u32, _: StatusColumn, _: &str) -> Result<()> {
            Ok(())
        }

        async fn validate_connection(&self) -> Result<()> {
            Ok(())
        }
    }

    fn reader(sheet: Arc<MemorySheet>, attempts: u32) -> SheetReader {
        SheetReader::new(
            sheet,
            RetryConfig::new(attempts, Duration::from_millis(1000)),
            RowLayout::from_config(&SheetsConfig::default()).unwrap(),
            "pending",
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_failures() {
        let sheet = Arc::new(MemorySheet::from_rows(&[&["Name"], &["Acme"]]));
        sheet.fail_next_reads(2);

        let rows = reader(sheet.clone(), 3).read_all().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(sheet.read_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_attempts_are_source_unavailable() {
        let sheet = Arc::new(MemorySheet::from_rows(&[&["Name"], &["Acme"]]));
        sheet.fail_next_reads(5);

        let err = reader(sheet.clone(), 3).read_all().await.unwrap_err();
        match err {
            SheetSyncError::SourceUnavailable { attempts, message } => {
                assert_eq!(attempts, 3);
                assert!(message.contains("temporarily unavailable"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(sheet.read_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_found_is_retried() {
        let sheet = Arc::new(MissingSheet::default());
        let reader = SheetReader::new(
            sheet.clone(),
            RetryConfig::new(3, Duration::from_secs(1)),
            RowLayout::from_config(&SheetsConfig::default()).unwrap(),
            "pending",
        );

        let err = reader.read_all().await.unwrap_err();
        match err {
            SheetSyncError::SourceUnavailable { attempts, message } => {
                assert_eq!(attempts, 3);
                assert!(message.contains("spreadsheet not found (404)"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(sheet.reads.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_empty_sheet() {
        let sheet = Arc::new(MemorySheet::new(Vec::new()));
        assert!(reader(sheet, 3).read_all().await.unwrap().is_empty());
    }
}
