//! Status write-back and reporting
//!
//! Writes the sync status, record id, timestamp and error message of a row
//! back to the sheet, and summarizes status labels across the sheet.

use super::row::Row;
use crate::config::StatusLabels;
use crate::integrations::{SheetClient, StatusColumn};
use crate::metrics;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;

/// Writes status cells for a row
#[derive(Clone)]
pub struct StatusWriter {
    sheet: Arc<dyn SheetClient>,
}

impl StatusWriter {
    pub fn new(sheet: Arc<dyn SheetClient>) -> Self {
        Self { sheet }
    }

    /// Write the status and the current timestamp, plus the record id and
    /// error message when present
    pub async fn write(
        &self,
        row_number: u32,
        status: &str,
        record_id: Option<&str>,
        error_message: Option<&str>,
    ) -> Result<()> {
        let mut cells = vec![
            (StatusColumn::SyncStatus, status.to_string()),
            (StatusColumn::LastSync, chrono::Utc::now().to_rfc3339()),
        ];
        if let Some(id) = record_id.filter(|id| !id.is_empty()) {
            cells.push((StatusColumn::RecordId, id.to_string()));
        }
        if let Some(message) = error_message.filter(|m| !m.is_empty()) {
            cells.push((StatusColumn::ErrorMessage, message.to_string()));
        }

        self.sheet.write_cells(row_number, &cells).await
    }

    /// Like [`write`](Self::write), but a failure is only logged
    pub async fn write_logged(
        &self,
        row_number: u32,
        status: &str,
        record_id: Option<&str>,
        error_message: Option<&str>,
    ) {
        if let Err(e) = self
            .write(row_number, status, record_id, error_message)
            .await
        {
            metrics::record_api_error("write_back", "sheets");
            error!(row = row_number, status = %status, error = %e, "Failed to update row status");
        }
    }
}

/// Row counts per status label
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSummary {
    pub total: u32,
    pub synced: u32,
    pub pending: u32,
    pub errors: u32,
    pub duplicates: u32,
    /// Rows whose status matches no known label
    pub other: u32,
    /// Rows carrying a CRM record id
    pub with_record_id: u32,
}

impl StatusSummary {
    /// Tally rows by status label
    pub fn from_rows(rows: &[Row], labels: &StatusLabels) -> Self {
        let mut summary = Self {
            total: rows.len() as u32,
            ..Default::default()
        };

        for row in rows {
            let status = row.sync_status.as_str();
            if status == labels.synced {
                summary.synced += 1;
            } else if status == labels.pending {
                summary.pending += 1;
            } else if status == labels.error {
                summary.errors += 1;
            } else if status == labels.duplicate {
                summary.duplicates += 1;
            } else {
                summary.other += 1;
            }

            if !row.record_id.is_empty() {
                summary.with_record_id += 1;
            }
        }

        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::memory::MemorySheet;

    #[tokio::test]
    async fn test_write_includes_optional_cells_when_present() {
        let sheet = Arc::new(MemorySheet::new(Vec::new()));
        let writer = StatusWriter::new(sheet.clone());

        writer.write(4, "synced", Some("42"), None).await.unwrap();
        let writes = sheet.writes_for_row(4);
        let columns: Vec<StatusColumn> = writes.iter().map(|w| w.column).collect();
        assert_eq!(
            columns,
            vec![
                StatusColumn::SyncStatus,
                StatusColumn::LastSync,
                StatusColumn::RecordId
            ]
        );
        assert_eq!(sheet.status_cell(4, StatusColumn::RecordId).as_deref(), Some("42"));

        writer
            .write(5, "error", None, Some("Invalid or missing required data"))
            .await
            .unwrap();
        assert_eq!(
            sheet.status_cell(5, StatusColumn::ErrorMessage).as_deref(),
            Some("Invalid or missing required data")
        );
        assert_eq!(sheet.status_cell(5, StatusColumn::RecordId), Some(String::new()));
    }

    #[tokio::test]
    async fn test_write_logged_swallows_failures() {
        let sheet = Arc::new(MemorySheet::new(Vec::new()));
        sheet.fail_writes_for_row(3);
        let writer = StatusWriter::new(sheet.clone());

        assert!(writer.write(3, "synced", None, None).await.is_err());
        writer.write_logged(3, "synced", None, None).await;
        assert!(sheet.writes().is_empty());
    }

    #[test]
    fn test_summary_from_rows() {
        let labels = StatusLabels::default();
        let mut synced = Row::new(2, "synced");
        synced.record_id = "7".to_string();
        let rows = vec![
            synced,
            Row::new(3, "pending"),
            Row::new(4, "error"),
            Row::new(5, "duplicate"),
            Row::new(6, "on hold"),
        ];

        let summary = StatusSummary::from_rows(&rows, &labels);
        assert_eq!(
            summary,
            StatusSummary {
                total: 5,
                synced: 1,
                pending: 1,
                errors: 1,
                duplicates: 1,
                other: 1,
                with_record_id: 1,
            }
        );
    }
}
