//! Row reconciliation
//!
//! Decides what one sheet row needs (nothing, a new lead, or an update of an
//! existing lead), performs it against the CRM and records the outcome in the
//! row's status cells.

use super::duplicates::DuplicateResolver;
use super::mapper::FieldMapper;
use super::row::Row;
use super::status::StatusWriter;
use crate::config::StatusLabels;
use crate::integrations::CrmClient;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Message written to the sheet for rows that fail mapping
pub const INVALID_DATA_MESSAGE: &str = "Invalid or missing required data";

/// What happened to a row that did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowOutcome {
    /// Unchanged since the last run
    Skipped,
    /// A new lead was created
    Created { record_id: String },
    /// An existing lead found by duplicate search was updated
    Updated { record_id: String },
}

/// Why a row failed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RowError {
    /// Required data missing; nothing was sent to the CRM
    #[error("{0}")]
    Validation(String),

    /// The CRM rejected the create or update
    #[error("{0}")]
    Api(String),
}

/// Processes one row at a time
pub struct RowReconciler {
    crm: Arc<dyn CrmClient>,
    mapper: FieldMapper,
    resolver: DuplicateResolver,
    writer: StatusWriter,
    labels: Arc<StatusLabels>,
    check_fields: Arc<Vec<String>>,
}

impl RowReconciler {
    pub fn new(
        crm: Arc<dyn CrmClient>,
        mapper: FieldMapper,
        resolver: DuplicateResolver,
        writer: StatusWriter,
        labels: Arc<StatusLabels>,
        check_fields: Arc<Vec<String>>,
    ) -> Self {
        Self {
            crm,
            mapper,
            resolver,
            writer,
            labels,
            check_fields,
        }
    }

    /// Whether a row needs processing
    ///
    /// Only the status label is compared: rows marked synced or error are left
    /// alone until the status cell is set back to the pending label.
    pub fn has_changes(&self, row: &Row) -> bool {
        let status = row.sync_status.as_str();
        let settled = status == self.labels.synced || status == self.labels.error;
        !settled || status == self.labels.pending
    }

    /// Process one row
    ///
    /// Never propagates write-back failures; those are logged and the outcome
    /// of the CRM operation stands.
    pub async fn process(&self, row: &Row) -> Result<RowOutcome, RowError> {
        if !self.has_changes(row) {
            debug!(row = row.row_number, status = %row.sync_status, "Row unchanged, skipping");
            return Ok(RowOutcome::Skipped);
        }

        let payload = match self.mapper.map_row(row) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(row = row.row_number, error = %e, "Invalid row data");
                self.writer
                    .write_logged(
                        row.row_number,
                        &self.labels.error,
                        None,
                        Some(INVALID_DATA_MESSAGE),
                    )
                    .await;
                return Err(RowError::Validation(INVALID_DATA_MESSAGE.to_string()));
            }
        };

        let candidates = self
            .resolver
            .find_duplicates(&payload, &self.check_fields)
            .await;

        let result = match candidates.into_iter().next() {
            Some(existing) => {
                info!(
                    row = row.row_number,
                    lead_id = %existing.id,
                    "Duplicate found, updating existing lead"
                );
                self.crm
                    .update_lead(&existing.id, &payload)
                    .await
                    .map(|_| RowOutcome::Updated {
                        record_id: existing.id,
                    })
            }
            None => self
                .crm
                .create_lead(&payload)
                .await
                .map(|record_id| RowOutcome::Created { record_id }),
        };

        match result {
            Ok(outcome) => {
                let record_id = match &outcome {
                    RowOutcome::Created { record_id } | RowOutcome::Updated { record_id } => {
                        Some(record_id.as_str())
                    }
                    RowOutcome::Skipped => None,
                };
                self.writer
                    .write_logged(row.row_number, &self.labels.synced, record_id, None)
                    .await;
                Ok(outcome)
            }
            Err(e) => {
                let message = e.to_string();
                error!(row = row.row_number, error = %message, "Failed to sync row");
                self.writer
                    .write_logged(row.row_number, &self.labels.error, None, Some(&message))
                    .await;
                Err(RowError::Api(message))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MappingConfig;
    use crate::integrations::StatusColumn;
    use crate::sync::memory::{CrmCall, MemoryCrm, MemorySheet};
    use crate::sync::{FieldValue, LeadPayload};

    struct Fixture {
        sheet: Arc<MemorySheet>,
        crm: Arc<MemoryCrm>,
        reconciler: RowReconciler,
    }

    fn fixture() -> Fixture {
        let sheet = Arc::new(MemorySheet::new(Vec::new()));
        let crm = Arc::new(MemoryCrm::new());
        let mapping = Arc::new(MappingConfig::default());
        let reconciler = RowReconciler::new(
            crm.clone(),
            FieldMapper::new(mapping.clone()),
            DuplicateResolver::new(crm.clone(), mapping),
            StatusWriter::new(sheet.clone()),
            Arc::new(StatusLabels::default()),
            Arc::new(vec!["email".to_string(), "phone".to_string()]),
        );
        Fixture {
            sheet,
            crm,
            reconciler,
        }
    }

    fn pending_row(row_number: u32, name: &str, email: &str) -> Row {
        Row::new(row_number, "pending")
            .with_field("Name", name)
            .with_field("Email", email)
    }

    #[test]
    fn test_has_changes() {
        let f = fixture();
        assert!(f.reconciler.has_changes(&Row::new(2, "pending")));
        assert!(f.reconciler.has_changes(&Row::new(2, "needs review")));
        assert!(!f.reconciler.has_changes(&Row::new(2, "synced")));
        assert!(!f.reconciler.has_changes(&Row::new(2, "error")));
    }

    #[tokio::test]
    async fn test_creates_new_lead() {
        let f = fixture();
        let outcome = f
            .reconciler
            .process(&pending_row(2, "Acme", "a@acme.io"))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            RowOutcome::Created {
                record_id: "1".to_string()
            }
        );
        assert_eq!(
            f.sheet.status_cell(2, StatusColumn::SyncStatus).as_deref(),
            Some("synced")
        );
        assert_eq!(
            f.sheet.status_cell(2, StatusColumn::RecordId).as_deref(),
            Some("1")
        );
    }

    #[tokio::test]
    async fn test_updates_first_duplicate() {
        let f = fixture();
        let mut existing = LeadPayload::new("TITLE");
        existing.insert("EMAIL", FieldValue::Text("a@acme.io".to_string()));
        let id = f.crm.insert_lead(existing);

        let outcome = f
            .reconciler
            .process(&pending_row(3, "Acme Renamed", " A@Acme.io "))
            .await
            .unwrap();

        assert_eq!(outcome, RowOutcome::Updated { record_id: id.clone() });
        assert_eq!(f.crm.lead_count(), 1);
        assert_eq!(f.crm.lead(&id).unwrap().title(), "Acme Renamed");
        assert!(f
            .crm
            .calls()
            .iter()
            .all(|c| !matches!(c, CrmCall::Create { .. })));
    }

    #[tokio::test]
    async fn test_skips_settled_rows_without_calls() {
        let f = fixture();
        for status in ["synced", "error"] {
            let row = Row::new(4, status).with_field("Name", "Acme");
            assert_eq!(f.reconciler.process(&row).await, Ok(RowOutcome::Skipped));
        }
        assert!(f.crm.calls().is_empty());
        assert!(f.sheet.writes().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_row_marks_error() {
        let f = fixture();
        let row = Row::new(5, "pending").with_field("Email", "a@acme.io");

        let err = f.reconciler.process(&row).await.unwrap_err();
        assert_eq!(err, RowError::Validation(INVALID_DATA_MESSAGE.to_string()));
        assert!(f.crm.calls().is_empty());
        assert_eq!(
            f.sheet.status_cell(5, StatusColumn::SyncStatus).as_deref(),
            Some("error")
        );
        assert_eq!(
            f.sheet.status_cell(5, StatusColumn::ErrorMessage).as_deref(),
            Some(INVALID_DATA_MESSAGE)
        );
    }

    #[tokio::test]
    async fn test_crm_failure_marks_error() {
        let f = fixture();
        f.crm.fail_writes_for_title("Acme");

        let err = f
            .reconciler
            .process(&pending_row(6, "Acme", "a@acme.io"))
            .await
            .unwrap_err();

        assert!(matches!(err, RowError::Api(_)));
        assert_eq!(
            f.sheet.status_cell(6, StatusColumn::SyncStatus).as_deref(),
            Some("error")
        );
        let message = f.sheet.status_cell(6, StatusColumn::ErrorMessage).unwrap();
        assert!(message.contains("rejected"));
    }

    #[tokio::test]
    async fn test_write_back_failure_keeps_outcome() {
        let f = fixture();
        f.sheet.fail_writes_for_row(7);

        let outcome = f
            .reconciler
            .process(&pending_row(7, "Acme", "a@acme.io"))
            .await;

        assert!(matches!(outcome, Ok(RowOutcome::Created { .. })));
        assert_eq!(f.crm.lead_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_search_falls_through_to_create() {
        let f = fixture();
        let mut existing = LeadPayload::new("TITLE");
        existing.insert("EMAIL", FieldValue::Text("a@acme.io".to_string()));
        f.crm.insert_lead(existing);
        f.crm.fail_searches_on("EMAIL");

        let outcome = f
            .reconciler
            .process(&pending_row(8, "Acme", "a@acme.io"))
            .await
            .unwrap();

        assert!(matches!(outcome, RowOutcome::Created { .. }));
        assert_eq!(f.crm.lead_count(), 2);
    }
}
