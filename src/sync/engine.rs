//! Sync run orchestration
//!
//! [`SyncEngine`] ties the reader, reconciler and status writer together and
//! owns the single-flight guard shared by every trigger (scheduler, HTTP, CLI).

use super::duplicates::DuplicateResolver;
use super::mapper::FieldMapper;
use super::reader::SheetReader;
use super::reconciler::{RowError, RowOutcome, RowReconciler};
use super::row::{Row, RowLayout};
use super::status::{StatusSummary, StatusWriter};
use crate::config::{AppConfig, MappingConfig, StatusLabels};
use crate::integrations::{CrmClient, RetryConfig, SheetClient};
use crate::metrics;
use crate::{Result, SheetSyncError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{error, info, warn};

/// Engine settings, validated once and shared read-only
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub mapping: MappingConfig,
    pub labels: StatusLabels,
    pub check_fields: Vec<String>,
    pub retry: RetryConfig,
    pub layout: RowLayout,
}

impl SyncSettings {
    /// Extract engine settings from the application config
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Ok(Self {
            mapping: config.mapping.clone(),
            labels: config.status_values.clone(),
            check_fields: config.sync.duplicate_check_fields.clone(),
            retry: RetryConfig::new(config.sync.retry_attempts, config.sync.retry_delay()),
            layout: RowLayout::from_config(&config.sheets)?,
        })
    }
}

/// Counters for one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStats {
    pub total: u32,
    pub created: u32,
    pub updated: u32,
    pub skipped: u32,
    pub errors: u32,
    /// Rows whose duplicate lookup found an existing lead
    pub duplicates: u32,
}

impl SyncStats {
    /// Count one processed row
    pub fn record(&mut self, result: &std::result::Result<RowOutcome, RowError>) {
        match result {
            Ok(RowOutcome::Skipped) => self.skipped += 1,
            Ok(RowOutcome::Created { .. }) => self.created += 1,
            Ok(RowOutcome::Updated { .. }) => {
                self.updated += 1;
                self.duplicates += 1;
            }
            Err(_) => self.errors += 1,
        }
    }
}

/// Result of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub success: bool,
    pub stats: SyncStats,
    /// Set only when the sheet could not be read
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
    /// RFC 3339 completion time
    pub timestamp: String,
}

impl RunResult {
    fn finish(success: bool, stats: SyncStats, error: Option<String>, started: Instant) -> Self {
        let duration = started.elapsed();
        metrics::record_run(
            if success { "success" } else { "failed" },
            duration.as_secs_f64(),
        );
        Self {
            success,
            stats,
            error,
            duration_ms: duration.as_millis() as u64,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Outcome of resetting every row to pending
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetReport {
    pub rows_reset: u32,
    pub failed: u32,
}

/// The synchronization engine
pub struct SyncEngine {
    sheet: Arc<dyn SheetClient>,
    crm: Arc<dyn CrmClient>,
    settings: Arc<SyncSettings>,
    reader: SheetReader,
    reconciler: RowReconciler,
    writer: StatusWriter,
    guard: Arc<Semaphore>,
}

impl SyncEngine {
    pub fn new(
        sheet: Arc<dyn SheetClient>,
        crm: Arc<dyn CrmClient>,
        settings: SyncSettings,
    ) -> Self {
        let settings = Arc::new(settings);
        let mapping = Arc::new(settings.mapping.clone());
        let labels = Arc::new(settings.labels.clone());
        let writer = StatusWriter::new(sheet.clone());

        let reader = SheetReader::new(
            sheet.clone(),
            settings.retry.clone(),
            settings.layout.clone(),
            settings.labels.pending.clone(),
        );
        let reconciler = RowReconciler::new(
            crm.clone(),
            FieldMapper::new(mapping.clone()),
            DuplicateResolver::new(crm.clone(), mapping),
            writer.clone(),
            labels,
            Arc::new(settings.check_fields.clone()),
        );

        Self {
            sheet,
            crm,
            settings,
            reader,
            reconciler,
            writer,
            guard: Arc::new(Semaphore::new(1)),
        }
    }

    pub fn sheet(&self) -> &Arc<dyn SheetClient> {
        &self.sheet
    }

    pub fn crm(&self) -> &Arc<dyn CrmClient> {
        &self.crm
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Whether a run or reset currently holds the guard
    pub fn is_running(&self) -> bool {
        self.guard.available_permits() == 0
    }

    fn try_acquire(&self, operation: &str) -> Result<OwnedSemaphorePermit> {
        self.guard.clone().try_acquire_owned().map_err(|_| {
            info!(operation = %operation, "Sync already in progress, skipping");
            metrics::record_run_skipped();
            SheetSyncError::SyncInProgress
        })
    }

    /// Run one synchronization pass
    ///
    /// Returns [`SheetSyncError::SyncInProgress`] without touching the sheet or
    /// the CRM when another run holds the guard. Otherwise always returns a
    /// [`RunResult`]; a sheet that cannot be read yields `success: false`.
    pub async fn run(&self) -> Result<RunResult> {
        let _permit = self.try_acquire("sync")?;
        Ok(self.run_guarded().await)
    }

    async fn run_guarded(&self) -> RunResult {
        let started = Instant::now();
        let mut stats = SyncStats::default();

        info!("Starting data synchronization");

        let rows = match self.reader.read_all().await {
            Ok(rows) => rows,
            Err(e) => {
                error!(error = %e, "Sync failed");
                return RunResult::finish(false, stats, Some(e.to_string()), started);
            }
        };

        if rows.is_empty() {
            warn!("No data found to sync");
            return RunResult::finish(true, stats, None, started);
        }

        stats.total = rows.len() as u32;
        info!(rows = stats.total, "Processing rows");

        for row in &rows {
            let result = self.reconciler.process(row).await;
            metrics::record_row(match &result {
                Ok(RowOutcome::Skipped) => "skipped",
                Ok(RowOutcome::Created { .. }) => "created",
                Ok(RowOutcome::Updated { .. }) => "updated",
                Err(_) => "error",
            });
            stats.record(&result);
        }

        let result = RunResult::finish(true, stats, None, started);
        info!(
            total = stats.total,
            created = stats.created,
            updated = stats.updated,
            skipped = stats.skipped,
            errors = stats.errors,
            duplicates = stats.duplicates,
            duration_ms = result.duration_ms,
            "Sync completed"
        );
        result
    }

    /// Count rows by status label
    pub async fn status_summary(&self) -> Result<StatusSummary> {
        let rows = self.reader.read_all().await?;
        Ok(StatusSummary::from_rows(&rows, &self.settings.labels))
    }

    /// Mark every row pending so the next run processes it again
    ///
    /// Holds the guard, so it never interleaves with a run.
    pub async fn reset_status(&self) -> Result<ResetReport> {
        let _permit = self.try_acquire("reset")?;
        let rows = self.reader.read_all().await?;
        let mut report = ResetReport::default();

        for row in &rows {
            match self
                .writer
                .write(row.row_number, &self.settings.labels.pending, None, None)
                .await
            {
                Ok(()) => report.rows_reset += 1,
                Err(e) => {
                    warn!(row = row.row_number, error = %e, "Failed to reset row status");
                    report.failed += 1;
                }
            }
        }

        info!(
            rows_reset = report.rows_reset,
            failed = report.failed,
            "All statuses reset to pending"
        );
        Ok(report)
    }

    /// First `limit` parsed rows, without processing them
    pub async fn preview(&self, limit: usize) -> Result<Vec<Row>> {
        let mut rows = self.reader.read_all().await?;
        rows.truncate(limit);
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrations::StatusColumn;
    use crate::sync::memory::{MemoryCrm, MemorySheet};
    use std::time::Duration;

    fn settings() -> SyncSettings {
        let mut config = AppConfig::new();
        config.sync.retry_delay_ms = 10;
        SyncSettings::from_config(&config).unwrap()
    }

    fn engine(sheet: Arc<MemorySheet>, crm: Arc<MemoryCrm>) -> Arc<SyncEngine> {
        Arc::new(SyncEngine::new(sheet, crm, settings()))
    }

    fn sheet() -> Arc<MemorySheet> {
        Arc::new(MemorySheet::from_rows(&[
            &["Name", "Email", "Phone"],
            &["Acme", "a@acme.io", ""],
            &["", "nobody@x.io", ""],
            &["Beta", "b@beta.io", "", "", "", "", "", "", "", "synced", "9"],
        ]))
    }

    #[test]
    fn test_stats_record() {
        let mut stats = SyncStats::default();
        stats.record(&Ok(RowOutcome::Skipped));
        stats.record(&Ok(RowOutcome::Created {
            record_id: "1".to_string(),
        }));
        stats.record(&Ok(RowOutcome::Updated {
            record_id: "2".to_string(),
        }));
        stats.record(&Err(RowError::Api("boom".to_string())));

        assert_eq!(
            stats,
            SyncStats {
                total: 0,
                created: 1,
                updated: 1,
                skipped: 1,
                errors: 1,
                duplicates: 1,
            }
        );
    }

    #[tokio::test]
    async fn test_run_counts_each_row_once() {
        let engine = engine(sheet(), Arc::new(MemoryCrm::new()));

        let result = engine.run().await.unwrap();
        assert!(result.success);
        assert_eq!(result.error, None);
        assert_eq!(result.stats.total, 3);
        assert_eq!(result.stats.created, 1);
        assert_eq!(result.stats.errors, 1);
        assert_eq!(result.stats.skipped, 1);
        assert!(!engine.is_running());
    }

    #[tokio::test]
    async fn test_concurrent_run_is_rejected() {
        let sheet = sheet();
        sheet.set_read_delay(Duration::from_millis(200));
        let engine = engine(sheet.clone(), Arc::new(MemoryCrm::new()));

        let first = tokio::spawn({
            let engine = engine.clone();
            async move { engine.run().await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(engine.is_running());
        assert!(matches!(
            engine.run().await,
            Err(SheetSyncError::SyncInProgress)
        ));
        assert!(matches!(
            engine.reset_status().await,
            Err(SheetSyncError::SyncInProgress)
        ));
        // The rejected calls never touched the sheet
        assert_eq!(sheet.read_count(), 1);

        assert!(first.await.unwrap().unwrap().success);
        assert!(!engine.is_running());
    }

    #[tokio::test]
    async fn test_status_summary_and_reset() {
        let sheet = sheet();
        let engine = engine(sheet.clone(), Arc::new(MemoryCrm::new()));
        engine.run().await.unwrap();

        let summary = engine.status_summary().await.unwrap();
        assert_eq!(summary.total, 3);
        assert_eq!(summary.synced, 2);
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.with_record_id, 2);

        let report = engine.reset_status().await.unwrap();
        assert_eq!(report.rows_reset, 3);
        assert_eq!(report.failed, 0);
        assert_eq!(
            sheet.status_cell(4, StatusColumn::SyncStatus).as_deref(),
            Some("pending")
        );

        let summary = engine.status_summary().await.unwrap();
        assert_eq!(summary.pending, 3);
    }

    #[tokio::test]
    async fn test_preview_limits_rows() {
        let engine = engine(sheet(), Arc::new(MemoryCrm::new()));
        let rows = engine.preview(2).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].row_number, 2);
    }
}
