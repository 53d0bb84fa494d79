//! In-memory sheet and CRM clients
//!
//! Test doubles for the unit tests and, with the `test-util` feature, for the
//! integration tests. Both clients record every call so behavior can be
//! asserted afterwards, and both can be told to fail.

use super::mapper::LeadPayload;
use crate::config::StatusColumnsConfig;
use crate::integrations::{CrmClient, CrmLead, SheetClient, StatusColumn};
use crate::sync::column_index;
use crate::{Result, SheetSyncError};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// A cell write observed by [`MemorySheet`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellWrite {
    pub row_number: u32,
    pub column: StatusColumn,
    pub value: String,
}

/// Sheet backed by an in-memory grid (row 1 of the sheet is `grid[0]`)
pub struct MemorySheet {
    grid: Mutex<Vec<Vec<String>>>,
    columns: StatusColumnsConfig,
    writes: Mutex<Vec<CellWrite>>,
    reads: AtomicU32,
    failing_reads: AtomicU32,
    failing_write_rows: Mutex<HashSet<u32>>,
    read_delay: Mutex<Option<Duration>>,
}

impl MemorySheet {
    pub fn new(grid: Vec<Vec<String>>) -> Self {
        Self {
            grid: Mutex::new(grid),
            columns: StatusColumnsConfig::default(),
            writes: Mutex::new(Vec::new()),
            reads: AtomicU32::new(0),
            failing_reads: AtomicU32::new(0),
            failing_write_rows: Mutex::new(HashSet::new()),
            read_delay: Mutex::new(None),
        }
    }

    /// Build a sheet from string slices
    pub fn from_rows(rows: &[&[&str]]) -> Self {
        Self::new(
            rows.iter()
                .map(|r| r.iter().map(|c| c.to_string()).collect())
                .collect(),
        )
    }

    pub fn with_columns(mut self, columns: StatusColumnsConfig) -> Self {
        self.columns = columns;
        self
    }

    /// Fail the next `count` reads with a transient error
    pub fn fail_next_reads(&self, count: u32) {
        self.failing_reads.store(count, Ordering::SeqCst);
    }

    /// Fail every write to the given sheet row
    pub fn fail_writes_for_row(&self, row_number: u32) {
        lock(&self.failing_write_rows).insert(row_number);
    }

    /// Delay every read, to hold a run open
    pub fn set_read_delay(&self, delay: Duration) {
        *lock(&self.read_delay) = Some(delay);
    }

    pub fn read_count(&self) -> u32 {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> Vec<CellWrite> {
        lock(&self.writes).clone()
    }

    /// Writes that targeted one sheet row
    pub fn writes_for_row(&self, row_number: u32) -> Vec<CellWrite> {
        self.writes()
            .into_iter()
            .filter(|w| w.row_number == row_number)
            .collect()
    }

    /// Current value of a status cell
    pub fn status_cell(&self, row_number: u32, column: StatusColumn) -> Option<String> {
        let index = column_index(self.columns.letter(column))?;
        let grid = lock(&self.grid);
        grid.get(row_number.checked_sub(1)? as usize)?
            .get(index)
            .cloned()
    }
}

#[async_trait]
impl SheetClient for MemorySheet {
    async fn fetch_rows(&self) -> Result<Vec<Vec<String>>> {
        self.reads.fetch_add(1, Ordering::SeqCst);

        let delay = *lock(&self.read_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let failing = self
            .failing_reads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if failing.is_ok() {
            return Err(SheetSyncError::Integration(
                "sheet temporarily unavailable".to_string(),
            ));
        }

        Ok(lock(&self.grid).clone())
    }

    async fn write_cell(&self, row_number: u32, column: StatusColumn, value: &str) -> Result<()> {
        if lock(&self.failing_write_rows).contains(&row_number) {
            return Err(SheetSyncError::WriteBack(format!(
                "row {} is protected",
                row_number
            )));
        }

        let letter = self.columns.letter(column);
        let index = column_index(letter)
            .ok_or_else(|| SheetSyncError::Config(format!("Invalid column '{}'", letter)))?;
        let row_index = row_number
            .checked_sub(1)
            .ok_or_else(|| SheetSyncError::WriteBack("row 0 does not exist".to_string()))?
            as usize;

        {
            let mut grid = lock(&self.grid);
            if grid.len() <= row_index {
                grid.resize(row_index + 1, Vec::new());
            }
            let row = &mut grid[row_index];
            if row.len() <= index {
                row.resize(index + 1, String::new());
            }
            row[index] = value.to_string();
        }

        lock(&self.writes).push(CellWrite {
            row_number,
            column,
            value: value.to_string(),
        });
        Ok(())
    }

    async fn validate_connection(&self) -> Result<()> {
        Ok(())
    }
}

/// A CRM call observed by [`MemoryCrm`]
#[derive(Debug, Clone, PartialEq)]
pub enum CrmCall {
    Create { title: String },
    Update { id: String, title: String },
    Find { field: String, value: String },
}

/// CRM holding leads in memory, with sequential ids starting at 1
pub struct MemoryCrm {
    leads: Mutex<Vec<(String, LeadPayload)>>,
    next_id: AtomicU64,
    calls: Mutex<Vec<CrmCall>>,
    failing_titles: Mutex<HashSet<String>>,
    failing_search_fields: Mutex<HashSet<String>>,
}

impl Default for MemoryCrm {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCrm {
    pub fn new() -> Self {
        Self {
            leads: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            calls: Mutex::new(Vec::new()),
            failing_titles: Mutex::new(HashSet::new()),
            failing_search_fields: Mutex::new(HashSet::new()),
        }
    }

    /// Seed an existing lead, returning its id
    pub fn insert_lead(&self, payload: LeadPayload) -> String {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst).to_string();
        lock(&self.leads).push((id.clone(), payload));
        id
    }

    /// Reject creates and updates for payloads with this title
    pub fn fail_writes_for_title(&self, title: impl Into<String>) {
        lock(&self.failing_titles).insert(title.into());
    }

    /// Fail every search on this field
    pub fn fail_searches_on(&self, field: impl Into<String>) {
        lock(&self.failing_search_fields).insert(field.into());
    }

    pub fn calls(&self) -> Vec<CrmCall> {
        lock(&self.calls).clone()
    }

    pub fn lead(&self, id: &str) -> Option<LeadPayload> {
        lock(&self.leads)
            .iter()
            .find(|(lead_id, _)| lead_id == id)
            .map(|(_, payload)| payload.clone())
    }

    pub fn lead_count(&self) -> usize {
        lock(&self.leads).len()
    }

    fn check_writable(&self, payload: &LeadPayload) -> Result<()> {
        let title = payload.title();
        if lock(&self.failing_titles).contains(&title) {
            return Err(SheetSyncError::Api(format!(
                "lead '{}' rejected by CRM",
                title
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl CrmClient for MemoryCrm {
    async fn create_lead(&self, payload: &LeadPayload) -> Result<String> {
        lock(&self.calls).push(CrmCall::Create {
            title: payload.title(),
        });
        self.check_writable(payload)?;
        Ok(self.insert_lead(payload.clone()))
    }

    async fn update_lead(&self, id: &str, payload: &LeadPayload) -> Result<()> {
        lock(&self.calls).push(CrmCall::Update {
            id: id.to_string(),
            title: payload.title(),
        });
        self.check_writable(payload)?;

        let mut leads = lock(&self.leads);
        match leads.iter_mut().find(|(lead_id, _)| lead_id == id) {
            Some((_, existing)) => {
                *existing = payload.clone();
                Ok(())
            }
            None => Err(SheetSyncError::Api(format!("lead {} not found", id))),
        }
    }

    async fn find_leads(&self, field: &str, value: &str) -> Result<Vec<CrmLead>> {
        lock(&self.calls).push(CrmCall::Find {
            field: field.to_string(),
            value: value.to_string(),
        });

        if lock(&self.failing_search_fields).contains(field) {
            return Err(SheetSyncError::Lookup(format!("search on {} failed", field)));
        }

        let leads = lock(&self.leads)
            .iter()
            .filter(|(_, payload)| {
                payload.get(field).and_then(|v| v.search_term()).as_deref() == Some(value)
            })
            .map(|(id, payload)| CrmLead {
                title: Some(payload.title()),
                ..CrmLead::new(id.clone())
            })
            .collect();
        Ok(leads)
    }

    async fn validate_connection(&self) -> Result<()> {
        Ok(())
    }

    async fn lead_fields(&self) -> Result<serde_json::Value> {
        Ok(serde_json::json!({
            "TITLE": { "type": "string", "isRequired": true },
            "EMAIL": { "type": "crm_multifield" },
            "PHONE": { "type": "crm_multifield" },
        }))
    }
}
