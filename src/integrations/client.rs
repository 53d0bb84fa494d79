//! Client traits for the sheet source and the CRM target
//!
//! The sync engine only talks to these traits, so the HTTP adapters can be
//! swapped for in-memory fakes in tests.

use crate::sync::LeadPayload;
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

/// Status cells written back to a sheet row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusColumn {
    SyncStatus,
    RecordId,
    LastSync,
    ErrorMessage,
}

impl StatusColumn {
    pub const ALL: [StatusColumn; 4] = [
        StatusColumn::SyncStatus,
        StatusColumn::RecordId,
        StatusColumn::LastSync,
        StatusColumn::ErrorMessage,
    ];
}

impl std::fmt::Display for StatusColumn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StatusColumn::SyncStatus => "sync_status",
            StatusColumn::RecordId => "record_id",
            StatusColumn::LastSync => "last_sync",
            StatusColumn::ErrorMessage => "error_message",
        };
        write!(f, "{}", name)
    }
}

/// A lead as returned by a CRM search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrmLead {
    #[serde(rename = "ID", deserialize_with = "string_or_number")]
    pub id: String,

    #[serde(rename = "TITLE", default)]
    pub title: Option<String>,

    /// Any other selected fields
    #[serde(flatten)]
    pub fields: HashMap<String, serde_json::Value>,
}

impl CrmLead {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: None,
            fields: HashMap::new(),
        }
    }
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number ID, got {}",
            other
        ))),
    }
}

/// Tabular data source holding the leads
#[async_trait]
pub trait SheetClient: Send + Sync {
    /// Fetch the configured range as a grid of cell strings, header row included
    async fn fetch_rows(&self) -> Result<Vec<Vec<String>>>;

    /// Overwrite one status cell of a row (1-based sheet row number)
    async fn write_cell(&self, row_number: u32, column: StatusColumn, value: &str) -> Result<()>;

    /// Overwrite several status cells of a row
    async fn write_cells(&self, row_number: u32, cells: &[(StatusColumn, String)]) -> Result<()> {
        for (column, value) in cells {
            self.write_cell(row_number, *column, value).await?;
        }
        Ok(())
    }

    /// Check that the sheet is reachable with the current credentials
    async fn validate_connection(&self) -> Result<()>;
}

/// CRM holding the lead records
#[async_trait]
pub trait CrmClient: Send + Sync {
    /// Create a lead, returning its identifier
    async fn create_lead(&self, payload: &LeadPayload) -> Result<String>;

    /// Replace the mapped fields of an existing lead
    async fn update_lead(&self, id: &str, payload: &LeadPayload) -> Result<()>;

    /// Find leads whose `field` equals `value`
    async fn find_leads(&self, field: &str, value: &str) -> Result<Vec<CrmLead>>;

    /// Check that the CRM is reachable with the current credentials
    async fn validate_connection(&self) -> Result<()>;

    /// Describe the lead fields the CRM accepts
    async fn lead_fields(&self) -> Result<serde_json::Value>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lead_id_from_string_or_number() {
        let lead: CrmLead =
            serde_json::from_str(r#"{"ID": "42", "TITLE": "Acme", "EMAIL": []}"#).unwrap();
        assert_eq!(lead.id, "42");
        assert_eq!(lead.title.as_deref(), Some("Acme"));
        assert!(lead.fields.contains_key("EMAIL"));

        let lead: CrmLead = serde_json::from_str(r#"{"ID": 7}"#).unwrap();
        assert_eq!(lead.id, "7");
        assert_eq!(lead.title, None);

        assert!(serde_json::from_str::<CrmLead>(r#"{"ID": null}"#).is_err());
    }

    #[test]
    fn test_status_column_display() {
        assert_eq!(StatusColumn::SyncStatus.to_string(), "sync_status");
        assert_eq!(StatusColumn::ALL.len(), 4);
    }
}
