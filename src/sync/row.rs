//! Sheet rows
//!
//! Turns the raw grid returned by a [`SheetClient`](crate::integrations::SheetClient)
//! into [`Row`]s: header-keyed field values plus the row's status cells.

use crate::config::SheetsConfig;
use crate::integrations::StatusColumn;
use crate::{Result, SheetSyncError};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

/// One data row of the sheet
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Row {
    /// 1-based sheet row number, used to address status cells
    pub row_number: u32,

    /// `(header, value)` pairs in column order
    #[serde(serialize_with = "serialize_fields")]
    pub fields: Vec<(String, String)>,

    /// Sync-status cell; the pending label when the cell is blank
    pub sync_status: String,

    /// CRM id written by a previous run
    pub record_id: String,

    pub last_sync: String,

    pub error_message: String,
}

fn serialize_fields<S>(
    fields: &[(String, String)],
    serializer: S,
) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let mut map = serializer.serialize_map(Some(fields.len()))?;
    for (header, value) in fields {
        map.serialize_entry(header, value)?;
    }
    map.end()
}

impl Row {
    /// Create an empty row with the given status
    pub fn new(row_number: u32, sync_status: impl Into<String>) -> Self {
        Self {
            row_number,
            fields: Vec::new(),
            sync_status: sync_status.into(),
            record_id: String::new(),
            last_sync: String::new(),
            error_message: String::new(),
        }
    }

    /// Add a header/value pair
    pub fn with_field(mut self, header: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((header.into(), value.into()));
        self
    }

    /// Value under `header`, or `None` when the header is absent
    pub fn value(&self, header: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(h, _)| h == header)
            .map(|(_, v)| v.as_str())
    }
}

/// Zero-based index of a column letter ("A" -> 0, "Z" -> 25, "AA" -> 26)
pub fn column_index(letter: &str) -> Option<usize> {
    if letter.is_empty() || !letter.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }

    let mut index: usize = 0;
    for c in letter.chars() {
        let digit = (c.to_ascii_uppercase() as u8 - b'A') as usize + 1;
        index = index.checked_mul(26)?.checked_add(digit)?;
    }
    Some(index - 1)
}

/// Where data and status cells live in the fetched grid
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowLayout {
    /// 1-based header row
    pub header_row: u32,
    sync_status: usize,
    record_id: usize,
    last_sync: usize,
    error_message: usize,
}

impl RowLayout {
    /// Build the layout from sheet settings
    ///
    /// Fails when a status column is not a valid column letter.
    pub fn from_config(config: &SheetsConfig) -> Result<Self> {
        let index = |column: StatusColumn| {
            let letter = config.status_columns.letter(column);
            column_index(letter).ok_or_else(|| {
                SheetSyncError::Config(format!(
                    "Invalid {} column letter '{}'",
                    column, letter
                ))
            })
        };

        Ok(Self {
            header_row: config.header_row.max(1),
            sync_status: index(StatusColumn::SyncStatus)?,
            record_id: index(StatusColumn::RecordId)?,
            last_sync: index(StatusColumn::LastSync)?,
            error_message: index(StatusColumn::ErrorMessage)?,
        })
    }

    /// Parse a fetched grid into rows
    ///
    /// Rows above the header are ignored. Row `i` after the header has row
    /// number `header_row + i + 1`. Blank status cells read as `pending_label`.
    pub fn parse(&self, grid: &[Vec<String>], pending_label: &str) -> Vec<Row> {
        let header_index = (self.header_row - 1) as usize;
        let Some(headers) = grid.get(header_index) else {
            return Vec::new();
        };

        grid.iter()
            .skip(header_index + 1)
            .enumerate()
            .map(|(i, cells)| {
                let cell = |index: usize| {
                    cells
                        .get(index)
                        .map(|c| c.trim().to_string())
                        .unwrap_or_default()
                };

                let fields = headers
                    .iter()
                    .zip(cells.iter())
                    .filter(|(header, _)| !header.trim().is_empty())
                    .map(|(header, value)| (header.trim().to_string(), value.clone()))
                    .collect();

                let mut sync_status = cell(self.sync_status);
                if sync_status.is_empty() {
                    sync_status = pending_label.to_string();
                }

                Row {
                    row_number: self.header_row + i as u32 + 1,
                    fields,
                    sync_status,
                    record_id: cell(self.record_id),
                    last_sync: cell(self.last_sync),
                    error_message: cell(self.error_message),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(rows: &[&[&str]]) -> Vec<Vec<String>> {
        rows.iter()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    #[test]
    fn test_column_index() {
        assert_eq!(column_index("A"), Some(0));
        assert_eq!(column_index("j"), Some(9));
        assert_eq!(column_index("Z"), Some(25));
        assert_eq!(column_index("AA"), Some(26));
        assert_eq!(column_index("AM"), Some(38));
        assert_eq!(column_index(""), None);
        assert_eq!(column_index("1"), None);
        assert_eq!(column_index("A1"), None);
    }

    #[test]
    fn test_parse_reads_status_by_position() {
        let layout = RowLayout::from_config(&SheetsConfig::default()).unwrap();
        let grid = grid(&[
            &["Name", "Email", "", "", "", "", "", "", "", "Status", "Lead ID"],
            &["Acme", "a@x.io", "", "", "", "", "", "", "", "synced", "42"],
            &["Beta"],
        ]);

        let rows = layout.parse(&grid, "pending");
        assert_eq!(rows.len(), 2);

        assert_eq!(rows[0].row_number, 2);
        assert_eq!(rows[0].value("Name"), Some("Acme"));
        assert_eq!(rows[0].value("Email"), Some("a@x.io"));
        assert_eq!(rows[0].sync_status, "synced");
        assert_eq!(rows[0].record_id, "42");

        // Short rows: missing cells are absent, blank status is pending
        assert_eq!(rows[1].row_number, 3);
        assert_eq!(rows[1].value("Email"), None);
        assert_eq!(rows[1].sync_status, "pending");
        assert_eq!(rows[1].record_id, "");
    }

    #[test]
    fn test_parse_with_header_offset() {
        let config = SheetsConfig {
            header_row: 3,
            ..Default::default()
        };
        let layout = RowLayout::from_config(&config).unwrap();
        let grid = grid(&[&["Report"], &[], &["Name"], &["Acme"], &["Beta"]]);

        let rows = layout.parse(&grid, "pending");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].row_number, 4);
        assert_eq!(rows[1].row_number, 5);
        assert_eq!(rows[1].value("Name"), Some("Beta"));
    }

    #[test]
    fn test_parse_empty_grid() {
        let layout = RowLayout::from_config(&SheetsConfig::default()).unwrap();
        assert!(layout.parse(&[], "pending").is_empty());
        assert!(layout.parse(&grid(&[&["Name"]]), "pending").is_empty());
    }

    #[test]
    fn test_invalid_status_column() {
        let mut config = SheetsConfig::default();
        config.status_columns.record_id = "9".to_string();
        assert!(matches!(
            RowLayout::from_config(&config),
            Err(SheetSyncError::Config(_))
        ));
    }

    #[test]
    fn test_row_serializes_fields_as_map() {
        let row = Row::new(2, "pending").with_field("Name", "Acme");
        let value = serde_json::to_value(&row).unwrap();
        assert_eq!(value["fields"]["Name"], "Acme");
        assert_eq!(value["row_number"], 2);
    }
}
