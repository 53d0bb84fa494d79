//! sheetsync configuration file handling
//!
//! Loads and manages the ~/.config/sheetsync/config.yaml file.

use super::mapping::{MappingConfig, StatusLabels};
use crate::integrations::StatusColumn;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerConfig {
    /// `host:port` string suitable for binding
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Column letters of the status cells written back by the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusColumnsConfig {
    #[serde(default = "default_sync_status_column")]
    pub sync_status: String,

    #[serde(default = "default_record_id_column")]
    pub record_id: String,

    #[serde(default = "default_last_sync_column")]
    pub last_sync: String,

    #[serde(default = "default_error_message_column")]
    pub error_message: String,
}

fn default_sync_status_column() -> String {
    "J".to_string()
}

fn default_record_id_column() -> String {
    "K".to_string()
}

fn default_last_sync_column() -> String {
    "L".to_string()
}

fn default_error_message_column() -> String {
    "M".to_string()
}

impl Default for StatusColumnsConfig {
    fn default() -> Self {
        Self {
            sync_status: default_sync_status_column(),
            record_id: default_record_id_column(),
            last_sync: default_last_sync_column(),
            error_message: default_error_message_column(),
        }
    }
}

impl StatusColumnsConfig {
    /// Column letter for a status cell
    pub fn letter(&self, column: StatusColumn) -> &str {
        match column {
            StatusColumn::SyncStatus => &self.sync_status,
            StatusColumn::RecordId => &self.record_id,
            StatusColumn::LastSync => &self.last_sync,
            StatusColumn::ErrorMessage => &self.error_message,
        }
    }
}

/// Google Sheets source settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SheetsConfig {
    /// Spreadsheet identifier from the sheet URL
    #[serde(default)]
    pub spreadsheet_id: String,

    /// Tab holding the rows
    #[serde(default = "default_sheet_name")]
    pub sheet_name: String,

    /// A1 range to read, without the tab name
    #[serde(default = "default_range")]
    pub range: String,

    /// 1-based row holding the column headers
    #[serde(default = "default_header_row")]
    pub header_row: u32,

    /// Sheets API base URL
    #[serde(default = "default_sheets_base_url")]
    pub base_url: String,

    /// Environment variable holding a bearer access token
    #[serde(default = "default_sheets_token_env")]
    pub token_env: Option<String>,

    /// Where status cells live
    #[serde(default)]
    pub status_columns: StatusColumnsConfig,
}

fn default_sheet_name() -> String {
    "Sheet1".to_string()
}

fn default_range() -> String {
    "A:Z".to_string()
}

fn default_header_row() -> u32 {
    1
}

fn default_sheets_base_url() -> String {
    "https://sheets.googleapis.com/v4".to_string()
}

fn default_sheets_token_env() -> Option<String> {
    Some("GOOGLE_SHEETS_TOKEN".to_string())
}

impl Default for SheetsConfig {
    fn default() -> Self {
        Self {
            spreadsheet_id: String::new(),
            sheet_name: default_sheet_name(),
            range: default_range(),
            header_row: default_header_row(),
            base_url: default_sheets_base_url(),
            token_env: default_sheets_token_env(),
            status_columns: StatusColumnsConfig::default(),
        }
    }
}

impl SheetsConfig {
    /// Range to read, qualified with the tab name unless already qualified
    pub fn read_range(&self) -> String {
        if self.range.contains('!') {
            self.range.clone()
        } else {
            format!("{}!{}", self.sheet_name, self.range)
        }
    }

    /// A1 address of a status cell
    pub fn cell_address(&self, row_number: u32, column: StatusColumn) -> String {
        format!(
            "{}!{}{}",
            self.sheet_name,
            self.status_columns.letter(column),
            row_number
        )
    }
}

/// Bitrix24 CRM settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrmConfig {
    /// Inbound webhook URL, e.g. `https://example.bitrix24.com/rest/1/abc/`
    #[serde(default)]
    pub webhook_url: String,

    /// Environment variable holding an OAuth access token, sent as `auth`
    #[serde(default = "default_crm_token_env")]
    pub token_env: Option<String>,
}

fn default_crm_token_env() -> Option<String> {
    Some("BITRIX24_ACCESS_TOKEN".to_string())
}

impl Default for CrmConfig {
    fn default() -> Self {
        Self {
            webhook_url: String::new(),
            token_env: default_crm_token_env(),
        }
    }
}

/// Synchronization behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Seconds between scheduled runs
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Total attempts for reading the sheet
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Delay after the first failed read, doubled per attempt
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Logical fields searched in the CRM before creating a lead
    #[serde(default = "default_duplicate_check_fields")]
    pub duplicate_check_fields: Vec<String>,
}

fn default_interval_secs() -> u64 {
    15 * 60
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_duplicate_check_fields() -> Vec<String> {
    vec!["email".to_string(), "phone".to_string()]
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            retry_attempts: default_retry_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            duplicate_check_fields: default_duplicate_check_fields(),
        }
    }
}

impl SyncConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter used when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Optional log file, appended to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// sheetsync configuration
///
/// Represents the complete ~/.config/sheetsync/config.yaml file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub sheets: SheetsConfig,

    #[serde(default)]
    pub crm: CrmConfig,

    #[serde(default)]
    pub sync: SyncConfig,

    #[serde(default)]
    pub mapping: MappingConfig,

    #[serde(default)]
    pub status_values: StatusLabels,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Create a configuration with every default applied
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from the default path (~/.config/sheetsync/config.yaml)
    pub fn load_default() -> Result<Self> {
        let path = Self::default_path();
        Self::load(&path)
    }

    /// Load configuration from a specific path
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(crate::SheetSyncError::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }

        tracing::info!(path = %path.display(), "Loading sheetsync configuration");

        let content = fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;

        tracing::debug!(
            rules = config.mapping.rules.len(),
            check_fields = config.sync.duplicate_check_fields.len(),
            "Configuration loaded successfully"
        );

        Ok(config)
    }

    /// Save configuration to a specific path
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        tracing::info!(path = %path.display(), "Saving sheetsync configuration");

        let yaml = serde_yaml::to_string(self)?;
        fs::write(path, yaml)?;

        Ok(())
    }

    /// Get the default config path (~/.config/sheetsync/config.yaml)
    pub fn default_path() -> PathBuf {
        let mut path = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(".config");
        path.push("sheetsync");
        path.push("config.yaml");
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_config_defaults() {
        let config = AppConfig::new();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.sheets.header_row, 1);
        assert_eq!(config.sync.retry_attempts, 3);
        assert_eq!(config.sync.retry_delay_ms, 1000);
        assert_eq!(config.sync.duplicate_check_fields, vec!["email", "phone"]);
        assert_eq!(config.status_values.synced, "synced");
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = r#"
sheets:
  spreadsheet_id: abc123
  header_row: 6
status_values:
  synced: "Đã đồng bộ"
  error: "Lỗi"
"#;
        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.sheets.spreadsheet_id, "abc123");
        assert_eq!(config.sheets.header_row, 6);
        assert_eq!(config.sheets.range, "A:Z");
        assert_eq!(config.status_values.synced, "Đã đồng bộ");
        assert_eq!(config.status_values.pending, "pending");
        assert_eq!(config.mapping.title_field, "TITLE");
    }

    #[test]
    fn test_save_and_load() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path();

        let mut config = AppConfig::new();
        config.sheets.spreadsheet_id = "sheet-1".to_string();
        config.sync.interval_secs = 60;

        config.save(path).unwrap();

        let loaded = AppConfig::load(path).unwrap();
        assert_eq!(loaded.sheets.spreadsheet_id, "sheet-1");
        assert_eq!(loaded.sync.interval(), Duration::from_secs(60));
        assert_eq!(loaded.mapping, config.mapping);
    }

    #[test]
    fn test_load_missing_file() {
        let result = AppConfig::load("/nonexistent/config.yaml");
        assert!(matches!(result, Err(crate::SheetSyncError::Config(_))));
    }

    #[test]
    fn test_default_path() {
        let path = AppConfig::default_path();
        assert!(path.ends_with("sheetsync/config.yaml"));
    }

    #[test]
    fn test_ranges_and_cells() {
        let mut sheets = SheetsConfig::default();
        assert_eq!(sheets.read_range(), "Sheet1!A:Z");
        assert_eq!(
            sheets.cell_address(7, StatusColumn::SyncStatus),
            "Sheet1!J7"
        );
        assert_eq!(
            sheets.cell_address(7, StatusColumn::ErrorMessage),
            "Sheet1!M7"
        );

        sheets.range = "Leads!A1:M500".to_string();
        assert_eq!(sheets.read_range(), "Leads!A1:M500");
    }
}
