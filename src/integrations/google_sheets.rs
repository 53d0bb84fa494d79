//! Google Sheets Integration Adapter
//!
//! Reads lead rows and writes status cells using the Sheets REST API (v4).

use super::client::{SheetClient, StatusColumn};
use crate::config::SheetsConfig;
use crate::metrics;
use crate::{Result, SheetSyncError};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info};

/// Per-request timeout for range reads (large sheets)
const READ_TIMEOUT: Duration = Duration::from_secs(30);
/// Per-request timeout for metadata fetches
const GET_TIMEOUT: Duration = Duration::from_secs(10);
/// Per-request timeout for cell writes
const WRITE_TIMEOUT: Duration = Duration::from_secs(15);

/// Google Sheets API client
pub struct GoogleSheetsAdapter {
    client: Client,
    config: SheetsConfig,
    auth_token: Option<String>,
}

/// `spreadsheets.values.get` response
#[derive(Debug, Deserialize)]
struct ValueRange {
    /// Omitted entirely when the range is empty
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

impl GoogleSheetsAdapter {
    /// Create a new Google Sheets adapter
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(config: SheetsConfig) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;

        let auth_token = config
            .token_env
            .as_ref()
            .and_then(|env_var| std::env::var(env_var.trim_start_matches('$')).ok());

        Ok(Self {
            client,
            config,
            auth_token,
        })
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn is_authenticated(&self) -> bool {
        self.auth_token.is_some()
    }

    pub fn spreadsheet_id(&self) -> &str {
        &self.config.spreadsheet_id
    }

    fn spreadsheet_url(&self) -> String {
        format!(
            "{}/spreadsheets/{}",
            self.config.base_url.trim_end_matches('/'),
            urlencoding::encode(&self.config.spreadsheet_id)
        )
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.auth_token {
            Some(ref token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn cell_to_string(value: serde_json::Value) -> String {
        match value {
            serde_json::Value::String(s) => s,
            serde_json::Value::Null => String::new(),
            other => other.to_string(),
        }
    }
}

#[async_trait]
impl SheetClient for GoogleSheetsAdapter {
    async fn fetch_rows(&self) -> Result<Vec<Vec<String>>> {
        let range = self.config.read_range();
        let url = format!(
            "{}/values/{}",
            self.spreadsheet_url(),
            urlencoding::encode(&range)
        );

        debug!(range = %range, "Reading Google Sheets range");

        let response = self
            .authorize(self.client.get(&url))
            .timeout(READ_TIMEOUT)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => {
                let value_range: ValueRange = response.json().await?;
                let grid: Vec<Vec<String>> = value_range
                    .values
                    .into_iter()
                    .map(|row| row.into_iter().map(Self::cell_to_string).collect())
                    .collect();
                info!(range = %range, rows = grid.len(), "Google Sheets read complete");
                Ok(grid)
            }
            StatusCode::NOT_FOUND => Err(SheetSyncError::Config(format!(
                "Spreadsheet or range not found: {} ({})",
                self.config.spreadsheet_id, range
            ))),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(SheetSyncError::Integration(
                "Google Sheets authentication failed".to_string(),
            )),
            StatusCode::TOO_MANY_REQUESTS => Err(SheetSyncError::Integration(
                "Google Sheets rate limit exceeded".to_string(),
            )),
            status => {
                let error_body = response.text().await.unwrap_or_default();
                Err(SheetSyncError::Integration(format!(
                    "Google Sheets API error: HTTP {}: {}",
                    status, error_body
                )))
            }
        }
    }

    async fn write_cell(&self, row_number: u32, column: StatusColumn, value: &str) -> Result<()> {
        self.write_cells(row_number, &[(column, value.to_string())])
            .await
    }

    async fn write_cells(&self, row_number: u32, cells: &[(StatusColumn, String)]) -> Result<()> {
        if cells.is_empty() {
            return Ok(());
        }

        let url = format!("{}/values:batchUpdate", self.spreadsheet_url());
        let data: Vec<serde_json::Value> = cells
            .iter()
            .map(|(column, value)| {
                json!({
                    "range": self.config.cell_address(row_number, *column),
                    "values": [[value]],
                })
            })
            .collect();
        let body = json!({
            "valueInputOption": "RAW",
            "data": data,
        });

        debug!(row = row_number, cells = cells.len(), "Writing status cells");

        let response = self
            .authorize(self.client.post(&url))
            .json(&body)
            .timeout(WRITE_TIMEOUT)
            .send()
            .await
            .map_err(|e| {
                metrics::record_api_error("write_cells", "sheets");
                SheetSyncError::WriteBack(format!("row {}: {}", row_number, e))
            })?;

        match response.status() {
            StatusCode::OK => Ok(()),
            status => {
                metrics::record_api_error("write_cells", "sheets");
                let error_body = response.text().await.unwrap_or_default();
                Err(SheetSyncError::WriteBack(format!(
                    "row {}: HTTP {}: {}",
                    row_number, status, error_body
                )))
            }
        }
    }

    async fn validate_connection(&self) -> Result<()> {
        let url = format!("{}?fields=spreadsheetId", self.spreadsheet_url());

        let response = self
            .authorize(self.client.get(&url))
            .timeout(GET_TIMEOUT)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(()),
            StatusCode::NOT_FOUND => Err(SheetSyncError::Config(format!(
                "Spreadsheet not found: {}",
                self.config.spreadsheet_id
            ))),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(SheetSyncError::Integration(
                "Google Sheets authentication failed".to_string(),
            )),
            status => Err(SheetSyncError::Integration(format!(
                "Google Sheets API error: HTTP {}",
                status
            ))),
        }
    }
}
