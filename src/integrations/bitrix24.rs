//! Bitrix24 Integration Adapter
//!
//! Creates, updates and searches CRM leads through the Bitrix24 REST API.
//! Every call is a POST to `{webhook_url}{method}` with JSON parameters;
//! the response carries either `result` or `error`/`error_description`.

use super::client::{CrmClient, CrmLead};
use crate::config::CrmConfig;
use crate::metrics;
use crate::sync::LeadPayload;
use crate::{Result, SheetSyncError};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::{debug, info};

/// Per-request timeout for list/search operations
const SEARCH_TIMEOUT: Duration = Duration::from_secs(30);
/// Per-request timeout for metadata fetches
const GET_TIMEOUT: Duration = Duration::from_secs(10);
/// Per-request timeout for create/update operations
const WRITE_TIMEOUT: Duration = Duration::from_secs(15);

/// Fields fetched for duplicate candidates
const LEAD_SELECT: [&str; 7] = [
    "ID",
    "TITLE",
    "EMAIL",
    "PHONE",
    "COMPANY_TITLE",
    "STATUS_ID",
    "ASSIGNED_BY_ID",
];

/// Bitrix24 REST client
pub struct Bitrix24Adapter {
    client: Client,
    webhook_url: String,
    auth_token: Option<String>,
}

/// Envelope of every Bitrix24 REST response
#[derive(Debug, Deserialize)]
struct BitrixResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

impl Bitrix24Adapter {
    /// Create a new Bitrix24 adapter
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(config: CrmConfig) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;

        let mut webhook_url = config.webhook_url.clone();
        if !webhook_url.ends_with('/') {
            webhook_url.push('/');
        }

        let auth_token = config
            .token_env
            .as_ref()
            .and_then(|env_var| std::env::var(env_var.trim_start_matches('$')).ok());

        Ok(Self {
            client,
            webhook_url,
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

    fn method_url(&self, method: &str) -> String {
        format!("{}{}", self.webhook_url, method)
    }

    /// Invoke a REST method and return its `result`
    async fn call(
        &self,
        method: &str,
        mut params: Map<String, Value>,
        timeout: Duration,
    ) -> Result<Value> {
        if let Some(ref token) = self.auth_token {
            params.insert("auth".to_string(), Value::String(token.clone()));
        }

        debug!(method = %method, "Calling Bitrix24");

        let response = self
            .client
            .post(self.method_url(method))
            .json(&Value::Object(params))
            .timeout(timeout)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        let parsed: BitrixResponse = serde_json::from_str(&body).map_err(|_| {
            SheetSyncError::Api(format!("{}: HTTP {}: {}", method, status, body))
        })?;

        if let Some(error) = parsed.error {
            return Err(SheetSyncError::Api(format!(
                "{}: {}: {}",
                method,
                error,
                parsed.error_description.unwrap_or_default()
            )));
        }

        if !status.is_success() {
            return Err(SheetSyncError::Api(format!(
                "{}: HTTP {}: {}",
                method, status, body
            )));
        }

        parsed
            .result
            .ok_or_else(|| SheetSyncError::Api(format!("{}: response has no result", method)))
    }

    fn payload_params(payload: &LeadPayload) -> Result<Map<String, Value>> {
        let mut params = Map::new();
        params.insert("fields".to_string(), serde_json::to_value(payload)?);
        Ok(params)
    }
}

#[async_trait]
impl CrmClient for Bitrix24Adapter {
    async fn create_lead(&self, payload: &LeadPayload) -> Result<String> {
        info!(title = %payload.title(), "Creating new lead");

        let params = Self::payload_params(payload)?;
        let result = self
            .call("crm.lead.add", params, WRITE_TIMEOUT)
            .await
            .inspect_err(|_| metrics::record_api_error("create_lead", "crm"))?;

        match result {
            Value::Number(n) => Ok(n.to_string()),
            Value::String(s) if !s.is_empty() => Ok(s),
            other => Err(SheetSyncError::Api(format!(
                "crm.lead.add returned no lead id: {}",
                other
            ))),
        }
    }

    async fn update_lead(&self, id: &str, payload: &LeadPayload) -> Result<()> {
        info!(lead_id = %id, title = %payload.title(), "Updating existing lead");

        let mut params = Self::payload_params(payload)?;
        params.insert("id".to_string(), Value::String(id.to_string()));

        let result = self
            .call("crm.lead.update", params, WRITE_TIMEOUT)
            .await
            .inspect_err(|_| metrics::record_api_error("update_lead", "crm"))?;

        match result {
            Value::Bool(false) => Err(SheetSyncError::Api(format!(
                "crm.lead.update rejected lead {}",
                id
            ))),
            _ => Ok(()),
        }
    }

    async fn find_leads(&self, field: &str, value: &str) -> Result<Vec<CrmLead>> {
        let mut params = Map::new();
        let mut filter = Map::new();
        filter.insert(field.to_string(), Value::String(value.to_string()));
        params.insert("filter".to_string(), Value::Object(filter));
        params.insert("select".to_string(), json!(LEAD_SELECT));

        let result = self
            .call("crm.lead.list", params, SEARCH_TIMEOUT)
            .await
            .map_err(|e| {
                metrics::record_api_error("find_leads", "crm");
                SheetSyncError::Lookup(format!("{}={}: {}", field, value, e))
            })?;

        let leads: Vec<CrmLead> = serde_json::from_value(result)?;
        debug!(field = %field, matches = leads.len(), "Bitrix24 lead search complete");
        Ok(leads)
    }

    async fn validate_connection(&self) -> Result<()> {
        self.lead_fields().await.map(|_| ())
    }

    async fn lead_fields(&self) -> Result<Value> {
        self.call("crm.lead.fields", Map::new(), GET_TIMEOUT).await
    }
}
