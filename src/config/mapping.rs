//! Field mapping configuration
//!
//! Declares how sheet columns become CRM lead fields, and which labels the
//! status column uses.

use serde::{Deserialize, Serialize};

/// Value type tag controlling normalization of a mapped cell
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    /// Trimmed text
    #[default]
    Text,

    /// Floating point number, 0 when unparsable
    Number,

    /// Lowercased, trimmed email address
    Email,

    /// Digits only
    Phone,
}

/// A single column-to-field mapping rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMappingRule {
    /// Logical field name (e.g. "email"), referenced by duplicate check fields
    pub name: String,

    /// Sheet header the value is read from
    pub source_column: String,

    /// CRM field the value is written to (e.g. "EMAIL")
    pub target_field: String,

    /// Normalization applied to the raw value
    #[serde(rename = "type", default)]
    pub value_type: ValueType,

    /// Whether an empty value invalidates the whole row
    #[serde(default)]
    pub required: bool,
}

impl FieldMappingRule {
    /// Create an optional text rule
    pub fn new(
        name: impl Into<String>,
        source_column: impl Into<String>,
        target_field: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            source_column: source_column.into(),
            target_field: target_field.into(),
            value_type: ValueType::Text,
            required: false,
        }
    }

    /// Set the value type
    pub fn with_type(mut self, value_type: ValueType) -> Self {
        self.value_type = value_type;
        self
    }

    /// Mark the rule as required
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// Mapping table plus the CRM title field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingConfig {
    /// CRM field that carries the record title; always present in payloads
    #[serde(default = "default_title_field")]
    pub title_field: String,

    /// Mapping rules, applied in order
    #[serde(default = "default_rules")]
    pub rules: Vec<FieldMappingRule>,
}

fn default_title_field() -> String {
    "TITLE".to_string()
}

fn default_rules() -> Vec<FieldMappingRule> {
    vec![
        FieldMappingRule::new("title", "Name", "TITLE").required(),
        FieldMappingRule::new("email", "Email", "EMAIL").with_type(ValueType::Email),
        FieldMappingRule::new("phone", "Phone", "PHONE").with_type(ValueType::Phone),
        FieldMappingRule::new("company", "Company", "COMPANY_TITLE"),
        FieldMappingRule::new("opportunity", "Budget", "OPPORTUNITY")
            .with_type(ValueType::Number),
        FieldMappingRule::new("comments", "Notes", "COMMENTS"),
    ]
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            title_field: default_title_field(),
            rules: default_rules(),
        }
    }
}

impl MappingConfig {
    /// Resolve a duplicate check field to the CRM field it searches on
    ///
    /// Matches a rule by logical name first, then by target field.
    pub fn resolve_check_field(&self, check_field: &str) -> Option<&str> {
        let upper = check_field.to_uppercase();
        self.rules
            .iter()
            .find(|r| r.name.eq_ignore_ascii_case(check_field))
            .or_else(|| self.rules.iter().find(|r| r.target_field == upper))
            .map(|r| r.target_field.as_str())
    }
}

/// Labels written to and read from the sync-status column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusLabels {
    #[serde(default = "default_pending")]
    pub pending: String,

    #[serde(default = "default_synced")]
    pub synced: String,

    #[serde(default = "default_error")]
    pub error: String,

    /// Reserved for reporting; never written by the reconciler
    #[serde(default = "default_duplicate")]
    pub duplicate: String,
}

fn default_pending() -> String {
    "pending".to_string()
}

fn default_synced() -> String {
    "synced".to_string()
}

fn default_error() -> String {
    "error".to_string()
}

fn default_duplicate() -> String {
    "duplicate".to_string()
}

impl Default for StatusLabels {
    fn default() -> Self {
        Self {
            pending: default_pending(),
            synced: default_synced(),
            error: default_error(),
            duplicate: default_duplicate(),
        }
    }
}
