//! Field mapping
//!
//! Converts a sheet [`Row`] into a [`LeadPayload`] by applying the configured
//! mapping rules and value normalization.

use super::row::Row;
use crate::config::{FieldMappingRule, MappingConfig, ValueType};
use crate::{Result, SheetSyncError};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A normalized field value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Number(f64),
}

impl FieldValue {
    /// Value as a CRM search term, `None` when there is nothing to search for
    pub fn search_term(&self) -> Option<String> {
        match self {
            FieldValue::Text(s) if s.is_empty() => None,
            FieldValue::Text(s) => Some(s.clone()),
            FieldValue::Number(n) => Some(n.to_string()),
        }
    }
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldValue::Text(s) => write!(f, "{}", s),
            FieldValue::Number(n) => write!(f, "{}", n),
        }
    }
}

impl From<&serde_json::Value> for FieldValue {
    fn from(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::String(s) => FieldValue::Text(s.clone()),
            serde_json::Value::Number(n) => FieldValue::Number(n.as_f64().unwrap_or(0.0)),
            serde_json::Value::Null => FieldValue::Text(String::new()),
            other => FieldValue::Text(other.to_string()),
        }
    }
}

/// CRM field values for one lead; the title field is always present
#[derive(Debug, Clone, PartialEq)]
pub struct LeadPayload {
    title_field: String,
    fields: BTreeMap<String, FieldValue>,
}

impl LeadPayload {
    /// Create a payload holding only an empty title
    pub fn new(title_field: impl Into<String>) -> Self {
        let title_field = title_field.into();
        let mut fields = BTreeMap::new();
        fields.insert(title_field.clone(), FieldValue::Text(String::new()));
        Self {
            title_field,
            fields,
        }
    }

    /// Build a payload from a JSON object, e.g. a test lead posted to the API
    pub fn from_json(
        title_field: impl Into<String>,
        object: &serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        let mut payload = Self::new(title_field);
        for (field, value) in object {
            payload.insert(field.clone(), FieldValue::from(value));
        }
        payload
    }

    pub fn insert(&mut self, field: impl Into<String>, value: FieldValue) {
        self.fields.insert(field.into(), value);
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    /// Title value as text
    pub fn title(&self) -> String {
        self.fields
            .get(&self.title_field)
            .map(|v| v.to_string())
            .unwrap_or_default()
    }

    pub fn title_field(&self) -> &str {
        &self.title_field
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl Serialize for LeadPayload {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.fields.serialize(serializer)
    }
}

/// Applies mapping rules to rows
#[derive(Debug, Clone)]
pub struct FieldMapper {
    mapping: Arc<MappingConfig>,
}

impl FieldMapper {
    pub fn new(mapping: Arc<MappingConfig>) -> Self {
        Self { mapping }
    }

    /// Map a row to a lead payload
    ///
    /// Fails with a validation error naming the first required rule whose
    /// value is missing or empty. A whitespace-only value counts as present
    /// and is normalized like any other. Empty optional values are omitted.
    pub fn map_row(&self, row: &Row) -> Result<LeadPayload> {
        let mut payload = LeadPayload::new(&self.mapping.title_field);

        for rule in &self.mapping.rules {
            let raw = row.value(&rule.source_column).unwrap_or_default();

            if raw.is_empty() {
                if rule.required {
                    return Err(SheetSyncError::Validation(format!(
                        "required field '{}' (column '{}') is empty",
                        rule.name, rule.source_column
                    )));
                }
                continue;
            }

            payload.insert(rule.target_field.clone(), normalize(rule, raw));
        }

        Ok(payload)
    }
}

/// Normalize a raw cell value according to the rule's type
fn normalize(rule: &FieldMappingRule, raw: &str) -> FieldValue {
    match rule.value_type {
        ValueType::Text => FieldValue::Text(raw.trim().to_string()),
        ValueType::Email => FieldValue::Text(raw.trim().to_lowercase()),
        ValueType::Phone => {
            FieldValue::Text(raw.chars().filter(|c| c.is_ascii_digit()).collect())
        }
        ValueType::Number => {
            let number = raw
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|n| n.is_finite())
                .unwrap_or(0.0);
            FieldValue::Number(number)
        }
    }
}
