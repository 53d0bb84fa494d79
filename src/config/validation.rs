//! Configuration validation
//!
//! Validates sheetsync configuration for correctness:
//! - Sheet and CRM endpoints are set and look like URLs
//! - Status columns are distinct column letters
//! - Mapping rules are unique and at most one targets the title field
//! - Status labels are distinct

use super::app_config::AppConfig;
use super::mapping::MappingConfig;
use crate::integrations::StatusColumn;
use crate::sync::column_index;
use crate::SheetSyncError;
use std::collections::HashSet;

/// Validation error details
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub section: Option<String>,
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            section: None,
            field: field.into(),
            message: message.into(),
        }
    }

    fn in_section(mut self, section: impl Into<String>) -> Self {
        self.section = Some(section.into());
        self
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(ref section) = self.section {
            write!(f, "[{}] {}: {}", section, self.field, self.message)
        } else {
            write!(f, "{}: {}", self.field, self.message)
        }
    }
}

/// Validation result
pub type ValidationResult = std::result::Result<(), Vec<ValidationError>>;

/// Validate a sheetsync configuration
pub fn validate_config(config: &AppConfig) -> ValidationResult {
    let mut errors = Vec::new();

    if config.server.port == 0 {
        errors.push(ValidationError::new("server.port", "Port must be greater than 0"));
    }

    // Sheets
    let sheets = &config.sheets;
    if sheets.spreadsheet_id.trim().is_empty() {
        errors.push(
            ValidationError::new("spreadsheet_id", "Spreadsheet ID cannot be empty")
                .in_section("sheets"),
        );
    }
    if sheets.header_row == 0 {
        errors.push(
            ValidationError::new("header_row", "Header row is 1-based and must be at least 1")
                .in_section("sheets"),
        );
    }
    if !is_http_url(&sheets.base_url) {
        errors.push(
            ValidationError::new(
                "base_url",
                format!("Invalid Sheets API URL: {}", sheets.base_url),
            )
            .in_section("sheets"),
        );
    }

    let mut seen_columns = HashSet::new();
    for column in StatusColumn::ALL {
        let field = format!("status_columns.{}", column);
        let letter = sheets.status_columns.letter(column);
        if column_index(letter).is_none() {
            errors.push(
                ValidationError::new(field, format!("Invalid column letter '{}'", letter))
                    .in_section("sheets"),
            );
        } else if !seen_columns.insert(letter.to_ascii_uppercase()) {
            errors.push(
                ValidationError::new(field, format!("Column '{}' is used twice", letter))
                    .in_section("sheets"),
            );
        }
    }

    warn_unset_env("sheets", sheets.token_env.as_deref());

    // CRM
    if !is_http_url(&config.crm.webhook_url) {
        errors.push(
            ValidationError::new(
                "webhook_url",
                format!("Invalid Bitrix24 webhook URL: '{}'", config.crm.webhook_url),
            )
            .in_section("crm"),
        );
    }
    warn_unset_env("crm", config.crm.token_env.as_deref());

    // Sync
    if config.sync.retry_attempts == 0 {
        errors.push(
            ValidationError::new("retry_attempts", "At least one attempt is required")
                .in_section("sync"),
        );
    }
    if config.sync.interval_secs == 0 {
        errors.push(
            ValidationError::new("interval_secs", "Interval must be greater than 0")
                .in_section("sync"),
        );
    }
    for check_field in &config.sync.duplicate_check_fields {
        if config.mapping.resolve_check_field(check_field).is_none() {
            tracing::warn!(
                check_field = %check_field,
                "Duplicate check field has no mapping rule and will be ignored"
            );
        }
    }

    if let Err(mut mapping_errors) = validate_mapping(&config.mapping) {
        errors.append(&mut mapping_errors);
    }

    // Status labels
    let labels = &config.status_values;
    let mut seen_labels = HashSet::new();
    for (field, label) in [
        ("pending", &labels.pending),
        ("synced", &labels.synced),
        ("error", &labels.error),
        ("duplicate", &labels.duplicate),
    ] {
        if label.trim().is_empty() {
            errors.push(
                ValidationError::new(field, "Status label cannot be empty")
                    .in_section("status_values"),
            );
        } else if !seen_labels.insert(label.as_str()) {
            errors.push(
                ValidationError::new(field, format!("Status label '{}' is used twice", label))
                    .in_section("status_values"),
            );
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate the mapping table
fn validate_mapping(mapping: &MappingConfig) -> ValidationResult {
    let mut errors = Vec::new();

    if mapping.title_field.trim().is_empty() {
        errors.push(
            ValidationError::new("title_field", "Title field cannot be empty").in_section("mapping"),
        );
    }

    if mapping.rules.is_empty() {
        errors.push(
            ValidationError::new("rules", "At least one mapping rule must be defined")
                .in_section("mapping"),
        );
    }

    let mut seen_names = HashSet::new();
    for rule in &mapping.rules {
        if rule.name.is_empty() {
            errors.push(
                ValidationError::new("rules.name", "Rule name cannot be empty")
                    .in_section("mapping"),
            );
        } else if !seen_names.insert(rule.name.to_lowercase()) {
            errors.push(
                ValidationError::new("rules.name", format!("Duplicate rule name: {}", rule.name))
                    .in_section("mapping"),
            );
        }

        if rule.source_column.is_empty() {
            errors.push(
                ValidationError::new(
                    "rules.source_column",
                    format!("Rule '{}' has no source column", rule.name),
                )
                .in_section("mapping"),
            );
        }

        if rule.target_field.is_empty() {
            errors.push(
                ValidationError::new(
                    "rules.target_field",
                    format!("Rule '{}' has no target field", rule.name),
                )
                .in_section("mapping"),
            );
        }
    }

    let title_rules = mapping
        .rules
        .iter()
        .filter(|r| r.target_field == mapping.title_field)
        .count();
    if title_rules > 1 {
        errors.push(
            ValidationError::new(
                "rules.target_field",
                format!(
                    "{} rules target the title field {}; at most one may",
                    title_rules, mapping.title_field
                ),
            )
            .in_section("mapping"),
        );
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn warn_unset_env(section: &str, env_var: Option<&str>) {
    if let Some(env_var) = env_var {
        if std::env::var(env_var).is_err() {
            tracing::warn!(
                section = %section,
                env_var = %env_var,
                "Token environment variable not set (this may be intentional if set at runtime)"
            );
        }
    }
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("https://") || url.starts_with("http://")
}

/// Validate configuration and return a Result
pub fn validate_config_result(config: &AppConfig) -> crate::Result<()> {
    validate_config(config).map_err(|errors| {
        let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        SheetSyncError::Config(format!(
            "Configuration validation failed:\n  - {}",
            messages.join("\n  - ")
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FieldMappingRule;

    fn valid_config() -> AppConfig {
        let mut config = AppConfig::new();
        config.sheets.spreadsheet_id = "abc123".to_string();
        config.crm.webhook_url = "https://example.bitrix24.com/rest/1/token/".to_string();
        config
    }

    #[test]
    fn test_valid_config() {
        assert!(validate_config(&valid_config()).is_ok());
    }

    #[test]
    fn test_defaults_need_endpoints() {
        let errors = validate_config(&AppConfig::new()).unwrap_err();
        assert!(errors.iter().any(|e| e.field == "spreadsheet_id"));
        assert!(errors.iter().any(|e| e.field == "webhook_url"));
    }

    #[test]
    fn test_two_title_rules() {
        let mut config = valid_config();
        config
            .mapping
            .rules
            .push(FieldMappingRule::new("headline", "Headline", "TITLE"));

        let errors = validate_config(&config).unwrap_err();
        assert!(errors.iter().any(|e| e.message.contains("at most one")));
    }

    #[test]
    fn test_duplicate_rule_names() {
        let mut config = valid_config();
        config
            .mapping
            .rules
            .push(FieldMappingRule::new("Email", "Work Email", "UF_WORK_EMAIL"));

        let errors = validate_config(&config).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| e.message.contains("Duplicate rule name")));
    }

    #[test]
    fn test_status_columns() {
        let mut config = valid_config();
        config.sheets.status_columns.record_id = "J".to_string();
        config.sheets.status_columns.last_sync = "1".to_string();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(|e| e.section.as_deref() == Some("sheets")));
        assert!(errors.iter().any(|e| e.field == "status_columns.record_id"));
    }

    #[test]
    fn test_status_labels_distinct() {
        let mut config = valid_config();
        config.status_values.error = config.status_values.synced.clone();

        let errors = validate_config(&config).unwrap_err();
        assert!(errors.iter().any(|e| e.field == "error"));
    }

    #[test]
    fn test_validate_config_result_message() {
        let err = validate_config_result(&AppConfig::new()).unwrap_err();
        assert!(err.to_string().contains("Configuration validation failed"));
    }
}
