//! Configuration system
//!
//! Loads ~/.config/sheetsync/config.yaml with support for:
//! - Google Sheets source and status column layout
//! - Bitrix24 webhook endpoint
//! - Sync schedule, read retries and duplicate check fields
//! - Column-to-field mapping rules and status labels
//! - Logging settings

mod app_config;
mod mapping;
pub mod validation;

pub use app_config::{
    AppConfig, CrmConfig, LoggingConfig, ServerConfig, SheetsConfig, StatusColumnsConfig,
    SyncConfig,
};
pub use mapping::{FieldMappingRule, MappingConfig, StatusLabels, ValueType};
pub use validation::{validate_config, validate_config_result, ValidationError};
