//! Logging configuration using tracing
//!
//! Provides structured logging to stderr and, optionally, to a log file, with
//! support for the RUST_LOG environment variable.

use crate::config::LoggingConfig;
use std::fs::OpenOptions;
use std::sync::Arc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the tracing subscriber
///
/// Sets up structured logging with:
/// - Filtering via RUST_LOG, falling back to the configured level
/// - Formatted output to stderr
/// - Plain-text output to `logging.file` when configured
///
/// # Example RUST_LOG values
/// - `RUST_LOG=info` - Show info and above
/// - `RUST_LOG=sheetsync=debug` - Debug level for this crate only
/// - `RUST_LOG=sheetsync=trace,reqwest=info` - Different levels per crate
///
/// # Errors
/// Returns an error if the log file cannot be opened or the subscriber has
/// already been initialized
pub fn init(config: &LoggingConfig) -> crate::Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_line_number(true);

    let file_layer = match config.file {
        Some(ref path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(
                fmt::layer()
                    .with_writer(Arc::new(file))
                    .with_ansi(false)
                    .with_target(true),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| {
            crate::SheetSyncError::Other(format!("Failed to initialize tracing: {}", e))
        })?;

    Ok(())
}

/// Initialize logging for tests (no-op if already initialized)
pub fn init_test() {
    let _ = init(&LoggingConfig::default());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_test_helper() {
        // Should never panic
        init_test();
        init_test(); // Can be called multiple times
    }

    #[test]
    fn test_init_rejects_unwritable_file() {
        let config = LoggingConfig {
            level: "info".to_string(),
            file: Some("/proc/sheetsync-does-not-exist/app.log".into()),
        };
        assert!(init(&config).is_err());
    }

    #[test]
    fn test_logging_macros() {
        init_test();

        tracing::info!(row = 2, outcome = "created", "Testing structured logging");
        tracing::warn!("This is a warning message");
    }
}
