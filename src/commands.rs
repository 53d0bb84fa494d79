//! CLI command definitions
//!
//! All CLI structs and subcommand enums are defined here.

use clap::{Parser, Subcommand};

/// sheetsync - Google Sheets to Bitrix24 lead synchronization
#[derive(Parser, Debug)]
#[command(name = "sheetsync")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to config file (default: ~/.config/sheetsync/config.yaml)
    #[arg(short, long, global = true, env = "SHEETSYNC_CONFIG")]
    pub config: Option<String>,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one synchronization pass
    Sync,

    /// Show row counts per status
    Stats,

    /// Check configuration and both connections
    Validate,

    /// Mark every row pending so the next run reprocesses it
    Reset {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Show parsed rows without syncing them
    Preview {
        /// Number of rows to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Run the HTTP API and the scheduled sync
    Serve {
        /// Override the configured bind address (host:port)
        #[arg(long)]
        bind: Option<String>,

        /// Only serve the API, never sync on a schedule
        #[arg(long)]
        no_scheduler: bool,

        /// Run a sync immediately on startup
        #[arg(long)]
        run_on_start: bool,
    },

    /// Manage the configuration file
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Validate the configuration file
    Check,

    /// Print the effective configuration
    Show,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_is_well_formed() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_serve_flags() {
        let cli = Cli::parse_from([
            "sheetsync",
            "serve",
            "--no-scheduler",
            "--bind",
            "0.0.0.0:8080",
        ]);
        match cli.command {
            Commands::Serve {
                bind,
                no_scheduler,
                run_on_start,
            } => {
                assert_eq!(bind.as_deref(), Some("0.0.0.0:8080"));
                assert!(no_scheduler);
                assert!(!run_on_start);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["sheetsync", "preview", "--limit", "3", "--json"]);
        assert!(cli.json);
        assert!(matches!(cli.command, Commands::Preview { limit: 3 }));
    }

    #[test]
    fn test_config_subcommands() {
        let cli = Cli::parse_from(["sheetsync", "config", "init", "--force"]);
        assert!(matches!(
            cli.command,
            Commands::Config(ConfigCommands::Init { force: true })
        ));
    }
}
