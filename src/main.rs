//! sheetsync - Google Sheets to Bitrix24 lead synchronization
//!
//! Main entry point for the sheetsync CLI.

mod commands;

use clap::Parser;
use commands::{Cli, Commands, ConfigCommands};
use dialoguer::{theme::ColorfulTheme, Confirm};
use serde::Serialize;
use sheetsync::config::{validate_config_result, AppConfig};
use sheetsync::integrations::{Bitrix24Adapter, GoogleSheetsAdapter};
use sheetsync::scheduler::{Scheduler, SchedulerConfig, SchedulerEvent};
use sheetsync::server::ApiServer;
use sheetsync::sync::{SyncEngine, SyncSettings};
use sheetsync::{Result, SheetSyncError};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn config_path(cli: &Cli) -> PathBuf {
    cli.config
        .as_ref()
        .map(PathBuf::from)
        .unwrap_or_else(AppConfig::default_path)
}

fn run(cli: Cli) -> Result<()> {
    // Config commands work without a valid config file
    if let Commands::Config(ref cmd) = cli.command {
        return handle_config_command(cmd, &config_path(&cli));
    }

    let config = match AppConfig::load(config_path(&cli)) {
        Ok(config) => config,
        Err(SheetSyncError::Config(msg)) if msg.contains("Config file not found") => {
            return Err(SheetSyncError::Config(format!(
                "{}\n\nRun 'sheetsync config init' to create one.",
                msg
            )));
        }
        Err(e) => return Err(e),
    };

    if let Err(e) = sheetsync::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    validate_config_result(&config)?;

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run_command(cli, config))
}

fn build_engine(config: &AppConfig) -> Result<Arc<SyncEngine>> {
    let sheet = GoogleSheetsAdapter::new(config.sheets.clone())?;
    if !sheet.is_authenticated() {
        tracing::warn!("No Google Sheets access token found; requests will be unauthenticated");
    }
    let crm = Bitrix24Adapter::new(config.crm.clone())?;

    Ok(Arc::new(SyncEngine::new(
        Arc::new(sheet),
        Arc::new(crm),
        SyncSettings::from_config(config)?,
    )))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run_command(cli: Cli, config: AppConfig) -> Result<()> {
    let path = config_path(&cli);
    let engine = build_engine(&config)?;

    match cli.command {
        Commands::Sync => {
            let result = engine.run().await?;
            if cli.json {
                print_json(&result)?;
            } else if let Some(ref error) = result.error {
                println!("Sync failed: {}", error);
            } else {
                let stats = result.stats;
                println!("Sync completed in {}ms", result.duration_ms);
                println!("  Rows:       {}", stats.total);
                println!("  Created:    {}", stats.created);
                println!("  Updated:    {}", stats.updated);
                println!("  Skipped:    {}", stats.skipped);
                println!("  Errors:     {}", stats.errors);
                println!("  Duplicates: {}", stats.duplicates);
            }
            if !result.success {
                return Err(SheetSyncError::Other("Sync did not complete".to_string()));
            }
        }

        Commands::Stats => {
            let summary = engine.status_summary().await?;
            if cli.json {
                print_json(&summary)?;
            } else {
                let labels = &engine.settings().labels;
                println!("Rows: {}", summary.total);
                println!("  {:<12} {}", labels.synced, summary.synced);
                println!("  {:<12} {}", labels.pending, summary.pending);
                println!("  {:<12} {}", labels.error, summary.errors);
                println!("  {:<12} {}", labels.duplicate, summary.duplicates);
                println!("  {:<12} {}", "other", summary.other);
                println!("With CRM id: {}", summary.with_record_id);
            }
        }

        Commands::Validate => {
            let sheet = engine.sheet().validate_connection().await;
            let crm = engine.crm().validate_connection().await;

            match sheet {
                Ok(()) => println!("Google Sheets: ok"),
                Err(ref e) => println!("Google Sheets: {}", e),
            }
            match crm {
                Ok(()) => println!("Bitrix24:      ok"),
                Err(ref e) => println!("Bitrix24:      {}", e),
            }

            sheet?;
            crm?;
        }

        Commands::Reset { yes } => {
            if !yes {
                let confirmed = Confirm::with_theme(&ColorfulTheme::default())
                    .with_prompt("Mark every row pending so the next sync reprocesses it?")
                    .default(false)
                    .interact()
                    .unwrap_or(false);
                if !confirmed {
                    println!("Aborted");
                    return Ok(());
                }
            }

            let report = engine.reset_status().await?;
            if cli.json {
                print_json(&report)?;
            } else {
                println!("Reset {} rows ({} failed)", report.rows_reset, report.failed);
            }
        }

        Commands::Preview { limit } => {
            let rows = engine.preview(limit).await?;
            if cli.json {
                print_json(&rows)?;
            } else {
                for row in &rows {
                    let fields: Vec<String> = row
                        .fields
                        .iter()
                        .filter(|(_, value)| !value.is_empty())
                        .map(|(header, value)| format!("{}={}", header, value))
                        .collect();
                    println!(
                        "#{:<4} [{}] {}",
                        row.row_number,
                        row.sync_status,
                        fields.join(", ")
                    );
                }
                println!("{} rows", rows.len());
            }
        }

        Commands::Serve {
            bind,
            no_scheduler,
            run_on_start,
        } => {
            let addr = bind.unwrap_or_else(|| config.server.bind_addr());
            serve(engine, &config, &addr, no_scheduler, run_on_start).await?;
        }

        Commands::Config(cmd) => handle_config_command(&cmd, &path)?,
    }

    Ok(())
}

async fn serve(
    engine: Arc<SyncEngine>,
    config: &AppConfig,
    addr: &str,
    no_scheduler: bool,
    run_on_start: bool,
) -> Result<()> {
    let server = ApiServer::new(engine.clone());

    if no_scheduler {
        tokio::select! {
            result = server.run(addr) => {
                return result.map_err(|e| SheetSyncError::Other(e.to_string()));
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received Ctrl-C, shutting down");
                return Ok(());
            }
        }
    }

    let mut scheduler = Scheduler::new(
        engine,
        SchedulerConfig::new(config.sync.interval()).with_run_on_start(run_on_start),
    );

    let mut events = scheduler.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if let SchedulerEvent::RunCompleted(result) = event {
                tracing::info!(
                    created = result.stats.created,
                    updated = result.stats.updated,
                    errors = result.stats.errors,
                    "Scheduled sync finished"
                );
            }
        }
    });

    server.run_with_scheduler(addr, &mut scheduler).await
}

fn handle_config_command(cmd: &ConfigCommands, path: &Path) -> Result<()> {
    match cmd {
        ConfigCommands::Init { force } => {
            if path.exists() && !force {
                return Err(SheetSyncError::Config(format!(
                    "Config file already exists: {} (use --force to overwrite)",
                    path.display()
                )));
            }
            AppConfig::new().save(path)?;
            println!("Wrote default configuration to {}", path.display());
            println!("Set sheets.spreadsheet_id and crm.webhook_url before syncing.");
        }

        ConfigCommands::Check => {
            let config = AppConfig::load(path)?;
            validate_config_result(&config)?;
            println!("Configuration OK: {}", path.display());
        }

        ConfigCommands::Show => {
            let config = AppConfig::load(path)?;
            print!("{}", serde_yaml::to_string(&config)?);
        }
    }

    Ok(())
}
