//! Scheduler daemon implementation
//!
//! Background loop that triggers a sync run on a fixed interval.
//! Runs as a tokio async event loop and shares the engine's single-flight
//! guard with every manual trigger.

use crate::metrics;
use crate::sync::{RunResult, SyncEngine};
use crate::{Result, SheetSyncError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{Instant, Interval, MissedTickBehavior};

/// Default sync interval (15 minutes)
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Default event channel capacity
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 100;

/// Scheduler configuration
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Time between scheduled runs
    pub interval: Duration,

    /// Run once immediately instead of waiting a full interval
    pub run_on_start: bool,

    /// Event broadcast channel capacity
    pub event_channel_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_SYNC_INTERVAL,
            run_on_start: false,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
        }
    }
}

impl SchedulerConfig {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            ..Default::default()
        }
    }

    pub fn with_run_on_start(mut self, run_on_start: bool) -> Self {
        self.run_on_start = run_on_start;
        self
    }
}

/// Events emitted by the scheduler
#[derive(Debug, Clone)]
pub enum SchedulerEvent {
    /// Scheduler started
    Started,

    /// Scheduler stopped
    Stopped,

    /// A run finished and processed the sheet
    RunCompleted(RunResult),

    /// A run finished without reading the sheet
    RunFailed(RunResult),

    /// Another run held the guard, so this trigger was dropped
    RunSkipped,
}

/// Commands that can be sent to the scheduler
#[derive(Debug, Clone)]
pub enum SchedulerCommand {
    /// Trigger an immediate run
    SyncNow,

    /// Change the interval; the next run is one new interval away
    SetInterval(Duration),

    /// Stop the scheduler
    Shutdown,
}

/// Result of handling a command
enum CommandResult {
    /// Continue running the scheduler
    Continue,
    /// Stop the scheduler
    Stop,
}

/// Interval scheduler for sync runs
pub struct Scheduler {
    engine: Arc<SyncEngine>,
    config: SchedulerConfig,
    event_tx: broadcast::Sender<SchedulerEvent>,
    command_rx: Option<mpsc::Receiver<SchedulerCommand>>,
    command_tx: mpsc::Sender<SchedulerCommand>,
    running: bool,
}

impl Scheduler {
    pub fn new(engine: Arc<SyncEngine>, config: SchedulerConfig) -> Self {
        let (event_tx, _) = broadcast::channel(config.event_channel_capacity.max(1));
        let (command_tx, command_rx) = mpsc::channel(10);

        Self {
            engine,
            config,
            event_tx,
            command_rx: Some(command_rx),
            command_tx,
            running: false,
        }
    }

    /// Subscribe to scheduler events
    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.event_tx.subscribe()
    }

    /// Get a command sender
    pub fn command_sender(&self) -> mpsc::Sender<SchedulerCommand> {
        self.command_tx.clone()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn interval(&self) -> Duration {
        self.config.interval
    }

    fn send_event(&self, event: SchedulerEvent) {
        // No subscribers is fine
        let _ = self.event_tx.send(event);
    }

    fn make_interval(period: Duration, immediate: bool) -> Interval {
        let start = if immediate {
            Instant::now()
        } else {
            Instant::now() + period
        };
        let mut interval = tokio::time::interval_at(start, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        interval
    }

    /// Run the scheduler loop with graceful shutdown on SIGTERM/SIGINT
    ///
    /// Shutdown only happens between runs; a run in progress always finishes.
    pub async fn run(&mut self) -> Result<()> {
        if self.config.interval.is_zero() {
            return Err(SheetSyncError::Config(
                "Sync interval must be greater than 0".to_string(),
            ));
        }

        let mut command_rx = self
            .command_rx
            .take()
            .ok_or_else(|| SheetSyncError::Config("Scheduler already running".to_string()))?;

        self.running = true;
        metrics::set_health_status(true);
        self.send_event(SchedulerEvent::Started);
        tracing::info!(
            interval_secs = self.config.interval.as_secs(),
            "Scheduler started"
        );

        let mut interval = Self::make_interval(self.config.interval, self.config.run_on_start);

        #[cfg(unix)]
        {
            self.run_with_signals(&mut interval, &mut command_rx)
                .await?;
        }

        #[cfg(not(unix))]
        {
            self.run_without_signals(&mut interval, &mut command_rx)
                .await;
        }

        self.running = false;
        metrics::set_health_status(false);
        self.send_event(SchedulerEvent::Stopped);
        tracing::info!("Scheduler stopped");
        Ok(())
    }

    /// Run event loop with Unix signal handling (SIGTERM/SIGINT)
    #[cfg(unix)]
    async fn run_with_signals(
        &mut self,
        interval: &mut Interval,
        command_rx: &mut mpsc::Receiver<SchedulerCommand>,
    ) -> Result<()> {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate()).map_err(|e| {
            SheetSyncError::Other(format!("Failed to set up SIGTERM handler: {}", e))
        })?;
        let mut sigint = signal(SignalKind::interrupt()).map_err(|e| {
            SheetSyncError::Other(format!("Failed to set up SIGINT handler: {}", e))
        })?;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.trigger("scheduled").await;
                }
                cmd = command_rx.recv() => {
                    match cmd {
                        Some(cmd) => match self.handle_command(cmd, interval).await {
                            CommandResult::Continue => {}
                            CommandResult::Stop => break,
                        },
                        None => break,
                    }
                }
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM, initiating graceful shutdown");
                    break;
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT, initiating graceful shutdown");
                    break;
                }
            }
        }
        Ok(())
    }

    /// Run event loop without signal handling (non-Unix platforms)
    #[cfg(not(unix))]
    async fn run_without_signals(
        &mut self,
        interval: &mut Interval,
        command_rx: &mut mpsc::Receiver<SchedulerCommand>,
    ) {
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.trigger("scheduled").await;
                }
                cmd = command_rx.recv() => {
                    match cmd {
                        Some(cmd) => match self.handle_command(cmd, interval).await {
                            CommandResult::Continue => {}
                            CommandResult::Stop => break,
                        },
                        None => break,
                    }
                }
            }
        }
    }

    async fn handle_command(
        &mut self,
        cmd: SchedulerCommand,
        interval: &mut Interval,
    ) -> CommandResult {
        match cmd {
            SchedulerCommand::SyncNow => {
                self.trigger("manual").await;
            }
            SchedulerCommand::SetInterval(duration) => {
                if duration.is_zero() {
                    tracing::warn!("Ignoring zero sync interval");
                } else {
                    *interval = Self::make_interval(duration, false);
                    self.config.interval = duration;
                    tracing::info!(interval_secs = duration.as_secs(), "Sync interval changed");
                }
            }
            SchedulerCommand::Shutdown => {
                tracing::info!("Received shutdown command");
                return CommandResult::Stop;
            }
        }
        CommandResult::Continue
    }

    /// Execute one run and report it
    async fn trigger(&self, trigger: &str) {
        tracing::debug!(trigger = %trigger, "Triggering sync run");

        match self.engine.run().await {
            Ok(result) if result.success => {
                self.send_event(SchedulerEvent::RunCompleted(result));
            }
            Ok(result) => {
                tracing::error!(
                    trigger = %trigger,
                    error = result.error.as_deref().unwrap_or_default(),
                    "Scheduled sync failed"
                );
                self.send_event(SchedulerEvent::RunFailed(result));
            }
            Err(SheetSyncError::SyncInProgress) => {
                tracing::info!(trigger = %trigger, "Previous sync still running, skipping");
                self.send_event(SchedulerEvent::RunSkipped);
            }
            Err(e) => {
                tracing::error!(trigger = %trigger, error = %e, "Sync run error");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::sync::memory::{MemoryCrm, MemorySheet};
    use crate::sync::SyncSettings;

    fn engine(sheet: Arc<MemorySheet>) -> Arc<SyncEngine> {
        let mut config = AppConfig::new();
        config.sync.retry_attempts = 1;
        Arc::new(SyncEngine::new(
            sheet,
            Arc::new(MemoryCrm::new()),
            SyncSettings::from_config(&config).unwrap(),
        ))
    }

    fn sheet() -> Arc<MemorySheet> {
        Arc::new(MemorySheet::from_rows(&[&["Name"], &["Acme"]]))
    }

    #[test]
    fn test_config_builder() {
        let config = SchedulerConfig::new(Duration::from_secs(60)).with_run_on_start(true);
        assert_eq!(config.interval, Duration::from_secs(60));
        assert!(config.run_on_start);
        assert_eq!(SchedulerConfig::default().interval, DEFAULT_SYNC_INTERVAL);
    }

    #[tokio::test]
    async fn test_sync_now_then_shutdown() {
        let mut scheduler = Scheduler::new(
            engine(sheet()),
            SchedulerConfig::new(Duration::from_secs(3600)),
        );
        let mut events = scheduler.subscribe();
        let commands = scheduler.command_sender();

        commands.send(SchedulerCommand::SyncNow).await.unwrap();
        commands.send(SchedulerCommand::Shutdown).await.unwrap();
        scheduler.run().await.unwrap();
        assert!(!scheduler.is_running());

        assert!(matches!(events.recv().await, Ok(SchedulerEvent::Started)));
        match events.recv().await {
            Ok(SchedulerEvent::RunCompleted(result)) => assert_eq!(result.stats.created, 1),
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(matches!(events.recv().await, Ok(SchedulerEvent::Stopped)));
    }

    #[tokio::test]
    async fn test_failed_read_emits_run_failed() {
        let sheet = sheet();
        sheet.fail_next_reads(1);
        let mut scheduler =
            Scheduler::new(engine(sheet), SchedulerConfig::new(Duration::from_secs(3600)));
        let mut events = scheduler.subscribe();
        let commands = scheduler.command_sender();

        commands.send(SchedulerCommand::SyncNow).await.unwrap();
        commands.send(SchedulerCommand::Shutdown).await.unwrap();
        scheduler.run().await.unwrap();

        assert!(matches!(events.recv().await, Ok(SchedulerEvent::Started)));
        match events.recv().await {
            Ok(SchedulerEvent::RunFailed(result)) => {
                assert!(!result.success);
                assert!(result.error.is_some());
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_tick_skipped_while_run_in_progress() {
        let sheet = sheet();
        sheet.set_read_delay(Duration::from_millis(300));
        let engine = engine(sheet);
        let mut scheduler = Scheduler::new(
            engine.clone(),
            SchedulerConfig::new(Duration::from_secs(3600)),
        );
        let mut events = scheduler.subscribe();
        let commands = scheduler.command_sender();

        let manual = tokio::spawn({
            let engine = engine.clone();
            async move { engine.run().await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;

        commands.send(SchedulerCommand::SyncNow).await.unwrap();
        commands.send(SchedulerCommand::Shutdown).await.unwrap();
        scheduler.run().await.unwrap();

        assert!(matches!(events.recv().await, Ok(SchedulerEvent::Started)));
        assert!(matches!(events.recv().await, Ok(SchedulerEvent::RunSkipped)));
        assert!(manual.await.unwrap().unwrap().success);
    }

    #[tokio::test]
    async fn test_zero_interval_rejected() {
        let mut scheduler = Scheduler::new(engine(sheet()), SchedulerConfig::new(Duration::ZERO));
        assert!(matches!(
            scheduler.run().await,
            Err(SheetSyncError::Config(_))
        ));
    }
}
