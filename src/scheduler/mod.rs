//! Scheduler daemon
//!
//! Background loop that runs the sync engine on a fixed interval.
//!
//! ## Communication
//!
//! - **Event Stream**: the scheduler broadcasts run outcomes
//! - **Command Channel**: callers can trigger a run, change the interval or stop it
//!
//! A tick that arrives while another run (an HTTP or CLI trigger) holds the
//! engine's guard is dropped and reported as [`SchedulerEvent::RunSkipped`].
//!
//! # Example
//!
//! ```ignore
//! use sheetsync::scheduler::{Scheduler, SchedulerConfig};
//!
//! let mut scheduler = Scheduler::new(engine, SchedulerConfig::new(config.sync.interval()));
//!
//! let mut events = scheduler.subscribe();
//! tokio::spawn(async move {
//!     while let Ok(event) = events.recv().await {
//!         println!("Event: {:?}", event);
//!     }
//! });
//!
//! scheduler.run().await?;
//! ```

mod daemon;

pub use daemon::{
    Scheduler, SchedulerCommand, SchedulerConfig, SchedulerEvent, DEFAULT_EVENT_CHANNEL_CAPACITY,
    DEFAULT_SYNC_INTERVAL,
};
