//! Subcommand implementations.
//!
//! Every command opens the store and config from the data directory, does
//! its work and prints JSON to stdout. Logs go to stderr.

pub mod analytics;
pub mod config;
pub mod habit;
pub mod notify;
pub mod streak;

use serde::Serialize;
use std::sync::Arc;

use streakwise_core::notifications::DispatchReceiver;
use streakwise_core::{
    AdaptiveScheduler, ChannelDispatcher, Clock, Config, CoreError, Database, Habit, HabitStore,
    StoreError, StreakCalculator, SystemClock, ValidationError,
};

pub type CommandResult = Result<(), Box<dyn std::error::Error>>;

/// Store, config and clock shared by one CLI invocation.
pub struct Session {
    pub config: Config,
    pub store: Arc<Database>,
    pub clock: Arc<dyn Clock>,
}

impl Session {
    pub fn open() -> Result<Self, CoreError> {
        let config = Config::load()?;
        config.validate()?;
        Ok(Self {
            config,
            store: Arc::new(Database::open()?),
            clock: Arc::new(SystemClock),
        })
    }

    pub fn habit(&self, id: &str) -> Result<Habit, CoreError> {
        self.store
            .habit(id)?
            .ok_or_else(|| StoreError::UnknownHabit(id.to_string()).into())
    }

    pub fn streaks(&self) -> Result<StreakCalculator, ValidationError> {
        let (milestones, percentiles) = self.config.streak.tables()?;
        Ok(StreakCalculator::with_tables(self.clock.clone(), milestones, percentiles))
    }

    /// Scheduler wired to a channel dispatcher; the receiver collects
    /// whatever the command asked to schedule or cancel.
    pub fn scheduler(&self) -> Result<(AdaptiveScheduler, DispatchReceiver), ValidationError> {
        let (dispatcher, rx) = ChannelDispatcher::channel();
        let scheduler = AdaptiveScheduler::from_config(
            self.store.clone(),
            self.clock.clone(),
            Arc::new(dispatcher),
            &self.config,
        )?;
        Ok((scheduler, rx))
    }
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
