pub mod config;
pub mod core;
pub mod logging;
pub mod persist;
pub mod store;
pub mod tracker;

use std::sync::atomic::{AtomicBool, Ordering};

pub use crate::core::habit::{Category, Habit, HabitId, NewHabit, Reminder, ReminderKind, Repetition, UserId};
pub use crate::core::streak::{MarkerOp, Reevaluation, StreakError, ToggleOutcome};
pub use persist::{HabitFeed, HabitPersistence, PersistError, PersistResult};
pub use store::{HabitStore, SharedStore};
pub use tracker::{ActivationReport, HabitTracker, TrackError};

/// Whether debug logging is active, shared between the logger filter and the settings toggle.
static DEBUG_LOGGING: AtomicBool = AtomicBool::new(false);

pub fn set_debug_logging(enabled: bool) {
    DEBUG_LOGGING.store(enabled, Ordering::Relaxed);
}

pub fn debug_logging() -> bool {
    DEBUG_LOGGING.load(Ordering::Relaxed)
}
