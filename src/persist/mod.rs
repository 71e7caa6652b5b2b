//! Durable storage contract for habits and their completion markers.

pub mod file;
pub mod memory;

use std::future::Future;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;

use crate::core::habit::{Habit, HabitId, UserId};

pub use file::FilePersistence;
pub use memory::MemoryPersistence;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("persistence service unavailable")]
    Unavailable,
    #[error("habit {0} is not stored")]
    UnknownHabit(HabitId),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed stored data: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type PersistResult<T> = Result<T, PersistError>;

/// Durable record that a habit was completed on a calendar date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CompletionMarker {
    pub habit_id: HabitId,
    pub date: NaiveDate,
}

/// Live sequence of habit snapshots for one user.
pub struct HabitFeed {
    rx: watch::Receiver<Vec<Habit>>,
}

impl HabitFeed {
    pub(crate) fn new(rx: watch::Receiver<Vec<Habit>>) -> Self {
        Self { rx }
    }

    /// The most recent snapshot, marking it as seen.
    pub fn current(&mut self) -> Vec<Habit> {
        self.rx.borrow_and_update().clone()
    }

    /// Wait for the next snapshot. Returns `None` once the source is dropped.
    pub async fn next(&mut self) -> Option<Vec<Habit>> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }
}

/// Storage backend for a user's habits. Every write is durable once the future resolves.
pub trait HabitPersistence: Send + Sync {
    fn load_all(&self, user: &UserId) -> impl Future<Output = PersistResult<HabitFeed>> + Send;

    /// Create or update a habit.
    fn save(&self, user: &UserId, habit: &Habit) -> impl Future<Output = PersistResult<()>> + Send;

    /// Delete a habit together with all its completion markers. Deleting an unknown id succeeds.
    fn delete(&self, user: &UserId, id: HabitId) -> impl Future<Output = PersistResult<()>> + Send;

    fn append_completion_marker(
        &self,
        user: &UserId,
        id: HabitId,
        date: NaiveDate,
    ) -> impl Future<Output = PersistResult<()>> + Send;

    fn remove_completion_marker(
        &self,
        user: &UserId,
        id: HabitId,
        date: NaiveDate,
    ) -> impl Future<Output = PersistResult<()>> + Send;

    /// Latest completion strictly before `date`.
    fn find_latest_completion_before(
        &self,
        user: &UserId,
        id: HabitId,
        date: NaiveDate,
    ) -> impl Future<Output = PersistResult<Option<NaiveDate>>> + Send;

    /// Every completion date of a habit, ascending.
    fn completions(&self, user: &UserId, id: HabitId) -> impl Future<Output = PersistResult<Vec<NaiveDate>>> + Send;
}
