//! Orchestrates user actions: decide with the streak engine, write through
//! persistence, then apply to the in-memory store.
//!
//! Store changes are applied only after the write is confirmed. Between an await
//! and its continuation other actions may run, so every continuation re-reads the
//! habit by id and drops its result if the habit is gone.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::NaiveDate;
use futures::future::join_all;
use thiserror::Error;
use tokio::sync::watch;

use crate::config::{Config, ConfigError};
use crate::core::calendar::{DayCell, MonthView};
use crate::core::clock::Clock;
use crate::core::habit::{Habit, HabitId, NewHabit, UserId};
use crate::core::streak::{self, MarkerOp, StreakError};
use crate::persist::{FilePersistence, HabitFeed, HabitPersistence, PersistError};
use crate::store::{HabitStore, SharedStore};

#[derive(Debug, Error)]
pub enum TrackError {
    #[error(transparent)]
    InvalidTransition(#[from] StreakError),
    #[error("habit {0} not found")]
    NotFound(HabitId),
    #[error("persistence failed: {0}")]
    Persistence(#[from] PersistError),
}

/// Summary of one start-of-day re-evaluation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationReport {
    pub date: NaiveDate,
    pub evaluated: usize,
    pub updated: usize,
    pub reset: usize,
    pub failed: usize,
}

pub struct HabitTracker<P> {
    user: UserId,
    persistence: Arc<P>,
    store: SharedStore,
    clock: Clock,
    last_activation: Mutex<Option<NaiveDate>>,
}

/// Result of re-reading a habit after a confirmed write.
enum Settle {
    Gone,
    Applied(Habit),
    Changed(Habit),
}

impl<P: HabitPersistence> HabitTracker<P> {
    pub fn new(user: UserId, persistence: Arc<P>) -> Self {
        Self::with_store(user, persistence, HabitStore::shared())
    }

    pub fn with_store(user: UserId, persistence: Arc<P>, store: SharedStore) -> Self {
        Self {
            user,
            persistence,
            store,
            clock: Clock::default(),
            last_activation: Mutex::new(None),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn clock(&self) -> Clock {
        self.clock
    }

    /// Today in the tracker's time zone.
    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    pub fn user(&self) -> &UserId {
        &self.user
    }

    pub fn persistence(&self) -> &Arc<P> {
        &self.persistence
    }

    pub fn store(&self) -> SharedStore {
        self.store.clone()
    }

    fn lock(&self) -> MutexGuard<'_, HabitStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn habits(&self) -> Vec<Habit> {
        self.lock().all()
    }

    pub fn habit(&self, id: HabitId) -> Option<Habit> {
        self.lock().get(id).cloned()
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<Habit>> {
        self.lock().subscribe()
    }

    /// Open the user's live feed and seed the store from its first snapshot.
    pub async fn load(&self) -> Result<HabitFeed, TrackError> {
        let mut feed = self.persistence.load_all(&self.user).await?;
        let snapshot = feed.current();
        log::info!("Loaded {} habits for {}", snapshot.len(), self.user);
        self.apply_snapshot(snapshot);
        Ok(feed)
    }

    /// Reconcile every snapshot the feed pushes until it closes.
    pub async fn follow(&self, mut feed: HabitFeed) {
        while let Some(snapshot) = feed.next().await {
            self.apply_snapshot(snapshot);
        }
        log::debug!("Habit feed for {} closed", self.user);
    }

    pub fn apply_snapshot(&self, snapshot: Vec<Habit>) -> bool {
        self.lock().reconcile(snapshot)
    }

    pub async fn create_habit(&self, input: NewHabit, today: NaiveDate) -> Result<Habit, TrackError> {
        let habit = Habit::from_input(input, today);
        self.persistence.save(&self.user, &habit).await?;
        self.lock().add(habit.clone());
        log::info!("Created habit {} ({:?}) for {}", habit.id, habit.repetition, self.user);
        Ok(habit)
    }

    /// Change the user-editable fields of a habit. Streak state is left alone.
    pub async fn update_details(&self, id: HabitId, details: NewHabit) -> Result<Habit, TrackError> {
        let mut habit = self.habit(id).ok_or(TrackError::NotFound(id))?;
        apply_details(&mut habit, &details);
        self.commit(habit, |mut current| {
            apply_details(&mut current, &details);
            current
        })
        .await
    }

    pub async fn delete_habit(&self, id: HabitId) -> Result<(), TrackError> {
        self.persistence.delete(&self.user, id).await?;
        if self.lock().remove(id).is_some() {
            log::info!("Deleted habit {}", id);
        }
        Ok(())
    }

    pub fn is_eligible(&self, id: HabitId, today: NaiveDate) -> Result<bool, TrackError> {
        let habit = self.habit(id).ok_or(TrackError::NotFound(id))?;
        Ok(streak::is_eligible_today(&habit, today))
    }

    /// Complete or uncomplete a habit for `today`.
    pub async fn toggle(&self, id: HabitId, today: NaiveDate) -> Result<Habit, TrackError> {
        let habit = self.habit(id).ok_or(TrackError::NotFound(id))?;
        if !streak::is_eligible_today(&habit, today) {
            log::debug!("Refusing toggle of {} on {}", id, today);
            return Err(StreakError::InvalidTransition { habit: id, date: today }.into());
        }

        let latest_before = self
            .persistence
            .find_latest_completion_before(&self.user, id, today)
            .await?;

        // The lookup may have raced with other actions; decide from current state.
        let Some(current) = self.habit(id) else {
            log::debug!("Habit {} deleted while toggling, discarding result", id);
            return Err(TrackError::NotFound(id));
        };
        let outcome = streak::toggle_completion(&current, today, latest_before)?;
        let mut updated = current;
        outcome.apply_to(&mut updated);

        self.apply_marker(id, outcome.marker).await?;
        let committed = self
            .commit(updated, |mut current| {
                outcome.apply_to(&mut current);
                current
            })
            .await;
        if let Err(TrackError::Persistence(e)) = &committed {
            log::warn!("Saving habit {} failed, reverting completion marker: {}", id, e);
            if let Err(undo) = self.apply_marker(id, invert(outcome.marker)).await {
                log::error!("Could not revert completion marker for {}: {}", id, undo);
            }
        }
        committed
    }

    pub async fn toggle_now(&self, id: HabitId) -> Result<Habit, TrackError> {
        self.toggle(id, self.today()).await
    }

    /// Start-of-day pass over every habit. Runs at most once per distinct `today`;
    /// returns `None` when the pass already ran for that date.
    pub async fn activate(&self, today: NaiveDate) -> Option<ActivationReport> {
        {
            let mut last = self.last_activation.lock().unwrap_or_else(PoisonError::into_inner);
            if *last == Some(today) {
                return None;
            }
            *last = Some(today);
        }

        let snapshot = self.habits();
        let mut report = ActivationReport {
            date: today,
            evaluated: snapshot.len(),
            updated: 0,
            reset: 0,
            failed: 0,
        };

        let planned: Vec<(Habit, Habit)> = snapshot
            .into_iter()
            .filter_map(|before| {
                let result = streak::reevaluate(&before, today);
                if !result.changes(&before) {
                    return None;
                }
                let mut after = before.clone();
                result.apply_to(&mut after);
                Some((before, after))
            })
            .collect();

        let saves = join_all(
            planned
                .iter()
                .map(|(_, after)| self.persistence.save(&self.user, after)),
        )
        .await;

        for ((before, after), saved) in planned.into_iter().zip(saves) {
            if let Err(e) = saved {
                log::warn!("Re-evaluation of habit {} not saved: {}", before.id, e);
                report.failed += 1;
                continue;
            }
            let mut store = self.lock();
            // Skip habits that were toggled or removed while the writes were in flight.
            if store.get(before.id) != Some(&before) {
                log::debug!("Habit {} changed during re-evaluation, keeping newer state", before.id);
                continue;
            }
            if after.streak == 0 && before.streak > 0 {
                report.reset += 1;
            }
            store.replace(before.id, after);
            report.updated += 1;
        }

        log::info!(
            "Re-evaluated {} habits for {}: {} updated, {} streaks reset, {} failed",
            report.evaluated,
            today,
            report.updated,
            report.reset,
            report.failed
        );
        Some(report)
    }

    pub async fn activate_now(&self) -> Option<ActivationReport> {
        self.activate(self.today()).await
    }

    /// Calendar cells for one month of a habit's completion history.
    pub async fn month_view(
        &self,
        id: HabitId,
        month: MonthView,
        today: NaiveDate,
    ) -> Result<Vec<Option<DayCell>>, TrackError> {
        let completions = self.persistence.completions(&self.user, id).await?;
        let habit = self.habit(id).ok_or(TrackError::NotFound(id))?;
        Ok(month.cells(&habit, &completions, today))
    }

    async fn apply_marker(&self, id: HabitId, op: MarkerOp) -> Result<(), PersistError> {
        match op {
            MarkerOp::Append(date) => {
                self.persistence
                    .append_completion_marker(&self.user, id, date)
                    .await
            }
            MarkerOp::Remove(date) => {
                self.persistence
                    .remove_completion_marker(&self.user, id, date)
                    .await
            }
        }
    }

    /// Save `candidate`, then fold this operation's fields into whatever the
    /// store holds now. Another action may have landed while the write was in
    /// flight; in that case the merged record is written again.
    async fn commit(&self, mut candidate: Habit, merge: impl Fn(Habit) -> Habit) -> Result<Habit, TrackError> {
        let id = candidate.id;
        loop {
            self.persistence.save(&self.user, &candidate).await?;
            let settled = {
                let mut store = self.lock();
                match store.get(id).cloned() {
                    None => Settle::Gone,
                    Some(current) => {
                        let merged = merge(current);
                        if merged == candidate {
                            store.replace(id, merged.clone());
                            Settle::Applied(merged)
                        } else {
                            Settle::Changed(merged)
                        }
                    }
                }
            };
            match settled {
                Settle::Gone => return self.discard_deleted(id).await,
                Settle::Applied(habit) => return Ok(habit),
                Settle::Changed(merged) => {
                    log::debug!("Habit {} changed during a pending write, saving merged state", id);
                    candidate = merged;
                }
            }
        }
    }

    /// A write landed after the habit was deleted locally: delete it again so it is not resurrected.
    async fn discard_deleted<T>(&self, id: HabitId) -> Result<T, TrackError> {
        log::debug!("Habit {} was deleted during a pending write, removing it again", id);
        self.persistence.delete(&self.user, id).await?;
        Err(TrackError::NotFound(id))
    }
}

impl HabitTracker<FilePersistence> {
    /// Tracker backed by JSON files in the configured data directory.
    pub fn open(config: &Config) -> Result<Self, ConfigError> {
        let clock = config.clock()?;
        config.ensure_data_dir()?;
        let persistence = FilePersistence::new(config.data_directory.clone());
        Ok(Self::new(config.user_id.clone(), Arc::new(persistence)).with_clock(clock))
    }
}

fn apply_details(habit: &mut Habit, details: &NewHabit) {
    habit.name = details.name.clone();
    habit.repetition = details.repetition;
    habit.category = details.category;
    habit.reminder = details.reminder.clone();
    habit.notes = details.notes.clone();
}

fn invert(op: MarkerOp) -> MarkerOp {
    match op {
        MarkerOp::Append(date) => MarkerOp::Remove(date),
        MarkerOp::Remove(date) => MarkerOp::Append(date),
    }
}
