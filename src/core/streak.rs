//! Completion state machine for a single habit.
//!
//! Everything here is pure: the caller supplies `today` and, for toggles, the
//! latest completion date on record before `today`. Applying the outcome to the
//! store and to persistence is the tracker's job.

use chrono::NaiveDate;
use thiserror::Error;

use super::cadence;
use super::habit::{Habit, HabitId};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreakError {
    #[error("habit {habit} cannot be completed on {date}")]
    InvalidTransition { habit: HabitId, date: NaiveDate },
}

/// Completion marker change requested from persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerOp {
    Append(NaiveDate),
    Remove(NaiveDate),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToggleOutcome {
    pub streak: u32,
    pub best_streak: u32,
    pub is_completed_today: bool,
    pub last_completed: Option<NaiveDate>,
    pub marker: MarkerOp,
}

impl ToggleOutcome {
    pub fn apply_to(&self, habit: &mut Habit) {
        habit.streak = self.streak;
        habit.best_streak = self.best_streak;
        habit.is_completed_today = self.is_completed_today;
        habit.last_completed = self.last_completed;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reevaluation {
    pub streak: u32,
    pub is_completed_today: bool,
}

impl Reevaluation {
    pub fn apply_to(&self, habit: &mut Habit) {
        habit.streak = self.streak;
        habit.is_completed_today = self.is_completed_today;
    }

    pub fn changes(&self, habit: &Habit) -> bool {
        self.streak != habit.streak || self.is_completed_today != habit.is_completed_today
    }
}

pub fn is_eligible_today(habit: &Habit, today: NaiveDate) -> bool {
    cadence::is_eligible(habit, today)
}

/// Decide the result of toggling `habit` on `today`.
///
/// `latest_before` is the most recent completion marker strictly before `today`.
/// Completing extends the streak when that marker sits exactly one period back,
/// restarts it at 1 after a gap, and keeps it when there is no history to judge.
/// Uncompleting never decrements the streak.
pub fn toggle_completion(
    habit: &Habit,
    today: NaiveDate,
    latest_before: Option<NaiveDate>,
) -> Result<ToggleOutcome, StreakError> {
    if !is_eligible_today(habit, today) {
        return Err(StreakError::InvalidTransition {
            habit: habit.id,
            date: today,
        });
    }

    if habit.is_completed_today {
        return Ok(ToggleOutcome {
            streak: habit.streak,
            best_streak: habit.best_streak.max(habit.streak),
            is_completed_today: false,
            last_completed: latest_before,
            marker: MarkerOp::Remove(today),
        });
    }

    let streak = match latest_before {
        Some(date) if date == cadence::previous_occurrence(habit, today) => habit.streak.saturating_add(1),
        Some(_) => 1,
        None if habit.streak == 0 => 1,
        None => habit.streak,
    };

    log::debug!(
        "Habit {} completed on {}: streak {} -> {} (previous completion {:?})",
        habit.id,
        today,
        habit.streak,
        streak,
        latest_before
    );

    Ok(ToggleOutcome {
        streak,
        best_streak: habit.best_streak.max(streak),
        is_completed_today: true,
        last_completed: Some(today),
        marker: MarkerOp::Append(today),
    })
}

/// Start-of-period pass: clear today's flag and drop streaks that missed an occurrence.
pub fn reevaluate(habit: &Habit, today: NaiveDate) -> Reevaluation {
    let Some(last) = habit.last_completed else {
        return Reevaluation {
            streak: habit.streak,
            is_completed_today: false,
        };
    };

    // Unlike a blanket reset, a completion already recorded today survives the
    // pass, so `is_completed_today` always implies `last_completed == today`.
    let is_completed_today = habit.is_completed_today && last == today;
    let on_track = last >= cadence::previous_occurrence(habit, today);

    Reevaluation {
        streak: if on_track { habit.streak } else { 0 },
        is_completed_today,
    }
}
