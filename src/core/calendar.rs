use std::collections::HashSet;

use chrono::{Datelike, Months, NaiveDate};

use super::cadence::{self, days_in_month};
use super::habit::Habit;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayCell {
    pub date: NaiveDate,
    pub completed: bool,
    pub eligible: bool,
    pub is_today: bool,
}

/// One month of a habit's history, laid out Monday-first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthView {
    /// First day of the displayed month.
    pub first_of_month: NaiveDate,
}

impl MonthView {
    pub fn containing(date: NaiveDate) -> Self {
        Self {
            first_of_month: date.with_day(1).unwrap_or(date),
        }
    }

    pub fn prev_month(&self) -> Self {
        Self {
            first_of_month: self
                .first_of_month
                .checked_sub_months(Months::new(1))
                .unwrap_or(self.first_of_month),
        }
    }

    pub fn next_month(&self) -> Self {
        Self {
            first_of_month: self
                .first_of_month
                .checked_add_months(Months::new(1))
                .unwrap_or(self.first_of_month),
        }
    }

    pub fn last_of_month(&self) -> NaiveDate {
        let first = self.first_of_month;
        first
            .with_day(days_in_month(first.year(), first.month()))
            .unwrap_or(first)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.first_of_month && date <= self.last_of_month()
    }

    /// Grid cells, with `None` padding before the 1st so columns line up on Mondays.
    pub fn cells(&self, habit: &Habit, completions: &[NaiveDate], today: NaiveDate) -> Vec<Option<DayCell>> {
        let first = self.first_of_month;
        let done: HashSet<NaiveDate> = completions
            .iter()
            .copied()
            .filter(|d| self.contains(*d))
            .collect();

        let offset = first.weekday().num_days_from_monday() as usize;
        let mut cells: Vec<Option<DayCell>> = vec![None; offset];

        for date in first.iter_days().take_while(|d| d.month() == first.month()) {
            cells.push(Some(DayCell {
                date,
                completed: done.contains(&date),
                eligible: cadence::is_eligible(habit, date),
                is_today: date == today,
            }));
        }

        cells
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::habit::Repetition;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn navigation_wraps_years() {
        let view = MonthView::containing(date(2024, 1, 17));
        assert_eq!(view.first_of_month, date(2024, 1, 1));
        assert_eq!(view.prev_month().first_of_month, date(2023, 12, 1));
        assert_eq!(view.next_month().last_of_month(), date(2024, 2, 29));
    }

    #[test]
    fn grid_starts_on_monday() {
        // May 2024 starts on a Wednesday.
        let view = MonthView::containing(date(2024, 5, 1));
        let habit = Habit::new("Walk", Repetition::Daily, date(2024, 1, 1));
        let cells = view.cells(&habit, &[], date(2024, 5, 20));
        assert_eq!(cells.len(), 2 + 31);
        assert!(cells[0].is_none() && cells[1].is_none());
        assert_eq!(cells[2].unwrap().date, date(2024, 5, 1));
        assert!(cells[2 + 19].unwrap().is_today);
    }

    #[test]
    fn marks_completions_and_eligible_days() {
        let habit = Habit::new("Plan week", Repetition::Weekly, date(2024, 1, 2));
        let view = MonthView::containing(date(2024, 1, 1));
        let completions = [date(2024, 1, 9), date(2024, 1, 16), date(2023, 12, 26)];
        let cells: Vec<DayCell> = view
            .cells(&habit, &completions, date(2024, 1, 20))
            .into_iter()
            .flatten()
            .collect();

        let completed: Vec<NaiveDate> = cells.iter().filter(|c| c.completed).map(|c| c.date).collect();
        assert_eq!(completed, vec![date(2024, 1, 9), date(2024, 1, 16)]);

        let eligible = cells.iter().filter(|c| c.eligible).count();
        assert_eq!(eligible, 5);
    }
}
