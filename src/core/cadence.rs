use chrono::{Datelike, Duration, NaiveDate};

use super::habit::{Habit, Repetition};

pub fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|d| d.pred_opt())
        .map(|d| d.day())
        .unwrap_or(28)
}

pub fn is_last_day_of_month(date: NaiveDate) -> bool {
    date.day() == days_in_month(date.year(), date.month())
}

/// The anchor day clamped to the length of the given month, so an anchor of
/// the 31st lands on the 30th in April and on the 28th or 29th in February.
fn monthly_day(anchor: NaiveDate, year: i32, month: u32) -> NaiveDate {
    let day = anchor.day().min(days_in_month(year, month));
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or(anchor)
}

fn month_before(year: i32, month: u32) -> (i32, u32) {
    if month == 1 { (year - 1, 12) } else { (year, month - 1) }
}

/// Whether the habit's cadence allows completing it on `today`.
pub fn is_eligible(habit: &Habit, today: NaiveDate) -> bool {
    let anchor = habit.created_at;
    match habit.repetition {
        Repetition::Daily => true,
        Repetition::Weekly => today.weekday() == anchor.weekday(),
        Repetition::Monthly => {
            let same_month = today.year() == anchor.year() && today.month() == anchor.month();
            !same_month && today == monthly_day(anchor, today.year(), today.month())
        }
    }
}

/// Latest on-cadence date strictly before `today`.
///
/// On an eligible day this is exactly one period back: yesterday, the same
/// weekday a week earlier, or the anchor day of the previous month.
pub fn previous_occurrence(habit: &Habit, today: NaiveDate) -> NaiveDate {
    let anchor = habit.created_at;
    match habit.repetition {
        Repetition::Daily => today - Duration::days(1),
        Repetition::Weekly => {
            let back = (today.weekday().num_days_from_monday() + 7
                - anchor.weekday().num_days_from_monday())
                % 7;
            let back = if back == 0 { 7 } else { back };
            today - Duration::days(back as i64)
        }
        Repetition::Monthly => {
            let this_month = monthly_day(anchor, today.year(), today.month());
            if this_month < today {
                this_month
            } else {
                let (year, month) = month_before(today.year(), today.month());
                monthly_day(anchor, year, month)
            }
        }
    }
}
