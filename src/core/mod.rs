pub mod cadence;
pub mod calendar;
pub mod clock;
pub mod habit;
pub mod streak;
