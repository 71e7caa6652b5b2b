use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};

/// Source of "today" in one fixed time zone.
///
/// Every date the core compares (creation, completion, re-evaluation) must come
/// from the same clock, otherwise a completion late in the evening can land on a
/// different calendar day than the habit's anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Clock {
    offset: FixedOffset,
}

impl Clock {
    pub fn utc() -> Self {
        Self {
            offset: Utc.fix(),
        }
    }

    /// Returns `None` when the offset is outside +/- 24 hours.
    pub fn with_offset_minutes(minutes: i32) -> Option<Self> {
        FixedOffset::east_opt(minutes.checked_mul(60)?).map(|offset| Self { offset })
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    pub fn date_of(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.offset).date_naive()
    }

    pub fn today(&self) -> NaiveDate {
        self.date_of(Utc::now())
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::utc()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn offset_moves_date_boundary() {
        let instant = Utc.with_ymd_and_hms(2024, 1, 9, 23, 30, 0).unwrap();
        let stockholm = Clock::with_offset_minutes(60).unwrap();
        let utc = Clock::utc();
        assert_eq!(utc.date_of(instant), NaiveDate::from_ymd_opt(2024, 1, 9).unwrap());
        assert_eq!(stockholm.date_of(instant), NaiveDate::from_ymd_opt(2024, 1, 10).unwrap());
    }

    #[test]
    fn rejects_out_of_range_offset() {
        assert!(Clock::with_offset_minutes(25 * 60).is_none());
        assert!(Clock::with_offset_minutes(-5 * 60).is_some());
    }
}
