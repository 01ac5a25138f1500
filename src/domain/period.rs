//! Calendar periods used as delta windows
//!
//! Weeks run Monday to Sunday. A "day" delta compares against the most
//! recent snapshot taken on or before yesterday.

use chrono::{Datelike, Duration, Local, NaiveDate, NaiveDateTime};

/// Width of the window a delta is computed over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeriodKind {
    Week,
    Day,
}

impl PeriodKind {
    /// Boundary date for the period containing `reference`
    ///
    /// For `Week` this is the Monday on or before `reference`. For `Day` it
    /// is the day before `reference`.
    pub fn period_start(self, reference: NaiveDate) -> NaiveDate {
        match self {
            PeriodKind::Week => week_start(reference),
            PeriodKind::Day => reference - Duration::days(1),
        }
    }
}

/// Monday on or before `date`
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

/// Resolve an optional reference instant to a calendar date
///
/// `None` means "now" in local time.
pub fn reference_date(reference: Option<NaiveDateTime>) -> NaiveDate {
    reference
        .map(|instant| instant.date())
        .unwrap_or_else(|| Local::now().date_naive())
}
