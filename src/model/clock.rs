//! Calendar position used by the seasonal models.

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Timelike};

/// Fractional month and hour of an instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeasonalTime {
    /// `month + day / days_in_month`.
    pub month: f64,
    /// `hour + (minute + second / 60) / 60`.
    pub hour: f64,
}

impl SeasonalTime {
    /// Compute the calendar position from the instant's own (local) fields.
    pub fn from_datetime<Tz: TimeZone>(at: &DateTime<Tz>) -> Self {
        let days = days_in_month(at.year(), at.month());
        let month = f64::from(at.month()) + f64::from(at.day()) / f64::from(days);
        let hour = f64::from(at.hour())
            + (f64::from(at.minute()) + f64::from(at.second()) / 60.0) / 60.0;
        Self { month, hour }
    }
}

/// Length of a calendar month in days (28-31).
pub fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first| first.pred_opt())
        .map(|last| last.day())
        .unwrap_or(31)
}
