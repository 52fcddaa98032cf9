use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};

use crate::cli::Mode;

/// Creation-time window for a listing, inclusive at both ends with
/// one-second granularity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    label: String,
    file_label: String,
}

impl DateWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>, label: impl Into<String>) -> Self {
        let label = label.into();
        let file_label = label.replace(' ', "_").to_lowercase();
        Self {
            start,
            end,
            label,
            file_label,
        }
    }

    pub fn for_mode(mode: Mode, now: DateTime<Utc>) -> Self {
        match mode {
            Mode::Last30 => Self::last_30_days(now),
            Mode::LastMonth => Self::previous_month(now),
        }
    }

    /// Trailing 30 days, including the current instant.
    pub fn last_30_days(now: DateTime<Utc>) -> Self {
        Self::new(now - Duration::days(30), now, "last 30 days")
    }

    /// The calendar month before `now`, from the 1st at 00:00:00 to the last
    /// day at 23:59:59 UTC.
    pub fn previous_month(now: DateTime<Utc>) -> Self {
        let (year, month) = if now.month() == 1 {
            (now.year() - 1, 12)
        } else {
            (now.year(), now.month() - 1)
        };

        let (next_year, next_month) = if month == 12 {
            (year + 1, 1)
        } else {
            (year, month + 1)
        };

        let start = month_start(year, month).unwrap_or(now);
        let end = month_start(next_year, next_month).unwrap_or(now) - Duration::seconds(1);

        Self::new(start, end, start.format("%B %Y").to_string())
    }

    /// Human label, e.g. "last 30 days" or "September 2026".
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Label safe for file names, e.g. "last_30_days" or "september_2026".
    pub fn file_label(&self) -> &str {
        &self.file_label
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at <= self.end
    }

    /// Split into two adjacent windows sharing no second.
    #[cfg(test)]
    pub fn split_at(&self, boundary: DateTime<Utc>) -> (Self, Self) {
        (
            Self::new(self.start, boundary, "first"),
            Self::new(boundary + Duration::seconds(1), self.end, "second"),
        )
    }
}

fn month_start(year: i32, month: u32) -> Option<DateTime<Utc>> {
    Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0).single()
}
