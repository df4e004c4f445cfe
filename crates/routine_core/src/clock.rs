//! Time-of-day and calendar-date normalization shared by the validator and
//! the request layer.
//!
//! Clock times travel as `HH:mm` (24 hour) and dates as `YYYY-MM-DD`. The
//! core never picks a reference date on its own: creates are anchored to the
//! date the caller passes (the CLI defaults it to today), edits to the date
//! the caller passes or the task's existing day.

use crate::error::AppError;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{Date, Duration, OffsetDateTime, Time, UtcOffset};

const CLOCK_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[hour]:[minute]");
const DATE_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");

pub fn parse_clock_time(raw: &str) -> Result<Time, AppError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AppError::invalid_format("time is required (HH:mm)"));
    }

    Time::parse(trimmed, CLOCK_FORMAT)
        .map_err(|_| AppError::invalid_format(format!("'{trimmed}' is not a valid HH:mm time")))
}

pub fn parse_calendar_date(raw: &str) -> Result<Date, AppError> {
    let trimmed = raw.trim();
    Date::parse(trimmed, DATE_FORMAT).map_err(|_| {
        AppError::invalid_format(format!("'{trimmed}' is not a valid YYYY-MM-DD date"))
    })
}

pub fn format_clock_time(value: OffsetDateTime) -> String {
    format!("{:02}:{:02}", value.hour(), value.minute())
}

pub fn format_calendar_date(date: Date) -> String {
    format!(
        "{:04}-{:02}-{:02}",
        date.year(),
        u8::from(date.month()),
        date.day()
    )
}

pub fn local_offset() -> UtcOffset {
    UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC)
}

pub fn today(offset: UtcOffset) -> Date {
    OffsetDateTime::now_utc().to_offset(offset).date()
}

/// A contiguous `[start, end)` span on a single calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    start: OffsetDateTime,
    end: OffsetDateTime,
}

impl Interval {
    /// Anchors both clock times to `date` at `offset`. `end` must be
    /// strictly after `start`.
    pub fn on(date: Date, start: Time, end: Time, offset: UtcOffset) -> Result<Self, AppError> {
        let start = date.with_time(start).assume_offset(offset);
        let end = date.with_time(end).assume_offset(offset);
        Self::new(start, end)
    }

    pub fn new(start: OffsetDateTime, end: OffsetDateTime) -> Result<Self, AppError> {
        if end <= start {
            return Err(AppError::invalid_range(format!(
                "end time {} must be after start time {}",
                format_clock_time(end),
                format_clock_time(start)
            )));
        }
        Ok(Self { start, end })
    }

    /// Same wall-clock window, read at `offset` instead.
    pub fn at_offset(self, offset: UtcOffset) -> Self {
        Self {
            start: self.start.replace_offset(offset),
            end: self.end.replace_offset(offset),
        }
    }

    pub fn start(&self) -> OffsetDateTime {
        self.start
    }

    pub fn end(&self) -> OffsetDateTime {
        self.end
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Half-open intersection; intervals that merely touch do not overlap.
    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start < other.end && self.end > other.start
    }
}
