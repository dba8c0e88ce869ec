use serde::{Deserialize, Serialize};
use std::{cmp, fmt};
use thiserror::Error;
use time::{
    UtcDateTime, error::ComponentRange, format_description::BorrowedFormatItem,
    macros::format_description,
};

type Result<T, E = EventIntervalError> = std::result::Result<T, E>;

const DISPLAY_DESC: &[BorrowedFormatItem<'_>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]");

/// Start and end time of an event.
///
/// Both bounds are whole seconds, matching the stored form, and the end is
/// always strictly after the start.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub struct EventInterval {
    start: UtcDateTime,
    end: UtcDateTime,
}

impl EventInterval {
    /// Sub-second parts are dropped before the bounds are compared.
    pub fn new(start: UtcDateTime, end: UtcDateTime) -> Result<Self> {
        let start = start.replace_nanosecond(0)?;
        let end = end.replace_nanosecond(0)?;
        if end <= start {
            return Err(EventIntervalError::EndNotAfterStart { start, end });
        }
        Ok(Self { start, end })
    }

    /// Convert from DB representation (unix seconds) to typed repr.
    ///
    /// Should never fail because only validated data should be inserted into DB
    pub(crate) fn from_db(start_time: i64, end_time: i64) -> Result<Self> {
        let start = UtcDateTime::from_unix_timestamp(start_time)?;
        let end = UtcDateTime::from_unix_timestamp(end_time)?;
        Self::new(start, end)
    }

    pub(crate) fn to_db(self) -> (i64, i64) {
        (self.start.unix_timestamp(), self.end.unix_timestamp())
    }

    pub fn start(&self) -> UtcDateTime {
        self.start
    }

    pub fn end(&self) -> UtcDateTime {
        self.end
    }

    /// Whether two intervals occupy any common time.
    ///
    /// Intervals are half-open, so back-to-back events (`a.end == b.start`) do
    /// not overlap.
    pub fn overlaps(&self, other: &EventInterval) -> bool {
        (self.start >= other.start && self.start < other.end)
            || (self.end > other.start && self.end <= other.end)
            || (self.start <= other.start && self.end >= other.end)
    }
}

/// Chronological by start, then by end.
impl Ord for EventInterval {
    fn cmp(&self, other: &Self) -> cmp::Ordering {
        self.start
            .cmp(&other.start)
            .then_with(|| self.end.cmp(&other.end))
    }
}

impl PartialOrd for EventInterval {
    fn partial_cmp(&self, other: &Self) -> Option<cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for EventInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let start = self.start.format(DISPLAY_DESC).map_err(|_| fmt::Error)?;
        let end = self.end.format(DISPLAY_DESC).map_err(|_| fmt::Error)?;
        write!(f, "{start} - {end}")
    }
}

#[derive(Debug, Error)]
pub enum EventIntervalError {
    #[error("{0}")]
    Inner(#[from] ComponentRange),
    #[error("end time {end} must be after start time {start}")]
    EndNotAfterStart {
        start: UtcDateTime,
        end: UtcDateTime,
    },
}
