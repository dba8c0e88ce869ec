//! Search, filter and sort over a user's events.

use std::{cmp, fmt, str::FromStr};

use thiserror::Error;
use time::UtcDateTime;

use crate::data::{Event, EventType, UnknownEventType};

mod engine;
mod params;
pub use engine::EventQueryEngine;
pub use params::{QueryParams, decode, encode, parse_timestamp};

/// Filter and sort settings applied to the event list.
///
/// The default value shows every event in start order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryState {
    /// Case-insensitive substring of title or description; empty matches everything.
    pub search: String,
    pub event_type: TypeFilter,
    pub category: CategoryFilter,
    /// Lower bound (inclusive) on the event start.
    pub start_date: Option<UtcDateTime>,
    /// Upper bound (inclusive) on the event start.
    pub end_date: Option<UtcDateTime>,
    pub sort: SortKey,
}

impl QueryState {
    /// Same filters, with the category in the form it takes after a query-string round trip.
    pub fn normalized(mut self) -> Self {
        self.category = self.category.normalized();
        self
    }

    pub fn is_default(&self) -> bool {
        *self == QueryState::default()
    }

    /// Whether `event` passes every filter.
    pub fn matches(&self, event: &Event) -> bool {
        self.matcher().matches(event)
    }

    /// Ordering used for visible events.
    pub fn compare(&self, left: &Event, right: &Event) -> cmp::Ordering {
        match self.sort {
            SortKey::Title => left.title.cmp(&right.title),
            SortKey::Date => left.start().cmp(&right.start()),
        }
    }

    /// Positions in `events` of the visible events, in display order.
    pub fn visible_indices(&self, events: &[Event]) -> Vec<usize> {
        let matcher = self.matcher();
        let mut indices: Vec<usize> = events
            .iter()
            .enumerate()
            .filter(|(_, event)| matcher.matches(event))
            .map(|(idx, _)| idx)
            .collect();
        indices.sort_by(|&left, &right| self.compare(&events[left], &events[right]));
        indices
    }

    pub fn select<'a>(&self, events: &'a [Event]) -> Vec<&'a Event> {
        self.visible_indices(events)
            .into_iter()
            .map(|idx| &events[idx])
            .collect()
    }

    fn matcher(&self) -> Matcher<'_> {
        Matcher {
            state: self,
            needle: self.search.to_lowercase(),
        }
    }
}

/// `QueryState` with the search term lowercased once.
struct Matcher<'a> {
    state: &'a QueryState,
    needle: String,
}

impl Matcher<'_> {
    fn matches(&self, event: &Event) -> bool {
        self.matches_text(event)
            && self.state.event_type.matches(event.event_type())
            && self.state.category.matches(&event.category)
            && self.matches_date(event.start())
    }

    fn matches_text(&self, event: &Event) -> bool {
        self.needle.is_empty()
            || [&event.title, &event.description]
                .iter()
                .any(|field| field.to_lowercase().contains(&self.needle))
    }

    // Only the start is bounded: an event starting before `start_date` is
    // excluded even if it runs into the range.
    fn matches_date(&self, start: UtcDateTime) -> bool {
        self.state.start_date.is_none_or(|bound| start >= bound)
            && self.state.end_date.is_none_or(|bound| start <= bound)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TypeFilter {
    #[default]
    All,
    Only(EventType),
}

impl TypeFilter {
    pub fn matches(&self, event_type: EventType) -> bool {
        match self {
            TypeFilter::All => true,
            TypeFilter::Only(only) => *only == event_type,
        }
    }
}

impl fmt::Display for TypeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeFilter::All => f.write_str("All"),
            TypeFilter::Only(event_type) => fmt::Display::fmt(event_type, f),
        }
    }
}

impl FromStr for TypeFilter {
    type Err = UnknownEventType;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "All" {
            return Ok(TypeFilter::All);
        }
        s.parse().map(TypeFilter::Only)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CategoryFilter {
    #[default]
    All,
    Only(String),
}

impl CategoryFilter {
    /// `Only("")` and `Only("All")` read back as [`CategoryFilter::All`] from a
    /// query string, so they are treated as `All` everywhere.
    pub fn normalized(self) -> Self {
        match self {
            CategoryFilter::Only(category) => CategoryFilter::from(category.as_str()),
            all => all,
        }
    }

    pub fn matches(&self, category: &str) -> bool {
        match self {
            CategoryFilter::All => true,
            CategoryFilter::Only(only) => only == category,
        }
    }
}

impl fmt::Display for CategoryFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CategoryFilter::All => f.write_str("All"),
            CategoryFilter::Only(category) => f.write_str(category),
        }
    }
}

/// `All` and the empty string both mean no filter.
impl From<&str> for CategoryFilter {
    fn from(value: &str) -> Self {
        match value {
            "" | "All" => CategoryFilter::All,
            other => CategoryFilter::Only(other.to_string()),
        }
    }
}

impl FromStr for CategoryFilter {
    type Err = std::convert::Infallible;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(s.into())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortKey {
    #[default]
    Date,
    Title,
}

impl SortKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortKey::Date => "date",
            SortKey::Title => "title",
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortKey {
    type Err = UnknownSortKey;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "date" => Ok(SortKey::Date),
            "title" => Ok(SortKey::Title),
            other => Err(UnknownSortKey(other.to_string())),
        }
    }
}

#[derive(Debug, Error)]
#[error("unknown sort key `{0}` (expected `date` or `title`)")]
pub struct UnknownSortKey(pub String);
