use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::UtcDateTime;

mod interval;
mod validate;
pub use interval::{EventInterval, EventIntervalError};
pub use validate::{Issue, ValidationError};

pub type RowID = i64;

/// Categories offered when creating an event. Not enforced by the store.
pub const CATEGORIES: &[&str] = &[
    "Conference",
    "Workshop",
    "Webinar",
    "Meetup",
    "Hackathon",
    "Other",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    Online,
    #[serde(rename = "In-Person")]
    InPerson,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Online => "Online",
            EventType::InPerson => "In-Person",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = UnknownEventType;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Online" => Ok(EventType::Online),
            "In-Person" => Ok(EventType::InPerson),
            other => Err(UnknownEventType(other.to_string())),
        }
    }
}

#[derive(Debug, Error)]
#[error("unknown event type `{0}` (expected `Online` or `In-Person`)")]
pub struct UnknownEventType(pub String);

/// Where an event takes place: a link for online events, a location otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Venue {
    Online { link: String },
    InPerson { location: String },
}

impl Venue {
    pub fn event_type(&self) -> EventType {
        match self {
            Venue::Online { .. } => EventType::Online,
            Venue::InPerson { .. } => EventType::InPerson,
        }
    }

    pub fn link(&self) -> Option<&str> {
        match self {
            Venue::Online { link } => Some(link),
            Venue::InPerson { .. } => None,
        }
    }

    pub fn location(&self) -> Option<&str> {
        match self {
            Venue::Online { .. } => None,
            Venue::InPerson { location } => Some(location),
        }
    }

    fn from_db(
        event_type: &str,
        location: Option<String>,
        event_link: Option<String>,
    ) -> Result<Self, UnknownEventType> {
        Ok(match event_type.parse()? {
            EventType::Online => Venue::Online {
                link: event_link.unwrap_or_default(),
            },
            EventType::InPerson => Venue::InPerson {
                location: location.unwrap_or_default(),
            },
        })
    }
}

impl fmt::Display for Venue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Venue::Online { link } => write!(f, "online ({link})"),
            Venue::InPerson { location } => write!(f, "{location}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, cli_table::Table)]
pub struct Event {
    #[table(title = "ID")]
    pub id: RowID,
    #[table(skip)]
    pub organizer: String,
    #[table(title = "Title")]
    pub title: String,
    #[table(skip)]
    pub description: String,
    #[table(title = "Where")]
    pub venue: Venue,
    #[table(title = "When")]
    pub interval: EventInterval,
    #[table(title = "Category")]
    pub category: String,
}

impl Event {
    pub fn event_type(&self) -> EventType {
        self.venue.event_type()
    }

    pub fn start(&self) -> UtcDateTime {
        self.interval.start()
    }

    pub(crate) fn from_db(row: EventRow) -> Result<Self, sqlx::Error> {
        let interval = EventInterval::from_db(row.start_time, row.end_time)
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
        let venue = Venue::from_db(&row.event_type, row.location, row.event_link)
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
        Ok(Event {
            id: row.id,
            organizer: row.organizer,
            title: row.title,
            description: row.description,
            venue,
            interval,
            category: row.category,
        })
    }

    /// Produce the event that results from applying `patch` to this one.
    pub fn patched(&self, patch: EventPatch) -> Result<NewEvent, EventIntervalError> {
        let interval = match (patch.start, patch.end) {
            (None, None) => self.interval,
            (start, end) => EventInterval::new(
                start.unwrap_or(self.interval.start()),
                end.unwrap_or(self.interval.end()),
            )?,
        };
        Ok(NewEvent {
            title: patch.title.unwrap_or_else(|| self.title.clone()),
            description: patch
                .description
                .unwrap_or_else(|| self.description.clone()),
            venue: patch.venue.unwrap_or_else(|| self.venue.clone()),
            interval,
            category: patch.category.unwrap_or_else(|| self.category.clone()),
        })
    }
}

/// Raw `events` row as stored.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct EventRow {
    pub id: RowID,
    pub organizer: String,
    pub title: String,
    pub description: String,
    pub event_type: String,
    pub location: Option<String>,
    pub event_link: Option<String>,
    pub start_time: i64,
    pub end_time: i64,
    pub category: String,
}

/// An event that has not been stored yet. The organizer is filled in by the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEvent {
    pub title: String,
    pub description: String,
    pub venue: Venue,
    pub interval: EventInterval,
    pub category: String,
}

/// Partial update of an event; `None` leaves the field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub venue: Option<Venue>,
    pub start: Option<UtcDateTime>,
    pub end: Option<UtcDateTime>,
    pub category: Option<String>,
}

impl EventPatch {
    pub fn is_empty(&self) -> bool {
        *self == EventPatch::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: RowID,
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password: String,
}
