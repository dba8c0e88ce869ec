//! Query-string form of [`QueryState`], so a filtered view can be shared as a link.

use time::{
    OffsetDateTime, PrimitiveDateTime, UtcDateTime, UtcOffset, format_description::BorrowedFormatItem,
    format_description::well_known::Rfc3339, macros::format_description,
};
use url::form_urlencoded;

use super::{CategoryFilter, QueryState, SortKey, TypeFilter};

const QUERY: &str = "query";
const TYPE: &str = "type";
const CATEGORY: &str = "category";
const START_DATE: &str = "startDate";
const END_DATE: &str = "endDate";
const SORT: &str = "sort";

const DATETIME_DESC: &[BorrowedFormatItem<'_>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]");
const DATE_DESC: &[BorrowedFormatItem<'_>] = format_description!("[year]-[month]-[day]");

/// Ordered `key=value` pairs of a query string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams(Vec<(String, String)>);

impl QueryParams {
    /// Parse `application/x-www-form-urlencoded` input. A leading `?` is ignored.
    pub fn parse(input: &str) -> Self {
        let input = input.strip_prefix('?').unwrap_or(input);
        Self(
            form_urlencoded::parse(input.as_bytes())
                .map(|(key, value)| (key.into_owned(), value.into_owned()))
                .collect(),
        )
    }

    /// First value for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, value)| value.as_str())
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.push((key.into(), value.into()));
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Encoded form without the leading `?`.
    pub fn to_query_string(&self) -> String {
        form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.iter())
            .finish()
    }
}

/// Non-default fields of `state`, in a fixed order. The default state encodes to nothing.
pub fn encode(state: &QueryState) -> QueryParams {
    let mut params = QueryParams::default();
    if !state.search.is_empty() {
        params.push(QUERY, state.search.as_str());
    }
    if state.event_type != TypeFilter::All {
        params.push(TYPE, state.event_type.to_string());
    }
    if let CategoryFilter::Only(category) = &state.category {
        params.push(CATEGORY, category.as_str());
    }
    if let Some(start) = state.start_date {
        params.push(START_DATE, format_timestamp(start));
    }
    if let Some(end) = state.end_date {
        params.push(END_DATE, format_timestamp(end));
    }
    if state.sort != SortKey::Date {
        params.push(SORT, state.sort.as_str());
    }
    params
}

/// Read a [`QueryState`] back. Each field falls back to its default on its own if
/// it is missing, empty or cannot be parsed.
pub fn decode(params: &QueryParams) -> QueryState {
    let get = |key| non_empty(params, key);
    QueryState {
        search: get(QUERY).unwrap_or_default().to_string(),
        event_type: get(TYPE)
            .and_then(|value| parse_or_warn(TYPE, value, |v| v.parse::<TypeFilter>().ok()))
            .unwrap_or_default(),
        category: get(CATEGORY).map(CategoryFilter::from).unwrap_or_default(),
        start_date: get(START_DATE)
            .and_then(|value| parse_or_warn(START_DATE, value, parse_timestamp)),
        end_date: get(END_DATE).and_then(|value| parse_or_warn(END_DATE, value, parse_timestamp)),
        sort: get(SORT)
            .and_then(|value| parse_or_warn(SORT, value, |v| v.parse::<SortKey>().ok()))
            .unwrap_or_default(),
    }
}

fn non_empty<'a>(params: &'a QueryParams, key: &str) -> Option<&'a str> {
    params.get(key).filter(|value| !value.is_empty())
}

fn parse_or_warn<T>(key: &str, value: &str, parse: impl FnOnce(&str) -> Option<T>) -> Option<T> {
    let parsed = parse(value);
    if parsed.is_none() {
        tracing::warn!("ignoring unparsable `{key}` parameter `{value}`");
    }
    parsed
}

/// Accepts RFC 3339 (any offset), `YYYY-MM-DDTHH:MM` / `YYYY-MM-DD` taken as UTC,
/// or unix seconds as written for years RFC 3339 cannot express.
pub fn parse_timestamp(input: &str) -> Option<UtcDateTime> {
    if let Ok(secs) = input.parse::<i64>() {
        return UtcDateTime::from_unix_timestamp(secs).ok();
    }
    if let Ok(dt) = OffsetDateTime::parse(input, &Rfc3339) {
        return Some(dt.to_utc());
    }
    if let Ok(dt) = PrimitiveDateTime::parse(input, DATETIME_DESC) {
        return Some(dt.as_utc());
    }
    time::Date::parse(input, DATE_DESC)
        .ok()
        .map(|date| date.midnight().as_utc())
}

fn format_timestamp(dt: UtcDateTime) -> String {
    dt.to_offset(UtcOffset::UTC)
        .format(&Rfc3339)
        // only fails for years outside 0..=9999
        .unwrap_or_else(|_| dt.unix_timestamp().to_string())
}
