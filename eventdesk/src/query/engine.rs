use time::UtcDateTime;

use super::{CategoryFilter, QueryParams, QueryState, SortKey, TypeFilter, decode, encode};
use crate::data::Event;

/// Holds a user's events and the current [`QueryState`], and keeps the visible
/// list and the shareable query string up to date with both.
///
/// Every change triggers a full re-filter and re-sort; there is no incremental update.
#[derive(Debug)]
pub struct EventQueryEngine {
    events: Vec<Event>,
    state: QueryState,
    /// Indices into `events`, in display order.
    visible: Vec<usize>,
    /// Current query string. Replaced in place on each change, no history is kept.
    location: String,
    recomputations: usize,
}

impl EventQueryEngine {
    /// Seed the query from incoming parameters.
    pub fn new(events: Vec<Event>, params: &QueryParams) -> Self {
        Self::with_state(events, decode(params))
    }

    pub fn with_state(events: Vec<Event>, state: QueryState) -> Self {
        let mut engine = Self {
            events,
            state: state.normalized(),
            visible: vec![],
            location: String::new(),
            recomputations: 0,
        };
        engine.sync_location();
        engine.recompute();
        engine
    }

    pub fn state(&self) -> &QueryState {
        &self.state
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Visible events in display order.
    pub fn visible(&self) -> impl ExactSizeIterator<Item = &Event> + '_ {
        self.visible.iter().map(|&idx| &self.events[idx])
    }

    /// Query string for the current state, without the leading `?`.
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Number of times the visible list has been rebuilt.
    pub fn recomputations(&self) -> usize {
        self.recomputations
    }

    /// True iff any field differs from its default.
    pub fn has_active_filters(&self) -> bool {
        !self.state.is_default()
    }

    /// Replace the event set, e.g. after the store was reloaded.
    pub fn set_events(&mut self, events: Vec<Event>) {
        self.events = events;
        self.recompute();
    }

    pub fn set_search(&mut self, search: impl Into<String>) {
        let search = search.into();
        self.update(|state| state.search = search);
    }

    pub fn set_event_type(&mut self, event_type: TypeFilter) {
        self.update(|state| state.event_type = event_type);
    }

    pub fn set_category(&mut self, category: CategoryFilter) {
        self.update(|state| state.category = category);
    }

    pub fn set_start_date(&mut self, start_date: Option<UtcDateTime>) {
        self.update(|state| state.start_date = start_date);
    }

    pub fn set_end_date(&mut self, end_date: Option<UtcDateTime>) {
        self.update(|state| state.end_date = end_date);
    }

    pub fn set_sort(&mut self, sort: SortKey) {
        self.update(|state| state.sort = sort);
    }

    /// Restore every field to its default in a single update.
    pub fn reset(&mut self) {
        self.update(|state| *state = QueryState::default());
    }

    /// Apply an arbitrary change to the query. Recomputes once if anything changed.
    pub fn update(&mut self, change: impl FnOnce(&mut QueryState)) {
        let mut next = self.state.clone();
        change(&mut next);
        let next = next.normalized();
        if next == self.state {
            return;
        }
        self.state = next;
        self.sync_location();
        self.recompute();
    }

    fn sync_location(&mut self) {
        self.location = encode(&self.state).to_query_string();
    }

    fn recompute(&mut self) {
        self.visible = self.state.visible_indices(&self.events);
        self.recomputations += 1;
        tracing::debug!(
            "{} of {} events visible (query `{}`)",
            self.visible.len(),
            self.events.len(),
            self.location
        );
    }
}

#[cfg(test)]
mod tests {
    use time::macros::utc_datetime;

    use super::EventQueryEngine;
    use crate::data::EventType;
    use crate::query::{CategoryFilter, QueryParams, QueryState, SortKey, TypeFilter, fixtures};

    fn ids(engine: &EventQueryEngine) -> Vec<i64> {
        engine.visible().map(|event| event.id).collect()
    }

    #[test]
    fn seeded_from_params() {
        let params = QueryParams::parse("?type=Online&sort=title");
        let engine = EventQueryEngine::new(fixtures::events(), &params);
        assert_eq!(engine.state().event_type, TypeFilter::Only(EventType::Online));
        assert_eq!(ids(&engine), [2, 4]);
        assert_eq!(engine.location(), "type=Online&sort=title");
        assert_eq!(engine.recomputations(), 1);
        assert!(engine.has_active_filters());
    }

    #[test]
    fn location_is_normalised_on_load() {
        let params = QueryParams::parse("?sort=date&category=All&type=Bogus");
        let engine = EventQueryEngine::new(fixtures::events(), &params);
        assert_eq!(engine.location(), "");
        assert!(!engine.has_active_filters());
    }

    #[test]
    fn all_or_empty_category_means_no_filter() {
        let engine = EventQueryEngine::with_state(
            fixtures::events(),
            QueryState {
                category: CategoryFilter::Only(String::new()),
                ..QueryState::default()
            },
        );
        assert_eq!(engine.state().category, CategoryFilter::All);
        assert_eq!(ids(&engine), [2, 3, 4, 1]);
        assert!(!engine.has_active_filters());

        let mut engine = engine;
        engine.set_category(CategoryFilter::Only("All".into()));
        assert_eq!(engine.recomputations(), 1);
        assert_eq!(engine.location(), "");
        assert!(!engine.has_active_filters());
    }

    #[test]
    fn each_change_recomputes_once() {
        let mut engine = EventQueryEngine::new(fixtures::events(), &QueryParams::default());
        assert_eq!(ids(&engine), [2, 3, 4, 1]);

        engine.set_category(CategoryFilter::Only("Workshop".into()));
        assert_eq!(ids(&engine), [4, 1]);
        assert_eq!(engine.recomputations(), 2);
        assert_eq!(engine.location(), "category=Workshop");

        // same value again is not a change
        engine.set_category(CategoryFilter::Only("Workshop".into()));
        assert_eq!(engine.recomputations(), 2);

        engine.set_sort(SortKey::Title);
        assert_eq!(ids(&engine), [4, 1]);
        engine.set_search("LIFETIMES");
        assert_eq!(ids(&engine), [4]);
        assert_eq!(engine.recomputations(), 4);
        assert_eq!(
            engine.location(),
            "query=LIFETIMES&category=Workshop&sort=title"
        );
    }

    #[test]
    fn reset_is_one_update() {
        let mut engine = EventQueryEngine::new(
            fixtures::events(),
            &QueryParams::parse("query=rust&type=In-Person&startDate=2024-02-01&sort=title"),
        );
        assert_eq!(ids(&engine), [3, 1]);
        let before = engine.recomputations();

        engine.reset();
        assert_eq!(engine.recomputations(), before + 1);
        assert_eq!(*engine.state(), QueryState::default());
        assert!(!engine.has_active_filters());
        assert_eq!(engine.location(), "");

        let fresh = EventQueryEngine::new(fixtures::events(), &QueryParams::default());
        assert_eq!(ids(&engine), ids(&fresh));
    }

    #[test]
    fn active_filters_track_every_field() {
        let mut engine = EventQueryEngine::new(fixtures::events(), &QueryParams::default());
        let changes: [fn(&mut EventQueryEngine); 6] = [
            |e| e.set_search("x"),
            |e| e.set_event_type(TypeFilter::Only(EventType::InPerson)),
            |e| e.set_category(CategoryFilter::Only("Other".into())),
            |e| e.set_start_date(Some(utc_datetime!(2024-01-01 00:00))),
            |e| e.set_end_date(Some(utc_datetime!(2024-12-31 00:00))),
            |e| e.set_sort(SortKey::Title),
        ];
        for change in changes {
            assert!(!engine.has_active_filters());
            change(&mut engine);
            assert!(engine.has_active_filters());
            engine.reset();
        }
    }

    #[test]
    fn new_event_set_is_refiltered() {
        let mut engine = EventQueryEngine::new(
            fixtures::events(),
            &QueryParams::parse("category=Workshop"),
        );
        assert_eq!(ids(&engine), [4, 1]);
        let mut events = fixtures::events();
        events.retain(|event| event.id != 1);
        engine.set_events(events);
        assert_eq!(ids(&engine), [4]);
    }
}
