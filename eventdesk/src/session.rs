//! The logged in user and their events.

use sqlx::SqlitePool;
use thiserror::Error;

use crate::{
    data::{
        Event, EventInterval, EventIntervalError, EventPatch, NewEvent, NewUser, RowID, User,
        ValidationError,
    },
    db,
    query::{EventQueryEngine, QueryParams},
};

type Result<T, E = SessionError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("event time overlaps with an existing event (`{title}`, id {id})")]
    Overlap { id: RowID, title: String },
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Interval(#[from] EventIntervalError),
    #[error("no event with id {0}")]
    NotFound(RowID),
    #[error("a user with email `{0}` already exists")]
    DuplicateEmail(String),
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("database error")]
    Database(#[from] sqlx::Error),
}

/// An authenticated user together with a cached copy of their events.
///
/// Created by [`signup`](Self::signup), [`login`](Self::login) or
/// [`restore`](Self::restore) and ended by [`logout`](Self::logout). The cache
/// is reloaded in full after every mutation.
#[derive(Debug)]
pub struct Session {
    pool: SqlitePool,
    user: User,
    events: Vec<Event>,
}

impl Session {
    pub async fn signup(pool: SqlitePool, user: NewUser) -> Result<Self> {
        user.validate()?;
        let mut conn = pool.acquire().await?;
        if db::find_user_by_email(&user.email, &mut *conn)
            .await?
            .is_some()
        {
            return Err(SessionError::DuplicateEmail(user.email));
        }
        let user = db::new_user(&user, &mut *conn).await?;
        tracing::info!("created user `{}`", user.email);
        drop(conn);
        Self::start(pool, user).await
    }

    pub async fn login(pool: SqlitePool, email: &str, password: &str) -> Result<Self> {
        let mut conn = pool.acquire().await?;
        let user = db::find_user_by_credentials(email, password, &mut *conn)
            .await?
            .ok_or(SessionError::InvalidCredentials)?;
        drop(conn);
        Self::start(pool, user).await
    }

    /// Resume the session of the last user to log in, if they still exist.
    pub async fn restore(pool: SqlitePool) -> Result<Option<Self>> {
        let mut conn = pool.acquire().await?;
        let Some(email) = db::current_user(&mut *conn).await? else {
            return Ok(None);
        };
        let Some(user) = db::find_user_by_email(&email, &mut *conn).await? else {
            tracing::debug!("clearing stale session for `{email}`");
            db::clear_current_user(&mut *conn).await?;
            return Ok(None);
        };
        let events = db::get_events(&user.email, &mut *conn).await?;
        drop(conn);
        Ok(Some(Self { pool, user, events }))
    }

    async fn start(pool: SqlitePool, user: User) -> Result<Self> {
        let mut conn = pool.acquire().await?;
        db::set_current_user(&user.email, &mut *conn).await?;
        let events = db::get_events(&user.email, &mut *conn).await?;
        drop(conn);
        tracing::info!("logged in as `{}`", user.email);
        Ok(Self { pool, user, events })
    }

    pub async fn logout(self) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        db::clear_current_user(&mut *conn).await?;
        tracing::info!("logged out `{}`", self.user.email);
        Ok(())
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Query engine over a snapshot of the cached events.
    pub fn query_engine(&self, params: &QueryParams) -> EventQueryEngine {
        EventQueryEngine::new(self.events.clone(), params)
    }

    pub async fn reload(&mut self) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        self.events = db::get_events(&self.user.email, &mut *conn).await?;
        Ok(())
    }

    /// First cached event that `interval` would overlap, ignoring `exclude`.
    pub fn find_overlap(&self, interval: &EventInterval, exclude: Option<RowID>) -> Option<&Event> {
        self.events
            .iter()
            .filter(|event| Some(event.id) != exclude)
            .find(|event| interval.overlaps(&event.interval))
    }

    pub async fn get_event(&self, id: RowID) -> Result<Option<Event>> {
        let mut conn = self.pool.acquire().await?;
        Ok(db::get_event(id, &self.user.email, &mut *conn).await?)
    }

    pub async fn add_event(&mut self, event: NewEvent) -> Result<RowID> {
        event.validate()?;
        self.check_overlap(&event.interval, None)?;
        let mut conn = self.pool.acquire().await?;
        let stored = db::new_event(&self.user.email, &event, &mut *conn).await?;
        drop(conn);
        tracing::info!("created event {} `{}`", stored.id, stored.title);
        self.reload().await?;
        Ok(stored.id)
    }

    pub async fn update_event(&mut self, id: RowID, patch: EventPatch) -> Result<()> {
        let current = self
            .get_event(id)
            .await?
            .ok_or(SessionError::NotFound(id))?;
        let event = current.patched(patch)?;
        event.validate()?;
        self.check_overlap(&event.interval, Some(id))?;
        let mut conn = self.pool.acquire().await?;
        if !db::update_event(id, &self.user.email, &event, &mut *conn).await? {
            return Err(SessionError::NotFound(id));
        }
        drop(conn);
        tracing::info!("updated event {id}");
        self.reload().await
    }

    pub async fn delete_event(&mut self, id: RowID) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        if !db::delete_event(id, &self.user.email, &mut *conn).await? {
            return Err(SessionError::NotFound(id));
        }
        drop(conn);
        tracing::info!("deleted event {id}");
        self.reload().await
    }

    fn check_overlap(&self, interval: &EventInterval, exclude: Option<RowID>) -> Result<()> {
        match self.find_overlap(interval, exclude) {
            Some(event) => Err(SessionError::Overlap {
                id: event.id,
                title: event.title.clone(),
            }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use time::macros::utc_datetime;

    use super::{Session, SessionError};
    use crate::data::{EventInterval, EventPatch, NewUser, Venue, fixtures};
    use crate::db;
    use crate::query::QueryParams;

    fn user(name: &str) -> NewUser {
        NewUser {
            username: name.to_string(),
            email: format!("{name}@example.com"),
            password: "secret".to_string(),
        }
    }

    fn ten_to_eleven() -> crate::data::NewEvent {
        fixtures::new_event(
            "Morning workshop",
            utc_datetime!(2024-01-01 10:00),
            utc_datetime!(2024-01-01 11:00),
            "Workshop",
        )
    }

    #[tokio::test]
    async fn signup_login_restore_logout() {
        let pool = db::test_pool().await;
        let session = Session::signup(pool.clone(), user("alice")).await.unwrap();
        assert_eq!(session.user().username, "alice");
        assert!(matches!(
            Session::signup(pool.clone(), user("alice")).await,
            Err(SessionError::DuplicateEmail(_))
        ));

        let restored = Session::restore(pool.clone()).await.unwrap().unwrap();
        assert_eq!(restored.user().email, "alice@example.com");
        let alice_id = restored.user().id;
        restored.logout().await.unwrap();
        assert!(Session::restore(pool.clone()).await.unwrap().is_none());

        assert!(matches!(
            Session::login(pool.clone(), "alice@example.com", "wrong").await,
            Err(SessionError::InvalidCredentials)
        ));
        let session = Session::login(pool.clone(), "alice@example.com", "secret")
            .await
            .unwrap();
        assert_eq!(session.user().id, alice_id);
        assert!(Session::restore(pool).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn signup_checks_account_fields() {
        let pool = db::test_pool().await;
        let res = Session::signup(
            pool.clone(),
            NewUser {
                username: String::new(),
                email: "x".into(),
                password: String::new(),
            },
        )
        .await;
        match res {
            Err(SessionError::Validation(err)) => assert_eq!(err.issues.len(), 3),
            other => panic!("expected validation error, got {other:?}"),
        }
        let mut conn = pool.acquire().await.unwrap();
        assert!(db::find_user_by_email("x", &mut *conn).await.unwrap().is_none());
        assert!(db::current_user(&mut *conn).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn stale_marker_is_cleared_on_restore() {
        let pool = db::test_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        db::set_current_user("ghost@example.com", &mut *conn)
            .await
            .unwrap();
        drop(conn);

        assert!(Session::restore(pool.clone()).await.unwrap().is_none());
        let mut conn = pool.acquire().await.unwrap();
        assert!(db::current_user(&mut *conn).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn sub_second_times_are_stored_as_whole_seconds() {
        let pool = db::test_pool().await;
        let mut session = Session::signup(pool.clone(), user("alice")).await.unwrap();
        let mut event = ten_to_eleven();
        event.interval = EventInterval::new(
            utc_datetime!(2024-01-01 10:00:00.3),
            utc_datetime!(2024-01-01 10:00:01.7),
        )
        .unwrap();
        let id = session.add_event(event).await.unwrap();
        let stored = session.get_event(id).await.unwrap().unwrap();
        assert_eq!(stored.interval.start(), utc_datetime!(2024-01-01 10:00:00));
        assert_eq!(stored.interval.end(), utc_datetime!(2024-01-01 10:00:01));

        // the store stays readable
        let session = Session::login(pool, "alice@example.com", "secret")
            .await
            .unwrap();
        assert_eq!(session.events().len(), 1);
    }

    #[tokio::test]
    async fn overlap_is_rejected_before_storage() {
        let pool = db::test_pool().await;
        let mut session = Session::signup(pool, user("alice")).await.unwrap();
        let first = session.add_event(ten_to_eleven()).await.unwrap();
        assert_eq!(session.events().len(), 1);

        let inside = fixtures::new_event(
            "Inner talk",
            utc_datetime!(2024-01-01 10:30),
            utc_datetime!(2024-01-01 10:45),
            "Conference",
        );
        match session.add_event(inside).await {
            Err(SessionError::Overlap { id, .. }) => assert_eq!(id, first),
            other => panic!("expected overlap, got {other:?}"),
        }
        assert_eq!(session.events().len(), 1);

        let after = fixtures::new_event(
            "Lunch meetup",
            utc_datetime!(2024-01-01 11:00),
            utc_datetime!(2024-01-01 12:00),
            "Meetup",
        );
        let before = fixtures::new_event(
            "Breakfast meetup",
            utc_datetime!(2024-01-01 09:00),
            utc_datetime!(2024-01-01 10:00),
            "Meetup",
        );
        session.add_event(after).await.unwrap();
        session.add_event(before).await.unwrap();
        assert_eq!(session.events().len(), 3);
    }

    #[tokio::test]
    async fn invalid_event_is_rejected() {
        let pool = db::test_pool().await;
        let mut session = Session::signup(pool, user("alice")).await.unwrap();
        let mut event = ten_to_eleven();
        event.venue = Venue::Online {
            link: String::new(),
        };
        assert!(matches!(
            session.add_event(event).await,
            Err(SessionError::Validation(_))
        ));
        assert!(session.events().is_empty());
    }

    #[tokio::test]
    async fn update_excludes_itself_from_overlap() {
        let pool = db::test_pool().await;
        let mut session = Session::signup(pool, user("alice")).await.unwrap();
        let id = session.add_event(ten_to_eleven()).await.unwrap();
        let other = session
            .add_event(fixtures::new_event(
                "Afternoon webinar",
                utc_datetime!(2024-01-01 14:00),
                utc_datetime!(2024-01-01 15:00),
                "Webinar",
            ))
            .await
            .unwrap();

        // extending into its own old slot is fine
        session
            .update_event(
                id,
                EventPatch {
                    end: Some(utc_datetime!(2024-01-01 11:30)),
                    title: Some("Longer workshop".into()),
                    ..EventPatch::default()
                },
            )
            .await
            .unwrap();
        let updated = session.get_event(id).await.unwrap().unwrap();
        assert_eq!(updated.title, "Longer workshop");
        assert_eq!(updated.interval.end(), utc_datetime!(2024-01-01 11:30));
        assert_eq!(updated.description, "Morning workshop description");
        assert!(session.events().iter().any(|e| e.title == "Longer workshop"));

        // running into the other event is not
        let res = session
            .update_event(
                id,
                EventPatch {
                    end: Some(utc_datetime!(2024-01-01 14:30)),
                    ..EventPatch::default()
                },
            )
            .await;
        assert!(matches!(res, Err(SessionError::Overlap { id, .. }) if id == other));

        assert!(matches!(
            session.update_event(999, EventPatch::default()).await,
            Err(SessionError::NotFound(999))
        ));
    }

    #[tokio::test]
    async fn events_are_private_to_organizer() {
        let pool = db::test_pool().await;
        let mut alice = Session::signup(pool.clone(), user("alice")).await.unwrap();
        let id = alice.add_event(ten_to_eleven()).await.unwrap();

        let mut bob = Session::signup(pool, user("bob")).await.unwrap();
        assert!(bob.events().is_empty());
        assert!(bob.get_event(id).await.unwrap().is_none());
        assert!(matches!(
            bob.delete_event(id).await,
            Err(SessionError::NotFound(_))
        ));
        // same slot is free for another organizer
        bob.add_event(ten_to_eleven()).await.unwrap();

        alice.delete_event(id).await.unwrap();
        assert!(alice.events().is_empty());
    }

    #[tokio::test]
    async fn query_engine_sees_cached_events() {
        let pool = db::test_pool().await;
        let mut session = Session::signup(pool, user("alice")).await.unwrap();
        session.add_event(ten_to_eleven()).await.unwrap();
        session
            .add_event(fixtures::new_event(
                "Evening webinar",
                utc_datetime!(2024-01-02 18:00),
                utc_datetime!(2024-01-02 19:00),
                "Webinar",
            ))
            .await
            .unwrap();
        let engine = session.query_engine(&QueryParams::parse("category=Webinar"));
        let titles: Vec<_> = engine.visible().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, ["Evening webinar"]);
    }
}
