use std::str::FromStr;

use sqlx::{
    SqliteConnection, SqliteExecutor, SqlitePool,
    migrate::Migrator,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};

use crate::data::{Event, EventRow, NewEvent, NewUser, RowID, User};

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

const EVENT_COLUMNS: &str = "id, organizer, title, description, event_type, location, \
    event_link, start_time, end_time, category";

/// Open (creating if needed) the database at `database_url` and bring the schema up to date.
pub async fn connect(database_url: &str) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new().connect_with(options).await?;
    MIGRATOR.run(&pool).await?;
    tracing::debug!("connected to `{database_url}`");
    Ok(pool)
}

/// Single-connection in-memory database; every connection to `:memory:` is a fresh db.
#[cfg(test)]
pub(crate) async fn test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    MIGRATOR.run(&pool).await.unwrap();
    pool
}

pub async fn clear_database(exec: &mut SqliteConnection) -> sqlx::Result<()> {
    sqlx::query("DELETE FROM events").execute(&mut *exec).await?;
    sqlx::query("DELETE FROM current_session")
        .execute(&mut *exec)
        .await?;
    sqlx::query("DELETE FROM users").execute(&mut *exec).await?;
    Ok(())
}

pub async fn get_events(organizer: &str, exec: impl SqliteExecutor<'_>) -> sqlx::Result<Vec<Event>> {
    tracing::debug!("loading events for `{organizer}`");
    let rows: Vec<EventRow> = sqlx::query_as(&format!(
        "SELECT {EVENT_COLUMNS} FROM events WHERE organizer = ?"
    ))
    .bind(organizer)
    .fetch_all(exec)
    .await?;
    rows.into_iter().map(Event::from_db).collect()
}

pub async fn get_event(
    id: RowID,
    organizer: &str,
    exec: impl SqliteExecutor<'_>,
) -> sqlx::Result<Option<Event>> {
    let row: Option<EventRow> = sqlx::query_as(&format!(
        "SELECT {EVENT_COLUMNS} FROM events WHERE id = ? AND organizer = ?"
    ))
    .bind(id)
    .bind(organizer)
    .fetch_optional(exec)
    .await?;
    row.map(Event::from_db).transpose()
}

pub async fn new_event(
    organizer: &str,
    event: &NewEvent,
    exec: impl SqliteExecutor<'_>,
) -> sqlx::Result<Event> {
    let (start, end) = event.interval.to_db();
    let row: EventRow = sqlx::query_as(&format!(
        "INSERT INTO events \
        (organizer, title, description, event_type, location, event_link, start_time, end_time, category) \
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) \
        RETURNING {EVENT_COLUMNS}"
    ))
    .bind(organizer)
    .bind(&event.title)
    .bind(&event.description)
    .bind(event.venue.event_type().as_str())
    .bind(event.venue.location())
    .bind(event.venue.link())
    .bind(start)
    .bind(end)
    .bind(&event.category)
    .fetch_one(exec)
    .await?;
    Event::from_db(row)
}

/// Overwrite every field of an event. Returns `false` if the organizer has no such event.
pub async fn update_event(
    id: RowID,
    organizer: &str,
    event: &NewEvent,
    exec: impl SqliteExecutor<'_>,
) -> sqlx::Result<bool> {
    let (start, end) = event.interval.to_db();
    let res = sqlx::query(
        "UPDATE events SET title = ?, description = ?, event_type = ?, location = ?, \
        event_link = ?, start_time = ?, end_time = ?, category = ? \
        WHERE id = ? AND organizer = ?",
    )
    .bind(&event.title)
    .bind(&event.description)
    .bind(event.venue.event_type().as_str())
    .bind(event.venue.location())
    .bind(event.venue.link())
    .bind(start)
    .bind(end)
    .bind(&event.category)
    .bind(id)
    .bind(organizer)
    .execute(exec)
    .await?;
    Ok(res.rows_affected() > 0)
}

/// Returns `false` if the organizer has no such event.
pub async fn delete_event(
    id: RowID,
    organizer: &str,
    exec: impl SqliteExecutor<'_>,
) -> sqlx::Result<bool> {
    let res = sqlx::query("DELETE FROM events WHERE id = ? AND organizer = ?")
        .bind(id)
        .bind(organizer)
        .execute(exec)
        .await?;
    Ok(res.rows_affected() > 0)
}

pub async fn new_user(user: &NewUser, exec: impl SqliteExecutor<'_>) -> sqlx::Result<User> {
    sqlx::query_as(
        "INSERT INTO users (username, email, password) VALUES (?, ?, ?) \
        RETURNING id, username, email, password",
    )
    .bind(&user.username)
    .bind(&user.email)
    .bind(&user.password)
    .fetch_one(exec)
    .await
}

pub async fn find_user_by_email(
    email: &str,
    exec: impl SqliteExecutor<'_>,
) -> sqlx::Result<Option<User>> {
    sqlx::query_as("SELECT id, username, email, password FROM users WHERE email = ?")
        .bind(email)
        .fetch_optional(exec)
        .await
}

pub async fn find_user_by_credentials(
    email: &str,
    password: &str,
    exec: impl SqliteExecutor<'_>,
) -> sqlx::Result<Option<User>> {
    sqlx::query_as(
        "SELECT id, username, email, password FROM users WHERE email = ? AND password = ?",
    )
    .bind(email)
    .bind(password)
    .fetch_optional(exec)
    .await
}

/// Email of the logged in user, if any.
pub async fn current_user(exec: impl SqliteExecutor<'_>) -> sqlx::Result<Option<String>> {
    sqlx::query_scalar("SELECT email FROM current_session WHERE id = 0")
        .fetch_optional(exec)
        .await
}

pub async fn set_current_user(email: &str, exec: impl SqliteExecutor<'_>) -> sqlx::Result<()> {
    sqlx::query(
        "INSERT INTO current_session (id, email) VALUES (0, ?) \
        ON CONFLICT (id) DO UPDATE SET email = excluded.email",
    )
    .bind(email)
    .execute(exec)
    .await?;
    Ok(())
}

pub async fn clear_current_user(exec: impl SqliteExecutor<'_>) -> sqlx::Result<()> {
    sqlx::query("DELETE FROM current_session")
        .execute(exec)
        .await?;
    Ok(())
}
