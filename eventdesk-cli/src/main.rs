use std::io::{self, Write};

use anyhow::{Context, Result, bail};
use clap::Parser;
use cli_table::{WithTitle, print_stdout};
use eventdesk::{
    config::Config,
    data::{CATEGORIES, EventInterval, EventPatch, NewEvent, NewUser, RowID, Venue},
    db,
    debounce::SearchDebounce,
    query::{CategoryFilter, EventQueryEngine, QueryParams, SortKey, TypeFilter, parse_timestamp},
    session::Session,
};
use sqlx::SqlitePool;
use time::{
    Date, Month, PrimitiveDateTime, UtcDateTime, format_description::BorrowedFormatItem,
    macros::format_description,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[derive(Debug, clap::Parser)]
struct Args {
    #[clap(subcommand)]
    cmd: Cmd,
}

#[derive(Debug, clap::Parser)]
enum Cmd {
    /// Clear database (warning destroys all data)
    ClearDb,
    /// Create a demo user with some events
    InitFixtures,
    /// Create an account and log in
    Signup {
        #[clap(long)]
        username: String,
        #[clap(long)]
        email: String,
        #[clap(long)]
        password: String,
        #[clap(long)]
        confirm_password: String,
    },
    /// Log in
    Login {
        #[clap(long)]
        email: String,
        #[clap(long)]
        password: String,
    },
    /// Log out
    Logout,
    /// Show the logged in user
    Whoami,
    /// List the suggested event categories
    Categories,
    /// List events, optionally filtered and sorted
    ListEvents {
        #[clap(flatten)]
        filters: Filters,
    },
    /// Filter events interactively; typed text is a search, `:help` lists commands
    Browse {
        #[clap(flatten)]
        filters: Filters,
    },
    /// Show a single event
    ShowEvent { id: RowID },
    /// Create a new event
    CreateEvent {
        #[clap(long)]
        title: String,
        #[clap(long)]
        description: String,
        #[clap(long)]
        category: String,
        /// `YYYY-MM-DD HH:MM` (UTC)
        #[clap(long)]
        start: String,
        /// `YYYY-MM-DD HH:MM` (UTC)
        #[clap(long)]
        end: String,
        /// Meeting link; makes the event online
        #[clap(long, conflicts_with = "location", required_unless_present = "location")]
        link: Option<String>,
        /// Address; makes the event in-person
        #[clap(long)]
        location: Option<String>,
    },
    /// Change some fields of an event
    UpdateEvent {
        id: RowID,
        #[clap(long)]
        title: Option<String>,
        #[clap(long)]
        description: Option<String>,
        #[clap(long)]
        category: Option<String>,
        #[clap(long)]
        start: Option<String>,
        #[clap(long)]
        end: Option<String>,
        #[clap(long, conflicts_with = "location")]
        link: Option<String>,
        #[clap(long)]
        location: Option<String>,
    },
    /// Delete an event
    DeleteEvent {
        id: RowID,
        /// Don't ask for confirmation
        #[clap(long, short)]
        yes: bool,
    },
}

#[derive(Debug, clap::Args)]
struct Filters {
    /// Seed filters from a shared query string, e.g. `type=Online&sort=title`
    #[clap(long)]
    params: Option<String>,
    /// Case-insensitive text to find in title or description
    #[clap(long, short)]
    query: Option<String>,
    /// `All`, `Online` or `In-Person`
    #[clap(long = "type")]
    event_type: Option<TypeFilter>,
    #[clap(long)]
    category: Option<CategoryFilter>,
    /// Only events starting at or after this time
    #[clap(long)]
    from: Option<String>,
    /// Only events starting at or before this time
    #[clap(long)]
    to: Option<String>,
    /// `date` or `title`
    #[clap(long)]
    sort: Option<SortKey>,
}

const DATE_DESC: &[BorrowedFormatItem<'_>] = format_description!("[year]-[month]-[day]");
const DATETIME_DESC: &[BorrowedFormatItem<'_>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]");

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    // no .env is fine, the variables may already be set
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    if let Err(e) = run(args.cmd).await {
        tracing::error!("{e:?}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run(cmd: Cmd) -> Result<()> {
    let config = Config::from_env()?;
    let pool = db::connect(&config.database_url).await?;
    match cmd {
        Cmd::ClearDb => clear_database(&pool).await,
        Cmd::InitFixtures => init_fixtures(pool).await,
        Cmd::Signup {
            username,
            email,
            password,
            confirm_password,
        } => {
            if password != confirm_password {
                bail!("passwords don't match");
            }
            signup(pool, username, email, password).await
        }
        Cmd::Login { email, password } => login(pool, &email, &password).await,
        Cmd::Logout => logout(pool).await,
        Cmd::Whoami => whoami(pool).await,
        Cmd::Categories => {
            for category in CATEGORIES {
                println!("{category}");
            }
            Ok(())
        }
        Cmd::ListEvents { filters } => list_events(pool, filters).await,
        Cmd::Browse { filters } => browse(pool, filters, &config).await,
        Cmd::ShowEvent { id } => show_event(pool, id).await,
        Cmd::CreateEvent {
            title,
            description,
            category,
            start,
            end,
            link,
            location,
        } => {
            let interval = EventInterval::new(parse_time(&start)?, parse_time(&end)?)?;
            let event = NewEvent {
                title,
                description,
                venue: venue(link, location).context("either `--link` or `--location` is required")?,
                interval,
                category,
            };
            create_event(pool, event).await
        }
        Cmd::UpdateEvent {
            id,
            title,
            description,
            category,
            start,
            end,
            link,
            location,
        } => {
            let patch = EventPatch {
                title,
                description,
                venue: venue(link, location),
                start: start.as_deref().map(parse_time).transpose()?,
                end: end.as_deref().map(parse_time).transpose()?,
                category,
            };
            update_event(pool, id, patch).await
        }
        Cmd::DeleteEvent { id, yes } => delete_event(pool, id, yes).await,
    }
}

async fn session(pool: SqlitePool) -> Result<Session> {
    Session::restore(pool)
        .await?
        .context("not logged in (run `eventdesk login` or `eventdesk signup`)")
}

async fn clear_database(pool: &SqlitePool) -> Result<()> {
    let mut conn = pool.acquire().await?;
    db::clear_database(&mut *conn).await?;
    Ok(())
}

async fn init_fixtures(pool: SqlitePool) -> Result<()> {
    clear_database(&pool).await?;
    let mut session = Session::signup(
        pool,
        NewUser {
            username: "demo".to_string(),
            email: "demo@example.com".to_string(),
            password: "demo1234".to_string(),
        },
    )
    .await?;
    let day = |day| Date::from_calendar_date(2024, Month::January, day);
    let fixtures = [
        (
            "Rust workshop",
            "Ownership and borrowing, hands on",
            day(1)?.with_hms(10, 0, 0)?.as_utc(),
            day(1)?.with_hms(11, 0, 0)?.as_utc(),
            "Workshop",
            Venue::InPerson {
                location: "Room 101".to_string(),
            },
        ),
        (
            "Async webinar",
            "A tour of tokio and async traits",
            day(2)?.with_hms(9, 0, 0)?.as_utc(),
            day(2)?.with_hms(10, 0, 0)?.as_utc(),
            "Webinar",
            Venue::Online {
                link: "https://example.com/webinar".to_string(),
            },
        ),
        (
            "Community meetup",
            "Lightning talks and pizza",
            day(3)?.with_hms(18, 30, 0)?.as_utc(),
            day(3)?.with_hms(21, 0, 0)?.as_utc(),
            "Meetup",
            Venue::InPerson {
                location: "The Old Brewery".to_string(),
            },
        ),
    ];
    for (title, description, start, end, category, venue) in fixtures {
        session
            .add_event(NewEvent {
                title: title.to_string(),
                description: description.to_string(),
                venue,
                interval: EventInterval::new(start, end)?,
                category: category.to_string(),
            })
            .await?;
    }
    print_stdout(session.events().to_vec().with_title())?;
    Ok(())
}

async fn signup(pool: SqlitePool, username: String, email: String, password: String) -> Result<()> {
    let session = Session::signup(
        pool,
        NewUser {
            username,
            email,
            password,
        },
    )
    .await?;
    println!("Signed up as {}", session.user().email);
    Ok(())
}

async fn login(pool: SqlitePool, email: &str, password: &str) -> Result<()> {
    let session = Session::login(pool, email, password).await?;
    println!(
        "Logged in as {} ({} events)",
        session.user().email,
        session.events().len()
    );
    Ok(())
}

async fn logout(pool: SqlitePool) -> Result<()> {
    match Session::restore(pool).await? {
        Some(session) => session.logout().await?,
        None => println!("Not logged in"),
    }
    Ok(())
}

async fn whoami(pool: SqlitePool) -> Result<()> {
    match Session::restore(pool).await? {
        Some(session) => println!("{} <{}>", session.user().username, session.user().email),
        None => println!("Not logged in"),
    }
    Ok(())
}

async fn list_events(pool: SqlitePool, filters: Filters) -> Result<()> {
    let session = session(pool).await?;
    let engine = filters.engine(&session)?;
    print_visible(&engine)?;
    Ok(())
}

async fn browse(pool: SqlitePool, filters: Filters, config: &Config) -> Result<()> {
    let session = session(pool).await?;
    let mut engine = filters.engine(&session)?;
    let mut debounce = SearchDebounce::new(config.search_debounce);
    debounce.sync(engine.state().search.clone());
    print_visible(&engine)?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match debounce.deadline() {
            Some(deadline) => {
                tokio::select! {
                    line = lines.next_line() => line?,
                    _ = tokio::time::sleep_until(deadline.into()) => {
                        if let Some(search) = debounce.poll(std::time::Instant::now()) {
                            engine.set_search(search);
                            print_visible(&engine)?;
                        }
                        continue;
                    }
                }
            }
            None => lines.next_line().await?,
        };
        let Some(line) = line else {
            return Ok(());
        };
        let Some(command) = line.strip_prefix(':') else {
            debounce.input(line, std::time::Instant::now());
            continue;
        };
        let (name, arg) = command
            .split_once(' ')
            .map(|(name, arg)| (name, arg.trim()))
            .unwrap_or((command, ""));
        let res: Result<()> = match name {
            "quit" | "q" => return Ok(()),
            "type" => arg
                .parse::<TypeFilter>()
                .map(|t| engine.set_event_type(t))
                .map_err(Into::into),
            "category" => {
                engine.set_category(arg.into());
                Ok(())
            }
            "sort" => arg
                .parse::<SortKey>()
                .map(|s| engine.set_sort(s))
                .map_err(Into::into),
            "from" => parse_bound(arg).map(|bound| engine.set_start_date(bound)),
            "to" => parse_bound(arg).map(|bound| engine.set_end_date(bound)),
            "reset" => {
                engine.reset();
                debounce.sync("");
                Ok(())
            }
            _ => {
                println!(
                    "commands: :type <All|Online|In-Person>, :category <name|All>, :sort <date|title>, \
                    :from [time], :to [time], :reset, :quit"
                );
                continue;
            }
        };
        match res {
            Ok(()) => print_visible(&engine)?,
            Err(e) => println!("{e}"),
        }
    }
}

async fn show_event(pool: SqlitePool, id: RowID) -> Result<()> {
    let session = session(pool).await?;
    let event = session
        .get_event(id)
        .await?
        .with_context(|| format!("no event with id {id}"))?;
    println!("{}", event.title);
    println!("  {}", event.interval);
    println!("  {} / {}", event.event_type(), event.category);
    println!("  {}", event.venue);
    println!();
    println!("{}", event.description);
    Ok(())
}

async fn create_event(pool: SqlitePool, event: NewEvent) -> Result<()> {
    let mut session = session(pool).await?;
    let id = session.add_event(event).await?;
    let event = session
        .events()
        .iter()
        .find(|event| event.id == id)
        .cloned()
        .context("created event missing after reload")?;
    print_stdout(vec![event].with_title())?;
    Ok(())
}

async fn update_event(pool: SqlitePool, id: RowID, patch: EventPatch) -> Result<()> {
    if patch.is_empty() {
        bail!("nothing to update");
    }
    let mut session = session(pool).await?;
    session.update_event(id, patch).await?;
    let event = session.get_event(id).await?.context("updated event missing")?;
    print_stdout(vec![event].with_title())?;
    Ok(())
}

async fn delete_event(pool: SqlitePool, id: RowID, yes: bool) -> Result<()> {
    let mut session = session(pool).await?;
    let event = session
        .get_event(id)
        .await?
        .with_context(|| format!("no event with id {id}"))?;
    if !yes && !confirm(&format!("Delete `{}` ({})?", event.title, event.interval))? {
        println!("Cancelled");
        return Ok(());
    }
    session.delete_event(id).await?;
    println!("Deleted `{}`", event.title);
    Ok(())
}

impl Filters {
    /// Engine seeded from `--params`, then overridden by the individual flags.
    fn engine(self, session: &Session) -> Result<EventQueryEngine> {
        let params = self
            .params
            .as_deref()
            .map(QueryParams::parse)
            .unwrap_or_default();
        let mut engine = session.query_engine(&params);
        if let Some(query) = self.query {
            engine.set_search(query);
        }
        if let Some(event_type) = self.event_type {
            engine.set_event_type(event_type);
        }
        if let Some(category) = self.category {
            engine.set_category(category);
        }
        if let Some(from) = self.from {
            engine.set_start_date(Some(parse_time(&from)?));
        }
        if let Some(to) = self.to {
            engine.set_end_date(Some(parse_time(&to)?));
        }
        if let Some(sort) = self.sort {
            engine.set_sort(sort);
        }
        Ok(engine)
    }
}

fn print_visible(engine: &EventQueryEngine) -> Result<()> {
    let visible: Vec<_> = engine.visible().cloned().collect();
    if visible.is_empty() {
        println!("No events found");
    } else {
        print_stdout(visible.with_title())?;
    }
    if engine.has_active_filters() {
        println!(
            "{} of {} events, share with `--params '{}'`",
            engine.visible().len(),
            engine.events().len(),
            engine.location()
        );
    }
    Ok(())
}

fn venue(link: Option<String>, location: Option<String>) -> Option<Venue> {
    match (link, location) {
        (Some(link), _) => Some(Venue::Online { link }),
        (None, Some(location)) => Some(Venue::InPerson { location }),
        (None, None) => None,
    }
}

/// `YYYY-MM-DD HH:MM`, `YYYY-MM-DD` (midnight) or RFC 3339, all UTC unless an offset is given.
fn parse_time(input: &str) -> Result<UtcDateTime> {
    if let Ok(dt) = PrimitiveDateTime::parse(input, DATETIME_DESC) {
        return Ok(dt.as_utc());
    }
    if let Ok(date) = Date::parse(input, DATE_DESC) {
        return Ok(date.midnight().as_utc());
    }
    parse_timestamp(input).with_context(|| format!("couldn't parse `{input}` as a time"))
}

/// Empty clears the bound.
fn parse_bound(input: &str) -> Result<Option<UtcDateTime>> {
    if input.is_empty() {
        return Ok(None);
    }
    parse_time(input).map(Some)
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{prompt} [y/N] ");
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}
