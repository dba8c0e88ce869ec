use std::time::Duration;

use anyhow::Context;

use crate::{debounce::SearchDebounce, env_var};

/// Runtime settings, read from the environment (a `.env` file is loaded by the binary).
#[derive(Debug, Clone)]
pub struct Config {
    /// e.g. `sqlite://eventdesk.db`
    pub database_url: String,
    pub search_debounce: Duration,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env_var("DATABASE_URL")?;
        let search_debounce = match std::env::var("EVENTDESK_SEARCH_DEBOUNCE_MS") {
            Ok(ms) => Duration::from_millis(
                ms.parse()
                    .with_context(|| format!("`EVENTDESK_SEARCH_DEBOUNCE_MS` is not a number: `{ms}`"))?,
            ),
            Err(_) => SearchDebounce::DEFAULT_DELAY,
        };
        Ok(Self {
            database_url,
            search_debounce,
        })
    }
}
