use std::time::{Duration, Instant};

/// Delays committing a search term until typing pauses.
///
/// Driven by caller-supplied instants so it can sit behind any event loop: call
/// [`input`](Self::input) on every keystroke and [`poll`](Self::poll) whenever
/// the loop wakes (at the latest at [`deadline`](Self::deadline)).
#[derive(Debug, Clone)]
pub struct SearchDebounce {
    delay: Duration,
    value: String,
    deadline: Option<Instant>,
}

impl Default for SearchDebounce {
    fn default() -> Self {
        Self::new(Self::DEFAULT_DELAY)
    }
}

impl SearchDebounce {
    pub const DEFAULT_DELAY: Duration = Duration::from_millis(300);

    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            value: String::new(),
            deadline: None,
        }
    }

    /// Raw input as currently typed.
    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Record new input, restarting the delay.
    pub fn input(&mut self, value: impl Into<String>, now: Instant) {
        self.value = value.into();
        self.deadline = Some(now + self.delay);
    }

    /// The term to commit, once the delay has passed since the last input.
    pub fn poll(&mut self, now: Instant) -> Option<&str> {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                Some(&self.value)
            }
            _ => None,
        }
    }

    /// Overwrite the input from outside (e.g. when filters are reset), dropping anything pending.
    pub fn sync(&mut self, value: impl Into<String>) {
        self.value = value.into();
        self.deadline = None;
    }
}
