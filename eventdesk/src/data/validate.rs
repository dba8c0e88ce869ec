use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use super::{NewEvent, NewUser, Venue};

const MIN_TITLE_CHARS: usize = 3;
const MIN_DESCRIPTION_CHARS: usize = 10;
const MIN_USERNAME_CHARS: usize = 3;
const MIN_PASSWORD_CHARS: usize = 6;

// Leading dots and `..` in the local part are checked separately.
static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_'+\-.]*[A-Za-z0-9_+\-]@([A-Za-z0-9][A-Za-z0-9\-]*\.)+[A-Za-z]{2,}$")
        .expect("email pattern is valid")
});

/// A single rejected field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct Issue {
    pub field: &'static str,
    pub message: &'static str,
}

/// Every field check that failed, in field order.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {subject}: {}", join_issues(.issues))]
pub struct ValidationError {
    /// What was being checked, e.g. `event` or `account`.
    pub subject: &'static str,
    pub issues: Vec<Issue>,
}

fn join_issues(issues: &[Issue]) -> String {
    issues
        .iter()
        .map(Issue::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Collects issues for one record.
struct Checker {
    subject: &'static str,
    issues: Vec<Issue>,
}

impl Checker {
    fn new(subject: &'static str) -> Self {
        Self {
            subject,
            issues: vec![],
        }
    }

    fn check(&mut self, ok: bool, field: &'static str, message: &'static str) {
        if !ok {
            self.issues.push(Issue { field, message });
        }
    }

    fn finish(self) -> Result<(), ValidationError> {
        if self.issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError {
                subject: self.subject,
                issues: self.issues,
            })
        }
    }
}

impl NewEvent {
    /// Check the fields the store cannot check for us.
    ///
    /// `end > start` is already guaranteed by [`EventInterval`](super::EventInterval).
    /// Lengths count characters as entered, surrounding whitespace included.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut checker = Checker::new("event");
        checker.check(
            self.title.chars().count() >= MIN_TITLE_CHARS,
            "title",
            "must be at least 3 characters",
        );
        checker.check(
            self.description.chars().count() >= MIN_DESCRIPTION_CHARS,
            "description",
            "must be at least 10 characters",
        );
        match &self.venue {
            Venue::Online { link } => checker.check(
                !link.trim().is_empty(),
                "eventLink",
                "is required for online events",
            ),
            Venue::InPerson { location } => checker.check(
                !location.trim().is_empty(),
                "location",
                "is required for in-person events",
            ),
        }
        checker.check(!self.category.trim().is_empty(), "category", "is required");
        checker.finish()
    }
}

impl NewUser {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut checker = Checker::new("account");
        checker.check(
            self.username.chars().count() >= MIN_USERNAME_CHARS,
            "username",
            "must be at least 3 characters",
        );
        checker.check(is_email(&self.email), "email", "is not a valid email address");
        checker.check(
            self.password.chars().count() >= MIN_PASSWORD_CHARS,
            "password",
            "must be at least 6 characters",
        );
        checker.finish()
    }
}

pub(crate) fn is_email(input: &str) -> bool {
    EMAIL.is_match(input) && !input.starts_with('.') && !input.contains("..")
}

#[cfg(test)]
mod tests {
    use time::macros::utc_datetime;

    use super::is_email;
    use crate::data::{NewUser, Venue, fixtures};

    #[test]
    fn fixture_is_valid() {
        let event = fixtures::new_event(
            "Workshop",
            utc_datetime!(2024-01-01 10:00),
            utc_datetime!(2024-01-01 11:00),
            "Workshop",
        );
        assert!(event.validate().is_ok());
    }

    #[test]
    fn reports_every_issue() {
        let mut event = fixtures::new_event(
            "ab",
            utc_datetime!(2024-01-01 10:00),
            utc_datetime!(2024-01-01 11:00),
            " ",
        );
        event.description = "short".into();
        event.venue = Venue::Online {
            link: String::new(),
        };
        let err = event.validate().unwrap_err();
        let fields: Vec<_> = err.issues.iter().map(|issue| issue.field).collect();
        assert_eq!(fields, ["title", "description", "eventLink", "category"]);
        assert_eq!(
            err.to_string(),
            "invalid event: title: must be at least 3 characters; \
             description: must be at least 10 characters; \
             eventLink: is required for online events; category: is required"
        );
    }

    #[test]
    fn lengths_count_raw_characters() {
        let mut event = fixtures::new_event(
            " ab ",
            utc_datetime!(2024-01-01 10:00),
            utc_datetime!(2024-01-01 11:00),
            "Workshop",
        );
        assert!(event.validate().is_ok());
        event.title = "ab".into();
        assert!(event.validate().is_err());
    }

    #[test]
    fn in_person_needs_location() {
        let mut event = fixtures::new_event(
            "Conference",
            utc_datetime!(2024-01-01 10:00),
            utc_datetime!(2024-01-01 11:00),
            "Conference",
        );
        event.venue = Venue::InPerson {
            location: String::new(),
        };
        let err = event.validate().unwrap_err();
        assert_eq!(err.issues.len(), 1);
        assert_eq!(err.issues[0].field, "location");
    }

    #[test]
    fn account_checks() {
        let ok = NewUser {
            username: "alice".into(),
            email: "alice@example.com".into(),
            password: "secret".into(),
        };
        assert!(ok.validate().is_ok());

        let bad = NewUser {
            username: String::new(),
            email: "x".into(),
            password: String::new(),
        };
        let err = bad.validate().unwrap_err();
        let fields: Vec<_> = err.issues.iter().map(|issue| issue.field).collect();
        assert_eq!(fields, ["username", "email", "password"]);
        assert!(err.to_string().starts_with("invalid account: username: "));
    }

    #[test]
    fn email_syntax() {
        for good in ["a@b.co", "first.last+tag@mail.example.org", "o'neil@example.com"] {
            assert!(is_email(good), "{good}");
        }
        for bad in [
            "",
            "plain",
            "@example.com",
            "a@b",
            "a@b.c",
            ".a@example.com",
            "a..b@example.com",
            "a.@example.com",
            "a@-b.com",
            "a b@example.com",
        ] {
            assert!(!is_email(bad), "{bad}");
        }
    }
}
