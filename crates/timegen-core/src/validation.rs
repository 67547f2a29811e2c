//! Local form validation, run before any network call.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex"));

pub const MIN_PASSWORD_LEN: usize = 6;
pub const MIN_NAME_LEN: usize = 2;

pub const INVALID_EMAIL: &str = "Invalid email address";
pub const SHORT_PASSWORD: &str = "Password must be at least 6 characters";
pub const SHORT_NAME: &str = "Name must be at least 2 characters";
pub const MISSING_TOKEN: &str = "Reset token is required";
pub const EMPTY_PROMPT: &str = "Please provide a prompt describing the timetable requirements.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: &'static str,
}

/// One or more rejected fields, in form order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationErrors(pub Vec<FieldError>);

impl ValidationErrors {
    pub fn fields(&self) -> &[FieldError] {
        &self.0
    }

    /// Message for `field`, if it was rejected.
    pub fn message_for(&self, field: &str) -> Option<&'static str> {
        self.0.iter().find(|e| e.field == field).map(|e| e.message)
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<&str> = self.0.iter().map(|e| e.message).collect();
        f.write_str(&messages.join("; "))
    }
}

impl std::error::Error for ValidationErrors {}

#[derive(Default)]
struct Collector(Vec<FieldError>);

impl Collector {
    fn check(&mut self, ok: bool, field: &'static str, message: &'static str) {
        if !ok {
            self.0.push(FieldError { field, message });
        }
    }

    fn finish(self) -> Result<(), ValidationErrors> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(ValidationErrors(self.0))
        }
    }
}

fn is_email(email: &str) -> bool {
    EMAIL_RE.is_match(email.trim())
}

fn long_enough(value: &str, min: usize) -> bool {
    value.chars().count() >= min
}

pub fn validate_email(email: &str) -> Result<(), ValidationErrors> {
    let mut c = Collector::default();
    c.check(is_email(email), "email", INVALID_EMAIL);
    c.finish()
}

pub fn validate_login(email: &str, password: &str) -> Result<(), ValidationErrors> {
    let mut c = Collector::default();
    c.check(is_email(email), "email", INVALID_EMAIL);
    c.check(long_enough(password, MIN_PASSWORD_LEN), "password", SHORT_PASSWORD);
    c.finish()
}

pub fn validate_registration(
    email: &str,
    password: &str,
    name: &str,
) -> Result<(), ValidationErrors> {
    let mut c = Collector::default();
    c.check(long_enough(name.trim(), MIN_NAME_LEN), "name", SHORT_NAME);
    c.check(is_email(email), "email", INVALID_EMAIL);
    c.check(long_enough(password, MIN_PASSWORD_LEN), "password", SHORT_PASSWORD);
    c.finish()
}

pub fn validate_reset(token: &str, password: &str) -> Result<(), ValidationErrors> {
    let mut c = Collector::default();
    c.check(!token.trim().is_empty(), "token", MISSING_TOKEN);
    c.check(long_enough(password, MIN_PASSWORD_LEN), "password", SHORT_PASSWORD);
    c.finish()
}

/// Returns the trimmed prompt.
pub fn validate_prompt(prompt: &str) -> Result<&str, ValidationErrors> {
    let trimmed = prompt.trim();
    let mut c = Collector::default();
    c.check(!trimmed.is_empty(), "prompt", EMPTY_PROMPT);
    c.finish().map(|()| trimmed)
}
