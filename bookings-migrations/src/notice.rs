use crate::events::MigrationEvent;
use std::fmt;

pub const NOTICE_HEADING: &str = "EDD Bookings failed to migrate. Reasons:";

/// An administrator-facing summary of a failed migration.
///
/// Every non-empty line of the error message becomes one reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationFailureNotice {
    reasons: Vec<String>,
}

impl MigrationFailureNotice {
    pub fn new(message: &str) -> Self {
        Self {
            reasons: message
                .split('\n')
                .map(|line| line.trim_end_matches('\r'))
                .filter(|line| !line.trim().is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    /// Build a notice from a failure event. Returns `None` for any other event, or for a failure
    /// event that carries no error.
    pub fn from_event(event: &MigrationEvent) -> Option<Self> {
        if !event.is_failure() {
            return None;
        }
        event.error.as_deref().map(Self::new)
    }

    pub fn reasons(&self) -> &[String] {
        &self.reasons
    }

    /// The notice as WordPress admin notice markup.
    pub fn to_html(&self) -> String {
        let items = self
            .reasons
            .iter()
            .map(|reason| format!("<li>{}</li>", escape_html(reason)))
            .collect::<String>();
        format!(
            "<div class=\"notice notice-error is-dismissible\"><p>{}</p><ol>{}</ol></div>",
            NOTICE_HEADING, items
        )
    }
}

impl fmt::Display for MigrationFailureNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", NOTICE_HEADING)?;
        for (i, reason) in self.reasons.iter().enumerate() {
            write!(f, "\n{}. {}", i + 1, reason)?;
        }
        Ok(())
    }
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#039;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
