//! Placeholder substitution for migration SQL.
//!
//! Migration files may reference values that are only known at install time, such as the
//! WordPress table prefix, with tokens like `${prefix}`. A [SqlRenderer] turns the raw file
//! text into the SQL that is sent to the database, resolving tokens against any
//! [PlaceholderValues] container.

use crate::error::Error;
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::hash::BuildHasher;

pub const DEFAULT_TOKEN_START: &str = "${";
pub const DEFAULT_TOKEN_END: &str = "}";
pub const DEFAULT_PLACEHOLDER_VALUE: &str = "";

/// A key/value container that placeholder tokens are resolved against.
pub trait PlaceholderValues {
    /// Returns the replacement for the token `name`, or `None` if the container has no value for it.
    fn placeholder(&self, name: &str) -> Option<Cow<'_, str>>;
}

impl<S: BuildHasher> PlaceholderValues for HashMap<String, String, S> {
    fn placeholder(&self, name: &str) -> Option<Cow<'_, str>> {
        self.get(name).map(|v| Cow::Borrowed(v.as_str()))
    }
}

impl PlaceholderValues for BTreeMap<String, String> {
    fn placeholder(&self, name: &str) -> Option<Cow<'_, str>> {
        self.get(name).map(|v| Cow::Borrowed(v.as_str()))
    }
}

/// JSON objects resolve a token by key. A key containing `/` that is not present verbatim walks
/// nested objects, so `${tables/bookings}` finds `{"tables": {"bookings": "wp_bookings"}}`.
/// Strings are used as is, numbers and booleans are printed, null and nested structures do not
/// resolve.
impl PlaceholderValues for serde_json::Value {
    fn placeholder(&self, name: &str) -> Option<Cow<'_, str>> {
        let object = self.as_object()?;
        let value = match object.get(name) {
            Some(value) => value,
            None if name.contains('/') => name
                .split('/')
                .try_fold(self, |node, segment| node.as_object()?.get(segment))?,
            None => return None,
        };

        match value {
            serde_json::Value::String(s) => Some(Cow::Borrowed(s.as_str())),
            serde_json::Value::Number(n) => Some(Cow::Owned(n.to_string())),
            serde_json::Value::Bool(b) => Some(Cow::Owned(b.to_string())),
            _ => None,
        }
    }
}

impl<T: PlaceholderValues + ?Sized> PlaceholderValues for &T {
    fn placeholder(&self, name: &str) -> Option<Cow<'_, str>> {
        (**self).placeholder(name)
    }
}

impl<T: PlaceholderValues + ?Sized> PlaceholderValues for Box<T> {
    fn placeholder(&self, name: &str) -> Option<Cow<'_, str>> {
        (**self).placeholder(name)
    }
}

/// Renders migration SQL before it is executed.
pub trait SqlRenderer {
    fn render(&self, sql: &str, values: &dyn PlaceholderValues) -> Result<String, Error>;
}

/// Replaces `{token_start}name{token_end}` tokens with values from a [PlaceholderValues]
/// container, falling back to a default value for names the container does not know.
///
/// Substitution is a single left-to-right pass: replacement values are never scanned for
/// further tokens, and a start delimiter without a matching end delimiter is left untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceholderTemplate {
    token_start: String,
    token_end: String,
    default_value: String,
}

impl PlaceholderTemplate {
    /// Create a template with custom delimiters and default value.
    /// Returns an error if either delimiter is empty.
    pub fn try_new(
        token_start: impl Into<String>,
        token_end: impl Into<String>,
        default_value: impl Into<String>,
    ) -> Result<Self, Error> {
        let token_start = token_start.into();
        let token_end = token_end.into();

        if token_start.is_empty() {
            return Err(Error::InvalidConfiguration(
                "placeholder token start delimiter must not be empty".to_string(),
            ));
        }
        if token_end.is_empty() {
            return Err(Error::InvalidConfiguration(
                "placeholder token end delimiter must not be empty".to_string(),
            ));
        }

        Ok(Self {
            token_start,
            token_end,
            default_value: default_value.into(),
        })
    }

    pub fn token_start(&self) -> &str {
        &self.token_start
    }

    pub fn token_end(&self) -> &str {
        &self.token_end
    }

    pub fn default_value(&self) -> &str {
        &self.default_value
    }
}

impl Default for PlaceholderTemplate {
    fn default() -> Self {
        Self {
            token_start: DEFAULT_TOKEN_START.to_string(),
            token_end: DEFAULT_TOKEN_END.to_string(),
            default_value: DEFAULT_PLACEHOLDER_VALUE.to_string(),
        }
    }
}

impl SqlRenderer for PlaceholderTemplate {
    fn render(&self, sql: &str, values: &dyn PlaceholderValues) -> Result<String, Error> {
        let mut rendered = String::with_capacity(sql.len());
        let mut rest = sql;

        while let Some(start) = rest.find(&self.token_start) {
            let token = &rest[start + self.token_start.len()..];
            let Some(end) = token.find(&self.token_end) else {
                break;
            };

            rendered.push_str(&rest[..start]);
            match values.placeholder(&token[..end]) {
                Some(value) => rendered.push_str(&value),
                None => rendered.push_str(&self.default_value),
            }
            rest = &token[end + self.token_end.len()..];
        }

        rendered.push_str(rest);
        Ok(rendered)
    }
}
