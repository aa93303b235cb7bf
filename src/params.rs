//! Command parameter parsing
//!
//! Turns the parameter suffix of a chat command (everything after the command
//! name) into named and positional parameters.
//!
//! ```text
//! paramA --vm-id=i-123 --multi these are values --state=pending, stopped --stop
//! │      │             │                        │                       └ flag: true
//! │      │             │                        └ state = "pending,stopped"
//! │      │             └ multi = "these are values"
//! │      └ vm-id = "i-123"
//! └ positional
//! ```
//!
//! Rules:
//! - Tokens are split like a POSIX shell would, so quoted values keep spaces.
//! - A token starting with `-` and longer than one char is a key. All leading
//!   dashes are stripped.
//! - `key=value` attaches inline. Subsequent non-dash tokens are appended to
//!   the value, joined by single spaces, until the next dash token.
//! - A key with no value is a flag.
//! - Values containing commas are normalized: parts trimmed, empties dropped.
//! - The last occurrence of a key wins.
//! - Dash-only tokens (`-`, `--`) and empty keys (`--=x`) are dropped.
//! - Empty tokens (`''`) are dropped as positionals. After a key they give
//!   an empty value, like `--key=`, but add nothing to a longer value.
//! - Any token starting with `-` starts a new key, negative numbers included.

use std::collections::HashMap;

use thiserror::Error;
use tracing::{debug, warn};

/// Tokenization failure
#[derive(Debug, Error)]
pub enum ParamError {
    #[error("malformed command line: {0}")]
    Tokenize(#[from] shell_words::ParseError),
}

/// Value of a named parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    /// Key given without a value (`--stop`)
    Flag,
    /// Key with an attached value, comma lists already normalized
    Text(String),
}

impl ParamValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Flag => None,
            ParamValue::Text(s) => Some(s),
        }
    }

    pub fn is_flag(&self) -> bool {
        matches!(self, ParamValue::Flag)
    }
}

/// Parsed parameters for one command invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    named: HashMap<String, ParamValue>,
    positional: Vec<String>,
}

impl Params {
    pub fn named(&self) -> &HashMap<String, ParamValue> {
        &self.named
    }

    pub fn positional(&self) -> &[String] {
        &self.positional
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.named.get(key)
    }

    /// String value for `key`, `None` if absent or a bare flag
    pub fn text(&self, key: &str) -> Option<&str> {
        self.named.get(key).and_then(ParamValue::as_str)
    }

    /// String value for `key` if present and not blank
    pub fn non_empty(&self, key: &str) -> Option<&str> {
        self.text(key).map(str::trim).filter(|v| !v.is_empty())
    }

    /// True when `key` was given as a bare flag
    pub fn flag(&self, key: &str) -> bool {
        self.named.get(key).is_some_and(ParamValue::is_flag)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.named.contains_key(key)
    }

    /// Comma-split values for `key`
    pub fn list_values(&self, key: &str) -> Vec<String> {
        list_values(&self.named, key)
    }

    pub fn is_empty(&self) -> bool {
        self.named.is_empty() && self.positional.is_empty()
    }
}

/// Parse a parameter line, returning empty params on malformed input.
///
/// A single bad chat message must not take down the event loop, so
/// tokenization errors are logged and swallowed here. Use [`try_parse`]
/// to observe them.
pub fn parse(command_line: &str) -> Params {
    match try_parse(command_line) {
        Ok(params) => params,
        Err(e) => {
            warn!(error = %e, input = command_line, "discarding unparseable parameters");
            Params::default()
        }
    }
}

/// Parse a parameter line, surfacing tokenization errors
pub fn try_parse(command_line: &str) -> Result<Params, ParamError> {
    let tokens = shell_words::split(command_line)?;
    let mut params = Params::default();
    let mut tokens = tokens.into_iter().peekable();

    while let Some(token) = tokens.next() {
        if token.is_empty() {
            continue;
        }
        if !token.starts_with('-') {
            params.positional.push(token);
            continue;
        }

        let body = token.trim_start_matches('-');
        if body.is_empty() {
            debug!(token = %token, "dropping dash-only token");
            continue;
        }
        let (key, inline) = match body.split_once('=') {
            Some((key, value)) => (key, Some(value)),
            None => (body, None),
        };

        let mut parts: Vec<String> = Vec::new();
        let mut has_value = inline.is_some();
        if let Some(value) = inline.filter(|v| !v.is_empty()) {
            parts.push(value.to_string());
        }
        while let Some(next) = tokens.next_if(|t| !t.starts_with('-')) {
            has_value = true;
            if !next.is_empty() {
                parts.push(next);
            }
        }

        if key.is_empty() {
            debug!(token = %token, "dropping parameter with empty key");
            continue;
        }

        let value = if has_value {
            ParamValue::Text(normalize_value(&parts.join(" ")))
        } else {
            ParamValue::Flag
        };
        params.named.insert(key.to_string(), value);
    }

    Ok(params)
}

fn normalize_value(value: &str) -> String {
    if value.contains(',') {
        normalize_list(value)
    } else {
        value.to_string()
    }
}

/// Collapse a comma list: trim each part, drop empty parts, rejoin with `,`
///
/// `"pending, stopped , , "` becomes `"pending,stopped"`.
pub fn normalize_list(value: &str) -> String {
    split_list(value).collect::<Vec<_>>().join(",")
}

fn split_list(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|part| !part.is_empty())
}

/// Comma-split values for `key` in a named parameter map.
///
/// Empty when the key is absent, a bare flag, or blank.
pub fn list_values(named: &HashMap<String, ParamValue>, key: &str) -> Vec<String> {
    match named.get(key) {
        Some(ParamValue::Text(value)) => split_list(value).map(str::to_string).collect(),
        _ => Vec::new(),
    }
}
