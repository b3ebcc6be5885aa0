//! SQL text checks applied before statements reach a database.
//!
//! Read-only queries must be a single SELECT, WITH or EXPLAIN statement with
//! no data-modifying keywords outside string literals. Table and column names
//! interpolated into generated SQL must be plain identifiers.

use crate::config::DEFAULT_MAX_QUERY_LENGTH;
use crate::error::{ToolError, ToolResult};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use tracing::{debug, warn};

/// Keywords that modify data, schema or connection state.
static FORBIDDEN_KEYWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "INSERT", "UPDATE", "DELETE", "REPLACE", "UPSERT", "DROP", "CREATE", "ALTER", "ATTACH",
        "DETACH", "PRAGMA", "VACUUM", "REINDEX", "ANALYZE",
    ]
    .into_iter()
    .collect()
});

/// Regex for sanitizing line comments (--).
static COMMENT_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"--[^\n]*").expect("Invalid regex: line comment sanitize pattern"));

/// Regex for sanitizing block comments (/* */).
static BLOCK_COMMENT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)/\*.*?\*/").expect("Invalid regex: block comment sanitize pattern")
});

/// Single-quoted string literals, with '' escapes.
static STRING_LITERAL_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"'(?:[^']|'')*'").expect("Invalid regex: string literal pattern"));

/// Regex for normalizing whitespace.
static WHITESPACE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("Invalid regex: whitespace pattern"));

static WORD_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\w+").expect("Invalid regex: word pattern"));

static IDENTIFIER_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("Invalid regex: identifier pattern")
});

/// Read-only query validator.
#[derive(Debug, Clone)]
pub struct SqlValidator {
    max_query_length: usize,
}

impl Default for SqlValidator {
    fn default() -> Self {
        Self {
            max_query_length: DEFAULT_MAX_QUERY_LENGTH,
        }
    }
}

impl SqlValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_query_length(mut self, length: usize) -> Self {
        self.max_query_length = length;
        self
    }

    /// Accept only a single read-only statement.
    pub fn validate_read_only(&self, query: &str) -> ToolResult<()> {
        debug!("Validating query: {}", &query[..floor_char_boundary(query, 100)]);

        if query.len() > self.max_query_length {
            return Err(ToolError::Rejected(format!(
                "query exceeds maximum length of {} characters",
                self.max_query_length
            )));
        }

        let stripped = self.sanitize(&STRING_LITERAL_REGEX.replace_all(query, "''"));
        let upper = stripped.to_uppercase();

        if !(upper.starts_with("SELECT")
            || upper.starts_with("WITH")
            || upper.starts_with("EXPLAIN"))
        {
            return Err(ToolError::Rejected(
                "only SELECT, WITH and EXPLAIN queries are allowed".into(),
            ));
        }

        if upper.contains(';') {
            return Err(ToolError::Rejected("multiple statements not allowed".into()));
        }

        if let Some(word) = find_forbidden_keyword(&upper) {
            warn!("Forbidden keyword detected: {}", word);
            return Err(ToolError::Rejected(format!("keyword {} not allowed", word)));
        }

        Ok(())
    }

    /// Remove comments and trailing semicolons, and normalize whitespace.
    pub fn sanitize(&self, query: &str) -> String {
        let sanitized = COMMENT_REGEX.replace_all(query, "");
        let sanitized = BLOCK_COMMENT_REGEX.replace_all(&sanitized, " ");
        let sanitized = WHITESPACE_REGEX.replace_all(sanitized.trim(), " ");

        sanitized.trim_end_matches([';', ' ']).trim().to_string()
    }
}

/// First forbidden keyword used as a statement word. A word directly followed
/// by `(` is a function call, such as `replace(name, 'a', 'b')`.
fn find_forbidden_keyword(upper: &str) -> Option<&str> {
    WORD_REGEX.find_iter(upper).map(|m| (m.as_str(), m.end())).find_map(|(word, end)| {
        let calls = upper[end..].trim_start().starts_with('(');
        (FORBIDDEN_KEYWORDS.contains(word) && !calls).then_some(word)
    })
}

/// Check that `name` can be interpolated into SQL as a bare identifier.
pub fn validate_identifier<'a>(kind: &str, name: &'a str) -> ToolResult<&'a str> {
    if IDENTIFIER_REGEX.is_match(name) {
        Ok(name)
    } else {
        Err(ToolError::InvalidArguments(format!(
            "invalid {} name '{}'",
            kind, name
        )))
    }
}

fn floor_char_boundary(s: &str, max: usize) -> usize {
    if s.len() <= max {
        return s.len();
    }
    (0..=max).rev().find(|i| s.is_char_boundary(*i)).unwrap_or(0)
}
