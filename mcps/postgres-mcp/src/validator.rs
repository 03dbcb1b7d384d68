//! Query safety validator
//!
//! Lexical checks applied to caller-supplied SQL before it reaches the
//! database. This is not a parser: dangerous shapes are rejected outright,
//! and whatever survives must start with a keyword from an allow-list.
//!
//! Every function here is pure. Logging of rejections happens in the gateway.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// Longest identifier PostgreSQL keeps without truncation (NAMEDATALEN - 1).
pub const MAX_IDENTIFIER_LEN: usize = 63;

/// Statement keywords that are always permitted as the leading token.
pub const READ_KEYWORDS: &[&str] = &["SELECT", "WITH", "EXPLAIN", "SHOW", "DESCRIBE", "SET"];

/// Statement keywords that require write mode.
pub const WRITE_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "TRUNCATE", "DROP", "ALTER", "CREATE", "GRANT", "REVOKE",
];

/// Checked in order; the first match rejects the query.
static DANGEROUS_PATTERNS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    [
        (
            "multiple statements with a destructive command",
            r"(?i);\s*(DROP|DELETE|TRUNCATE|ALTER|CREATE|GRANT|REVOKE)",
        ),
        ("line comment", r"--"),
        ("block comment", r"/\*"),
        ("shell execution procedure", r"(?i)\b(xp_cmdshell|pg_execute_server_program)\b"),
        ("exec call", r"(?i)\bexec(ute)?\s*\("),
    ]
    .into_iter()
    .map(|(name, pattern)| {
        (
            name,
            Regex::new(pattern).expect("dangerous pattern table is a compile-time constant"),
        )
    })
    .collect()
});

static IDENTIFIER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_$]*$").expect("identifier pattern is a compile-time constant")
});

/// Why a query or identifier was refused.
///
/// Messages contain only caller input and fixed text, so they are safe to
/// return verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Query cannot be empty")]
    EmptyQuery,

    #[error("Query rejected: dangerous pattern detected ({pattern})")]
    DangerousPattern { pattern: &'static str },

    #[error(
        "{keyword} statements are not allowed in read-only mode. \
         Set ALLOW_WRITE_OPERATIONS=true to enable write operations."
    )]
    WriteNotAllowed { keyword: String },

    #[error("Query must start with one of: {allowed}")]
    StatementNotAllowed { allowed: String },

    #[error("Identifier cannot be empty")]
    EmptyIdentifier,

    #[error("Identifier is {length} characters long; the maximum is 63")]
    IdentifierTooLong { length: usize },

    #[error(
        "Invalid identifier '{0}': must start with a letter or underscore and contain \
         only letters, digits, underscores or '$'"
    )]
    InvalidIdentifier(String),
}

/// SQL text that passed [`validate`], trimmed of surrounding whitespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedQuery(String);

impl ValidatedQuery {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Upper-cased leading keyword, e.g. `"SELECT"`.
    pub fn keyword(&self) -> String {
        leading_keyword(&self.0)
    }
}

impl AsRef<str> for ValidatedQuery {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ValidatedQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Validate `query` for dispatch under the given write policy.
///
/// The dangerous-pattern scan runs before anything else and regardless of
/// `allow_write`: write mode widens which statements may run, never whether
/// they may stack extra commands or hide text in comments.
pub fn validate(query: &str, allow_write: bool) -> Result<ValidatedQuery, ValidationError> {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyQuery);
    }

    if let Some((pattern, _)) = DANGEROUS_PATTERNS.iter().find(|(_, re)| re.is_match(trimmed)) {
        return Err(ValidationError::DangerousPattern { pattern: *pattern });
    }

    let keyword = leading_keyword(trimmed);

    if !allow_write && WRITE_KEYWORDS.contains(&keyword.as_str()) {
        return Err(ValidationError::WriteNotAllowed { keyword });
    }

    let permitted = allowed_keywords(allow_write);
    if !permitted.contains(&keyword.as_str()) {
        return Err(ValidationError::StatementNotAllowed {
            allowed: permitted.join(", "),
        });
    }

    Ok(ValidatedQuery(trimmed.to_string()))
}

/// Leading keywords accepted under the given write policy.
pub fn allowed_keywords(allow_write: bool) -> Vec<&'static str> {
    let mut keywords = READ_KEYWORDS.to_vec();
    if allow_write {
        keywords.extend_from_slice(WRITE_KEYWORDS);
    }
    keywords
}

/// Check a schema, table or column name before it is spliced into SQL text.
///
/// Bound parameters cannot stand in for identifiers, so this whitelist is the
/// only thing between the caller and the statement structure.
pub fn validate_identifier(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::EmptyIdentifier);
    }
    let length = name.chars().count();
    if length > MAX_IDENTIFIER_LEN {
        return Err(ValidationError::IdentifierTooLong { length });
    }
    if !IDENTIFIER.is_match(name) {
        return Err(ValidationError::InvalidIdentifier(name.to_string()));
    }
    Ok(())
}

/// Double-quote an identifier that already passed [`validate_identifier`].
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name)
}

/// Clamp an optional row limit to `1..=max_limit`.
///
/// Missing means `max_limit`; zero or negative means `1`. The value can only
/// narrow a result set, so bad input is coerced instead of rejected.
pub fn sanitize_limit(limit: Option<i64>, max_limit: usize) -> usize {
    let max_limit = max_limit.max(1);
    match limit {
        None => max_limit,
        Some(n) if n < 1 => 1,
        Some(n) => usize::try_from(n).map_or(max_limit, |n| n.min(max_limit)),
    }
}

/// Escape `\`, `%` and `_` so `value` matches literally inside a LIKE pattern.
///
/// The result is still meant to be bound as a parameter; this guards against
/// wildcard injection, not SQL injection.
pub fn escape_like_pattern(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// First word of `text`, upper-cased. Empty when `text` starts with a symbol.
fn leading_keyword(text: &str) -> String {
    text.trim_start()
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_ascii_uppercase()
}
