#[cfg(test)]
mod tests;

use fancy_regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

use super::extract::starts_with_query_keyword;

/// Mutating keywords rejected anywhere in a statement, as whole words
pub const FORBIDDEN_KEYWORDS: &[&str] = &[
    "DROP", "TRUNCATE", "ALTER", "CREATE", "DELETE", "UPDATE", "INSERT",
];

static FORBIDDEN_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)\b({})\b", FORBIDDEN_KEYWORDS.join("|"))).expect("valid regex")
});

static DANGEROUS_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    vec![
        (
            Regex::new(r"(?i);\s*(DROP|DELETE|TRUNCATE|ALTER)").expect("valid regex"),
            "statement chaining into a mutating keyword",
        ),
        (
            Regex::new(r"(?i)--.*(?:DROP|DELETE)").expect("valid regex"),
            "mutating keyword inside a line comment",
        ),
        (
            Regex::new(r"(?is)/\*.*(?:DROP|DELETE).*\*/").expect("valid regex"),
            "mutating keyword inside a block comment",
        ),
    ]
});

/// Why a statement was refused; never retried
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Empty SQL statement")]
    Empty,

    #[error("Forbidden operation: {0}")]
    ForbiddenKeyword(String),

    #[error("Only SELECT queries are allowed")]
    NotReadOnly,

    #[error("Suspicious pattern detected: {0}")]
    SuspiciousPattern(&'static str),
}

/// Statically check that `sql` is a single read-only query.
///
/// Regex engine errors (backtrack limits) count as a suspicious pattern.
#[inline]
pub fn validate_sql(sql: &str) -> Result<(), ValidationError> {
    let sql = sql.trim();
    if sql.is_empty() {
        return Err(ValidationError::Empty);
    }

    match FORBIDDEN_REGEX.captures(sql) {
        Ok(Some(captures)) => {
            let keyword = captures
                .get(1)
                .map_or_else(String::new, |m| m.as_str().to_uppercase());
            return Err(ValidationError::ForbiddenKeyword(keyword));
        }
        Ok(None) => {}
        Err(_) => return Err(ValidationError::SuspiciousPattern("unparseable statement")),
    }

    if !starts_with_query_keyword(sql) {
        return Err(ValidationError::NotReadOnly);
    }

    for (pattern, reason) in DANGEROUS_PATTERNS.iter() {
        if pattern.is_match(sql).unwrap_or(true) {
            return Err(ValidationError::SuspiciousPattern(reason));
        }
    }

    Ok(())
}

/// Boolean form of [`validate_sql`]
#[inline]
pub fn is_safe(sql: &str) -> bool {
    validate_sql(sql).is_ok()
}
