//! Best-effort repair of "column alias.x does not exist" execution errors.
//!
//! The fix rewrites the missing column to the first declared column of the
//! aliased table, assuming that column is the primary key. This is a guess: it
//! misfires on tables whose key is composite or not listed first, so it is off
//! by default and only ever proposes a candidate that still goes through
//! validation and execution.

#[cfg(test)]
mod tests;

use fancy_regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;
use tracing::debug;

use crate::schema::SchemaDescription;

static MISSING_COLUMN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)column "?(\w+)\.(\w+)"? does not exist"#).expect("valid regex")
});

static TABLE_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:FROM|JOIN)\s+(\w+)(?:\s+(?:AS\s+)?(\w+))?").expect("valid regex")
});

#[derive(Debug, Clone, Default)]
pub struct ColumnFixer {
    first_columns: HashMap<String, String>,
}

impl ColumnFixer {
    #[inline]
    pub fn from_schema(schema: &SchemaDescription) -> Self {
        let first_columns = schema
            .tables
            .iter()
            .filter_map(|table| {
                table
                    .columns
                    .first()
                    .map(|column| (table.name.to_lowercase(), column.name.clone()))
            })
            .collect();

        Self { first_columns }
    }

    /// Propose a rewritten statement, or `None` when the heuristic does not apply
    #[inline]
    pub fn try_fix(&self, sql: &str, error: &str) -> Option<String> {
        let captures = MISSING_COLUMN.captures(error).ok()??;
        let alias = captures.get(1)?.as_str();
        let missing = captures.get(2)?.as_str();

        let table = resolve_alias(sql, alias)?;
        let replacement = self.first_columns.get(&table.to_lowercase())?;
        if replacement.eq_ignore_ascii_case(missing) {
            return None;
        }

        let qualified = Regex::new(&format!(
            r"\b{}\.{}\b",
            fancy_regex::escape(alias),
            fancy_regex::escape(missing)
        ))
        .ok()?;

        let mut fixed = String::with_capacity(sql.len());
        let mut last_end = 0;
        for found in qualified.find_iter(sql) {
            let found = found.ok()?;
            fixed.push_str(sql.get(last_end..found.start())?);
            fixed.push_str(alias);
            fixed.push('.');
            fixed.push_str(replacement);
            last_end = found.end();
        }
        if last_end == 0 {
            return None;
        }
        fixed.push_str(sql.get(last_end..)?);

        debug!(
            "Auto-fix rewrote {}.{} to {}.{}",
            alias, missing, alias, replacement
        );
        Some(fixed)
    }
}

/// Table name bound to `alias` by a FROM/JOIN clause; a bare table name resolves to itself
fn resolve_alias(sql: &str, alias: &str) -> Option<String> {
    TABLE_REFERENCE
        .captures_iter(sql)
        .filter_map(Result::ok)
        .find_map(|captures| {
            let table = captures.get(1)?.as_str();
            let bound = captures.get(2).map_or(table, |m| m.as_str());
            (bound.eq_ignore_ascii_case(alias) || table.eq_ignore_ascii_case(alias))
                .then(|| table.to_string())
        })
}
