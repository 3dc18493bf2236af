#[cfg(test)]
mod tests;

/// Lines containing one of these end a scanned (unfenced) statement
const STOP_MARKERS: &[&str] = &[
    "explication:",
    "note:",
    "remarque:",
    "this query",
    "this will",
    "explanation:",
    "---",
    "###",
];

fn strip_prefix_ignore_case<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    text.get(..prefix.len())
        .filter(|head| head.eq_ignore_ascii_case(prefix))
        .and_then(|_| text.get(prefix.len()..))
}

/// True when `text` opens with a SELECT or WITH keyword
#[inline]
pub fn starts_with_query_keyword(text: &str) -> bool {
    ["SELECT", "WITH"]
        .iter()
        .any(|keyword| strip_prefix_ignore_case(text, keyword).is_some())
}

fn strip_trailing_semicolons(sql: &str) -> String {
    sql.trim_end()
        .trim_end_matches(|c: char| c == ';' || c.is_whitespace())
        .to_string()
}

/// Extract one SQL statement from a free-text model reply.
///
/// Fenced code blocks opening with SELECT/WITH (after an optional `sql` tag) win;
/// otherwise lines are collected from the first SELECT/WITH line until an
/// explanation marker. Falls back to the trimmed reply when nothing matches.
#[inline]
pub fn extract_sql(reply: &str) -> String {
    if reply.contains("```") {
        for part in reply.split("```") {
            let part = part.trim();
            let part = strip_prefix_ignore_case(part, "sql").map_or(part, str::trim);
            if starts_with_query_keyword(part) {
                return strip_trailing_semicolons(part);
            }
        }
    }

    let mut lines = Vec::new();
    let mut in_sql = false;

    for line in reply.lines() {
        let cleaned = line.trim();

        if !in_sql && starts_with_query_keyword(cleaned) {
            in_sql = true;
        }

        if in_sql {
            let lowered = cleaned.to_lowercase();
            if STOP_MARKERS.iter().any(|marker| lowered.contains(marker)) {
                break;
            }
            lines.push(line);
        }
    }

    let sql = strip_trailing_semicolons(lines.join("\n").trim());
    if sql.is_empty() {
        reply.trim().to_string()
    } else {
        sql
    }
}
