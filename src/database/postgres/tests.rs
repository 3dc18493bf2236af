use super::*;

#[test]
fn statements_are_wrapped_as_json_rows() {
    assert_eq!(
        json_rows_query("SELECT event_id FROM event LIMIT 100"),
        "SELECT row_to_json(q)::text FROM (\nSELECT event_id FROM event LIMIT 100\n) q"
    );
}

#[test]
fn trailing_line_comment_does_not_swallow_the_wrapper() {
    let query = json_rows_query("SELECT count(*) FROM event -- total events");

    assert_eq!(
        query,
        "SELECT row_to_json(q)::text FROM (\nSELECT count(*) FROM event -- total events\n) q"
    );
    assert_eq!(query.lines().last(), Some(") q"));
}

#[test]
fn text_extraction_quotes_identifiers_and_orders_by_row() {
    let query = text_extraction_query(&TextSearchTarget::new("event", "description"))
        .expect("identifiers are valid");

    assert!(query.starts_with(r#"SELECT "description"::text, ctid::text FROM "event""#));
    assert!(query.contains(r#""description" IS NOT NULL"#));
    assert!(query.ends_with("ORDER BY ctid"));
}

#[test]
fn text_extraction_rejects_unsafe_identifiers() {
    for (table, column) in [
        ("event; DROP TABLE event", "description"),
        ("event", "description\" --"),
        ("", "description"),
        ("1event", "description"),
    ] {
        let result = text_extraction_query(&TextSearchTarget::new(table, column));
        assert!(
            matches!(result, Err(RagError::Config(_))),
            "{table}.{column} should be rejected"
        );
    }
}

#[test]
fn non_database_errors_keep_their_message() {
    let error = execution_error(&sqlx::Error::PoolTimedOut);
    assert!(!error.0.is_empty());
}
