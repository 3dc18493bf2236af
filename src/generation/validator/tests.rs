use super::*;

#[test]
fn plain_select_is_safe() {
    assert!(is_safe("SELECT 1"));
    assert!(is_safe("  select count(*) from event where created_at > now() - interval '1 year'"));
    assert!(is_safe(
        "WITH recent AS (SELECT * FROM event) SELECT COUNT(*) FROM recent"
    ));
}

#[test]
fn chained_drop_is_rejected() {
    assert_eq!(
        validate_sql("SELECT * FROM event; DROP TABLE event;"),
        Err(ValidationError::ForbiddenKeyword("DROP".to_string()))
    );
}

#[test]
fn update_is_rejected() {
    assert_eq!(
        validate_sql("UPDATE event SET x=1"),
        Err(ValidationError::ForbiddenKeyword("UPDATE".to_string()))
    );
}

#[test]
fn keywords_match_case_insensitively_as_whole_words() {
    assert!(!is_safe("select * from event where 1=1 or delete"));
    assert!(!is_safe("WITH x AS (insert into t values (1) returning *) SELECT * FROM x"));
    // Substrings of identifiers are fine
    assert!(is_safe("SELECT created_at, updated_by FROM event"));
    assert!(is_safe("SELECT dropped_count FROM stats"));
}

#[test]
fn non_query_statements_are_rejected() {
    assert_eq!(
        validate_sql("EXPLAIN SELECT 1"),
        Err(ValidationError::NotReadOnly)
    );
    assert_eq!(validate_sql("   "), Err(ValidationError::Empty));
}

#[test]
fn comment_smuggling_is_rejected() {
    assert!(matches!(
        validate_sql("SELECT 1 -- DROPPED"),
        Err(ValidationError::SuspiciousPattern(_))
    ));
    assert!(matches!(
        validate_sql("SELECT 1 /* then\nDELETEALL */"),
        Err(ValidationError::SuspiciousPattern(_))
    ));
}

#[test]
fn rejection_messages_name_the_reason() {
    let error = validate_sql("DELETE FROM event").expect_err("delete is unsafe");
    assert_eq!(error.to_string(), "Forbidden operation: DELETE");
}
