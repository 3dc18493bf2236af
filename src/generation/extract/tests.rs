use super::*;

#[test]
fn fenced_block_with_language_tag() {
    let reply = "Voici la requête :\n```sql\nSELECT COUNT(*)\nFROM event;\n```\nElle compte les événements.";
    assert_eq!(extract_sql(reply), "SELECT COUNT(*)\nFROM event");
}

#[test]
fn fenced_block_without_query_is_skipped() {
    let reply = "```text\nrien ici\n```\n```\nWITH recent AS (SELECT 1) SELECT * FROM recent\n```";
    assert_eq!(
        extract_sql(reply),
        "WITH recent AS (SELECT 1) SELECT * FROM recent"
    );
}

#[test]
fn unfenced_reply_stops_at_explanation_marker() {
    let reply = "Bien sûr.\nSELECT e.event_id, e.description\nFROM event e\nLIMIT 100;\nExplication: cette requête liste les événements.";
    assert_eq!(
        extract_sql(reply),
        "SELECT e.event_id, e.description\nFROM event e\nLIMIT 100"
    );
}

#[test]
fn english_markers_also_stop() {
    let reply = "select 1\nThis query returns one.";
    assert_eq!(extract_sql(reply), "select 1");

    let reply = "SELECT 2\n---\nmore text";
    assert_eq!(extract_sql(reply), "SELECT 2");
}

#[test]
fn multiple_trailing_semicolons_are_removed() {
    assert_eq!(extract_sql("SELECT 1;;  \n"), "SELECT 1");
}

#[test]
fn reply_without_sql_is_returned_trimmed() {
    assert_eq!(
        extract_sql("  Je ne peux pas répondre.  "),
        "Je ne peux pas répondre."
    );
}

#[test]
fn keyword_detection_is_case_insensitive() {
    assert!(starts_with_query_keyword("select 1"));
    assert!(starts_with_query_keyword("With x AS (SELECT 1) SELECT 1"));
    assert!(!starts_with_query_keyword("DELETE FROM event"));
    assert!(!starts_with_query_keyword("éé"));
}
