use super::*;
use crate::schema::SchemaDescription;

fn fixer() -> ColumnFixer {
    let schema = SchemaDescription::from_json(
        r#"{
            "tables": {
                "event": { "columns": [ { "name": "event_id", "type": "integer" }, { "name": "description", "type": "text" } ] },
                "person": { "columns": [ { "name": "person_id", "type": "integer" } ] }
            }
        }"#,
    )
    .expect("schema should parse");
    ColumnFixer::from_schema(&schema)
}

#[test]
fn rewrites_missing_alias_column_to_first_column() {
    let fixed = fixer().try_fix(
        "SELECT e.id, e.description FROM event e WHERE e.id > 10",
        "column e.id does not exist",
    );
    assert_eq!(
        fixed.as_deref(),
        Some("SELECT e.event_id, e.description FROM event e WHERE e.event_id > 10")
    );
}

#[test]
fn resolves_aliases_declared_with_as_and_joins() {
    let fixed = fixer().try_fix(
        "SELECT p.id FROM event AS e JOIN person AS p ON p.id = e.event_id",
        "ERROR: column \"p.id\" does not exist",
    );
    assert_eq!(
        fixed.as_deref(),
        Some("SELECT p.person_id FROM event AS e JOIN person AS p ON p.person_id = e.event_id")
    );
}

#[test]
fn does_not_touch_longer_identifiers() {
    let fixed = fixer().try_fix(
        "SELECT e.id, e.id_old FROM event e",
        "column e.id does not exist",
    );
    assert_eq!(
        fixed.as_deref(),
        Some("SELECT e.event_id, e.id_old FROM event e")
    );
}

#[test]
fn unrelated_errors_are_left_alone() {
    let fixer = fixer();
    assert_eq!(
        fixer.try_fix("SELECT 1 FROM event e", "syntax error at or near \"FORM\""),
        None
    );
    assert_eq!(
        fixer.try_fix("SELECT x.id FROM unknown x", "column x.id does not exist"),
        None
    );
    assert_eq!(
        fixer.try_fix(
            "SELECT e.event_id FROM event e",
            "column e.event_id does not exist"
        ),
        None
    );
}
