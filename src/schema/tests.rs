use super::*;
use tempfile::TempDir;

const SCHEMA: &str = r#"{
    "tables": {
        "person": {
            "description": "Employés et intervenants",
            "columns": [
                { "name": "person_id", "type": "integer" },
                { "name": "name", "type": "text", "synonyms": ["employé", "salarié"] }
            ]
        },
        "event": {
            "columns": [
                { "name": "event_id", "type": "integer" },
                { "name": "description", "type": "text", "sample_values": [1,2,3,4,5,6,7,8,9,10,11,12] }
            ]
        },
        "audit": { "columns": [] }
    },
    "relationships": [
        { "from": "event_employee", "to": "person", "on": "person_id" }
    ],
    "sample_queries": [
        { "natural_language": "Combien d'événements ?", "sql": "SELECT COUNT(*) FROM event" }
    ]
}"#;

#[test]
fn tables_keep_document_order() {
    let schema = SchemaDescription::from_json(SCHEMA).expect("schema should parse");
    let names: Vec<&str> = schema.tables.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, ["person", "event", "audit"]);
}

#[test]
fn optional_fields_take_defaults() {
    let schema = SchemaDescription::from_json(SCHEMA).expect("schema should parse");

    let event = schema.table("event").expect("event table");
    assert_eq!(event.description, None);
    assert!(event.columns[0].synonyms.is_empty());

    let relationship = &schema.relationships[0];
    assert_eq!(relationship.kind, "foreign_key");
    assert_eq!(relationship.description, None);
}

#[test]
fn sample_values_are_capped() {
    let schema = SchemaDescription::from_json(SCHEMA).expect("schema should parse");
    let event = schema.table("event").expect("event table");
    assert_eq!(event.columns[1].sample_values.len(), MAX_SAMPLE_VALUES);
}

#[test]
fn duplicate_tables_are_rejected() {
    let result = SchemaDescription::from_json(
        r#"{ "tables": { "event": { "columns": [] }, "event": { "columns": [] } } }"#,
    );
    assert!(result.is_err());
}

#[test]
fn load_reports_missing_file() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let error = SchemaDescription::load(temp_dir.path().join("schema.json"))
        .expect_err("file does not exist");
    assert!(format!("{error:#}").contains("schema.json"));
}

#[test]
fn load_reads_file() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = temp_dir.path().join("schema.json");
    std::fs::write(&path, SCHEMA).expect("should write schema");

    let schema = SchemaDescription::load(&path).expect("schema should load");
    assert_eq!(schema.sample_queries.len(), 1);
}
