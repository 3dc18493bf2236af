use super::*;
use serde_json::json;

#[test]
fn metadata_round_trips_through_json() {
    let record = VectorRecord {
        vector: vec![0.1, 0.2],
        content: "chute de hauteur".to_string(),
        metadata: json!({ "row_token": "(0,1)" }).to_string(),
        position: 0,
    };

    let metadata: serde_json::Value = record.metadata_as().expect("metadata is json");
    assert_eq!(metadata["row_token"], "(0,1)");
}

#[test]
fn invalid_metadata_is_an_error() {
    let record = VectorRecord {
        vector: vec![],
        content: String::new(),
        metadata: "not json".to_string(),
        position: 3,
    };

    assert!(record.metadata_as::<serde_json::Value>().is_err());
}
