use super::*;
use std::fs;
use tempfile::TempDir;

#[test]
fn resolve_base_dir_prefers_override() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let resolved =
        resolve_base_dir(Some(temp_dir.path().to_path_buf())).expect("override is accepted");
    assert_eq!(resolved, temp_dir.path());
}

#[test]
fn config_file_persistence() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");

    let mut original = Config::with_base_dir(temp_dir.path());
    original.ollama.protocol = "https".to_string();
    original.ollama.host = "ollama.internal".to_string();
    original.ollama.port = 8443;
    original.database.url = Some("postgres://rag@localhost/incidents".to_string());
    original.embedding.profile = PerformanceProfile::Safe;
    original.retrieval.rewrites = vec![QuestionRewrite {
        pattern: r"\bTMS\b".to_string(),
        replacement: "troubles musculosquelettiques".to_string(),
    }];
    original.retrieval.text_search = Some(TextSearchTarget::new("incident", "summary"));
    original.cache.shared_store = true;

    original.save().expect("should save config");
    assert!(temp_dir.path().join("config.toml").exists());

    let loaded = Config::load(temp_dir.path()).expect("should load config");
    assert_eq!(loaded, original);
}

#[test]
fn config_without_text_search_round_trips() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");

    let mut original = Config::with_base_dir(temp_dir.path());
    original.retrieval.text_search = None;
    original.save().expect("should save config");

    let loaded = Config::load(temp_dir.path()).expect("should load config");
    assert_eq!(loaded.retrieval.text_search, None);
}

#[test]
fn invalid_file_is_rejected_on_load() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    fs::write(
        temp_dir.path().join("config.toml"),
        "[ollama]\nprotocol = \"ftp\"\n",
    )
    .expect("should write config");

    assert!(Config::load(temp_dir.path()).is_err());
}

#[test]
fn malformed_toml_is_rejected_on_load() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    fs::write(temp_dir.path().join("config.toml"), "[ollama\nport = ")
        .expect("should write config");

    assert!(Config::load(temp_dir.path()).is_err());
}

#[test]
fn derived_paths_live_under_base_dir() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let config = Config::with_base_dir(temp_dir.path());

    for path in [
        config.schema_index_path(),
        config.text_index_path(),
        config.embedding_cache_path(),
        config.query_cache_path(),
        config.schema_path(),
    ] {
        assert!(path.starts_with(temp_dir.path()), "{}", path.display());
    }
}
