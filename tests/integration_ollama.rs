#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// Integration tests that require a local Ollama instance with both models pulled
// Run with: cargo test --test integration_ollama -- --ignored

use safety_rag::config::OllamaConfig;
use safety_rag::embeddings::{Embedder, OllamaClient};
use safety_rag::generation::{TextGenerator, extract_sql, validate_sql};
use std::env;
use std::time::Duration;
use tracing::info;

fn create_integration_test_client() -> OllamaClient {
    let defaults = OllamaConfig::default();
    let config = OllamaConfig {
        host: env::var("OLLAMA_HOST").unwrap_or_else(|_| defaults.host.clone()),
        port: env::var("OLLAMA_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(defaults.port),
        embedding_model: env::var("OLLAMA_EMBEDDING_MODEL")
            .unwrap_or_else(|_| defaults.embedding_model.clone()),
        generation_model: env::var("OLLAMA_GENERATION_MODEL")
            .unwrap_or_else(|_| defaults.generation_model.clone()),
        ..defaults
    };

    OllamaClient::new(&config)
        .expect("Failed to create Ollama client")
        .with_timeout(Duration::from_secs(120))
        .with_retry_attempts(3)
}

fn init_test_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init()
        .ok();
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm = |v: &[f32]| v.iter().map(|x| x * x).sum::<f32>().sqrt();
    dot / (norm(a) * norm(b))
}

#[test]
#[ignore = "requires a local Ollama instance"]
fn real_ollama_health_check() {
    init_test_tracing();
    let client = create_integration_test_client();

    let result = client.health_check();
    assert!(result.is_ok(), "Health check should succeed: {:?}", result);
}

#[test]
#[ignore = "requires a local Ollama instance"]
fn real_embedding_dimension_matches_config() {
    init_test_tracing();
    let client = create_integration_test_client();

    let vector = client
        .embed("Chute de hauteur depuis une échelle")
        .expect("embedding should succeed");
    assert_eq!(vector.len(), client.dimension());
}

#[test]
#[ignore = "requires a local Ollama instance"]
fn real_embeddings_rank_related_incidents_closer() {
    init_test_tracing();
    let client = create_integration_test_client();

    let query = client.embed("tombé d'une échelle").expect("should embed");
    let fall = client.embed("chute de hauteur").expect("should embed");
    let burn = client.embed("brûlure chimique").expect("should embed");

    let fall_similarity = cosine(&query, &fall);
    let burn_similarity = cosine(&query, &burn);
    info!("fall {} burn {}", fall_similarity, burn_similarity);
    assert!(fall_similarity > burn_similarity);
}

#[test]
#[ignore = "requires a local Ollama instance"]
fn real_generation_produces_safe_select() {
    init_test_tracing();
    let client = create_integration_test_client();

    let reply = client
        .generate(
            "Réponds uniquement avec une requête SQL PostgreSQL.\n\
             Table event(event_id integer, description text).\n\
             Question: combien d'événements ?",
        )
        .expect("generation should succeed");
    let sql = extract_sql(&reply);

    info!("Generated: {}", sql);
    assert!(validate_sql(&sql).is_ok(), "unsafe or non-SELECT SQL: {sql}");
}
