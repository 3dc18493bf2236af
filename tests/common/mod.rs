// Deterministic stand-ins for Ollama and PostgreSQL shared by the integration tests

#![allow(dead_code, reason = "each test binary uses a different subset")]

use async_trait::async_trait;
use safety_rag::cache::QueryCache;
use safety_rag::config::{Config, TextSearchTarget};
use safety_rag::database::{ExecutionError, SqlExecutor, TextRow, TextSource};
use safety_rag::embeddings::{Embedder, EmbeddingCache, EmbeddingError};
use safety_rag::generation::{GenerationError, SqlGenerator, TextGenerator};
use safety_rag::pipeline::{PipelineParts, RagPipeline};
use safety_rag::retrieval::{TextColumnIndex, VectorIndexManager};
use safety_rag::schema::SchemaDescription;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

pub const SCHEMA: &str = r#"{
    "tables": {
        "event": {
            "description": "Événements de sécurité déclarés",
            "columns": [
                { "name": "event_id", "type": "integer", "description": "Identifiant" },
                { "name": "description", "type": "text", "description": "Récit de l'événement", "synonyms": ["incident", "accident", "problème"] },
                { "name": "declared_by", "type": "integer", "synonyms": ["déclarant"] }
            ]
        },
        "person": {
            "description": "Employés",
            "columns": [
                { "name": "person_id", "type": "integer" },
                { "name": "name", "type": "text", "synonyms": ["employé", "salarié"] }
            ]
        }
    },
    "relationships": [
        { "from": "event", "to": "person", "on": "declared_by", "description": "Déclarant de l'événement" }
    ],
    "sample_queries": [
        { "natural_language": "Combien d'événements ?", "sql": "SELECT COUNT(*) FROM event" }
    ]
}"#;

const CONCEPTS: [&[&str]; 4] = [
    &["chute", "hauteur", "tombé", "tombée", "échelle", "échafaudage"],
    &["glissade", "glissé", "sol", "mouillé"],
    &["brûlure", "chimique", "acide"],
    &["événement", "événements", "problème", "incident", "event"],
];

/// Embeds text onto fixed concept axes plus a constant bias, so vectors are never zero
#[derive(Default)]
pub struct ConceptEmbedder {
    calls: AtomicUsize,
}

impl ConceptEmbedder {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Embedder for ConceptEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut vector = vec![0.0, 0.0, 0.0, 0.0, 0.2];
        let lowered = text.to_lowercase();
        for word in lowered.split(|c: char| !c.is_alphanumeric()) {
            for (axis, words) in CONCEPTS.iter().enumerate() {
                if words.contains(&word) {
                    vector[axis] += 1.0;
                }
            }
        }
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        5
    }
}

/// Replies from a script, repeating the last reply; records every prompt
pub struct ScriptedGenerator {
    replies: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new(replies: &[&str]) -> Self {
        Self {
            replies: Mutex::new(replies.iter().map(ToString::to_string).collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("should lock prompts").clone()
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().expect("should lock prompts").len()
    }
}

impl TextGenerator for ScriptedGenerator {
    fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        self.prompts
            .lock()
            .expect("should lock prompts")
            .push(prompt.to_string());
        let mut replies = self.replies.lock().expect("should lock replies");
        if replies.len() > 1 {
            replies.pop_front().ok_or(GenerationError::Empty)
        } else {
            replies.front().cloned().ok_or(GenerationError::Empty)
        }
    }
}

/// Returns a fixed payload, or a fixed error for every statement
pub struct RecordingExecutor {
    outcome: Result<String, String>,
    statements: Mutex<Vec<String>>,
}

impl RecordingExecutor {
    pub fn ok(payload: &str) -> Self {
        Self {
            outcome: Ok(payload.to_string()),
            statements: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            outcome: Err(message.to_string()),
            statements: Mutex::new(Vec::new()),
        }
    }

    pub fn statements(&self) -> Vec<String> {
        self.statements
            .lock()
            .expect("should lock statements")
            .clone()
    }
}

#[async_trait]
impl SqlExecutor for RecordingExecutor {
    async fn execute(&self, sql: &str) -> Result<String, ExecutionError> {
        self.statements
            .lock()
            .expect("should lock statements")
            .push(sql.to_string());
        self.outcome.clone().map_err(ExecutionError)
    }
}

/// In-memory text columns keyed by target
pub struct FixedTextSource {
    pub columns: Vec<(TextSearchTarget, Vec<String>)>,
}

impl FixedTextSource {
    pub fn incidents() -> Self {
        Self {
            columns: vec![(
                TextSearchTarget::new("event", "description"),
                ["chute de hauteur", "glissade", "brûlure chimique"]
                    .map(String::from)
                    .to_vec(),
            )],
        }
    }
}

#[async_trait]
impl TextSource for FixedTextSource {
    async fn text_columns(&self) -> safety_rag::Result<Vec<TextSearchTarget>> {
        Ok(self.columns.iter().map(|(t, _)| t.clone()).collect())
    }

    async fn fetch_texts(&self, target: &TextSearchTarget) -> safety_rag::Result<Vec<TextRow>> {
        Ok(self
            .columns
            .iter()
            .find(|(t, _)| t == target)
            .map(|(_, texts)| {
                texts
                    .iter()
                    .enumerate()
                    .map(|(i, text)| TextRow {
                        text: text.clone(),
                        row_token: format!("(0,{})", i + 1),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }
}

pub fn test_config(dir: &TempDir) -> Config {
    let mut config = Config::with_base_dir(dir.path());
    config.embedding.backoff_base_ms = 1;
    config
}

pub struct Harness {
    pub pipeline: RagPipeline,
    pub embedder: Arc<ConceptEmbedder>,
    pub generator: Arc<ScriptedGenerator>,
    pub executor: Arc<RecordingExecutor>,
}

/// Assemble a pipeline over the fakes, with its indexes under `dir`
pub async fn build_pipeline(
    dir: &TempDir,
    config: &Config,
    generator: ScriptedGenerator,
    executor: RecordingExecutor,
) -> Harness {
    let embedder = Arc::new(ConceptEmbedder::default());
    let generator = Arc::new(generator);
    let executor = Arc::new(executor);

    let schema = Arc::new(SchemaDescription::from_json(SCHEMA).expect("schema should parse"));
    let cache = Arc::new(
        EmbeddingCache::load(
            config.embedding_cache_path(),
            &config.ollama.embedding_model,
            embedder.dimension(),
        )
        .expect("should load embedding cache"),
    );
    let mut profile = config.embedding.resolved();
    profile.delay = Duration::ZERO;

    let mut schema_index = VectorIndexManager::new(
        config.schema_index_path(),
        schema,
        Arc::clone(&embedder) as _,
        Arc::clone(&cache),
        profile,
    );
    schema_index.init().await.expect("should build schema index");

    let text_index = TextColumnIndex::open(
        &dir.path().join("text_indexes"),
        Arc::new(FixedTextSource::incidents()),
        Arc::clone(&embedder) as _,
        cache,
        profile,
    )
    .await
    .expect("should open text index");

    let sql_generator = SqlGenerator::new(
        Arc::clone(&generator) as _,
        Arc::clone(&executor) as _,
        config.generation.max_sql_retries,
        config.generation.context_excerpt_chars,
    );

    let pipeline = RagPipeline::new(
        PipelineParts {
            schema_index,
            text_index,
            generator: sql_generator,
            cache: QueryCache::new(config.cache.ttl()),
        },
        config,
    )
    .expect("should assemble pipeline");

    Harness {
        pipeline,
        embedder,
        generator,
        executor,
    }
}
