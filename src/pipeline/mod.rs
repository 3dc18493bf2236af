// Pipeline module
// The ask() orchestrator tying cache, retrieval, text search and SQL generation together


use fancy_regex::Regex;
use serde::{Serialize, Serializer};
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::cache::{QueryCache, SqliteCacheStore};
use crate::config::{
    Config, DATABASE_URL_ENV, EmbeddingConfig, PerformanceProfile, TextSearchTarget,
};
use crate::database::PostgresStore;
use crate::embeddings::{EmbeddingCache, OllamaClient, truncate_text};
use crate::generation::{ColumnFixer, ConversationHistory, GeneratedQuery, SqlGenerator};
use crate::retrieval::{
    ColumnStats, SchemaIndexStats, TextColumnIndex, TextIndexError, TextMatch,
    VectorIndexManager, render_context,
};
use crate::schema::SchemaDescription;
use crate::{RagError, Result};

const TEXT_PREVIEW_CHARS: usize = 200;
const RULE: &str = "======================================================================";

fn as_secs<S: Serializer>(
    duration: &Duration,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}

/// Outcome of one `ask`, successful or not
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineResult {
    pub success: bool,
    pub question: String,
    pub sql: Option<String>,
    pub result: Option<String>,
    pub from_cache: bool,
    #[serde(serialize_with = "as_secs")]
    pub execution_time: Duration,
    pub used_text_search: bool,
    pub error: Option<String>,
}

impl PipelineResult {
    fn cached(question: &str, result: String) -> Self {
        Self {
            success: true,
            question: question.to_string(),
            sql: None,
            result: Some(result),
            from_cache: true,
            execution_time: Duration::ZERO,
            used_text_search: false,
            error: None,
        }
    }

    fn answered(
        question: &str,
        query: GeneratedQuery,
        used_text_search: bool,
        execution_time: Duration,
    ) -> Self {
        Self {
            success: true,
            question: question.to_string(),
            sql: Some(query.sql),
            result: Some(query.result),
            from_cache: false,
            execution_time,
            used_text_search,
            error: None,
        }
    }

    fn failed(question: &str, error: &RagError, execution_time: Duration) -> Self {
        Self {
            success: false,
            question: question.to_string(),
            sql: None,
            result: None,
            from_cache: false,
            execution_time,
            used_text_search: false,
            error: Some(error.to_string()),
        }
    }
}

/// Outcome of a direct vector search over one text column
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextSearchResponse {
    pub success: bool,
    pub query: String,
    pub table: String,
    pub column: String,
    pub results: Vec<TextMatch>,
    pub count: usize,
    #[serde(serialize_with = "as_secs")]
    pub execution_time: Duration,
    pub error: Option<String>,
    /// The pair has no sub-index, as opposed to a search with no matches
    pub index_missing: bool,
}

/// The components a pipeline is assembled from
pub struct PipelineParts {
    pub schema_index: VectorIndexManager,
    pub text_index: TextColumnIndex,
    pub generator: SqlGenerator,
    pub cache: QueryCache,
}

/// Retrieval-augmented question answering over the incident database.
///
/// [`RagPipeline::ask`] is the single failure boundary: every error below it
/// comes back as a [`PipelineResult`] with `success == false`.
pub struct RagPipeline {
    schema_index: VectorIndexManager,
    text_index: TextColumnIndex,
    generator: SqlGenerator,
    cache: QueryCache,
    history: ConversationHistory,
    rewrites: Vec<(Regex, String)>,
    text_target: Option<TextSearchTarget>,
    top_k: usize,
    text_top_k: usize,
    embedding: EmbeddingConfig,
    profile: PerformanceProfile,
}

impl RagPipeline {
    #[inline]
    pub fn new(parts: PipelineParts, config: &Config) -> Result<Self> {
        let rewrites = config
            .retrieval
            .rewrites
            .iter()
            .map(|rewrite| {
                Regex::new(&format!("(?i){}", rewrite.pattern))
                    .map(|regex| (regex, rewrite.replacement.clone()))
                    .map_err(|e| {
                        RagError::Config(format!("Invalid rewrite '{}': {}", rewrite.pattern, e))
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            schema_index: parts.schema_index,
            text_index: parts.text_index,
            generator: parts.generator,
            cache: parts.cache,
            history: ConversationHistory::new(
                config.generation.history_turns,
                config.generation.result_preview_chars,
            ),
            rewrites,
            text_target: config.retrieval.text_search.clone(),
            top_k: config.retrieval.top_k,
            text_top_k: config.retrieval.text_top_k,
            embedding: config.embedding.clone(),
            profile: config.embedding.profile,
        })
    }

    /// Assemble the production stack: Ollama, PostgreSQL, LanceDB and the caches.
    ///
    /// Fails when the database URL or schema file is missing, when a backend is
    /// unreachable, or when the schema index cannot be loaded or built.
    #[inline]
    pub async fn connect(config: &Config) -> Result<Self> {
        config.validate()?;
        let database_url = config.database_url(std::env::var(DATABASE_URL_ENV).ok())?;
        let schema_path = config.require_schema_file()?;
        let schema = Arc::new(SchemaDescription::load(&schema_path)?);
        info!(
            "Loaded schema with {} tables from {}",
            schema.tables.len(),
            schema_path.display()
        );

        let ollama = Arc::new(OllamaClient::new(&config.ollama)?);
        let probe = Arc::clone(&ollama);
        tokio::task::spawn_blocking(move || probe.health_check())
            .await
            .map_err(|e| RagError::Embedding(format!("health check worker failed: {e}")))?
            .map_err(|e| RagError::Embedding(format!("Ollama health check failed: {e:#}")))?;

        let postgres = Arc::new(PostgresStore::connect(&database_url, &config.database).await?);
        let embedding_cache = Arc::new(EmbeddingCache::load(
            config.embedding_cache_path(),
            &config.ollama.embedding_model,
            config.ollama.embedding_dimension as usize,
        )?);
        let profile = config.embedding.resolved();

        let mut schema_index = VectorIndexManager::new(
            config.schema_index_path(),
            Arc::clone(&schema),
            Arc::clone(&ollama) as _,
            Arc::clone(&embedding_cache),
            profile,
        );
        schema_index.init().await?;

        let text_index = TextColumnIndex::open(
            &config.text_index_path(),
            Arc::clone(&postgres) as _,
            Arc::clone(&ollama) as _,
            embedding_cache,
            profile,
        )
        .await?;

        let mut generator = SqlGenerator::new(
            ollama,
            postgres,
            config.generation.max_sql_retries,
            config.generation.context_excerpt_chars,
        );
        if config.generation.auto_fix_columns {
            generator = generator.with_column_fixer(ColumnFixer::from_schema(&schema));
        }

        let mut cache = QueryCache::new(config.cache.ttl());
        if config.cache.shared_store {
            match SqliteCacheStore::open(config.query_cache_path(), &config.cache.namespace).await
            {
                Ok(store) => cache = cache.with_shared_store(Arc::new(store)),
                Err(e) => warn!("Shared query cache unavailable, using memory only: {:#}", e),
            }
        }

        Self::new(
            PipelineParts {
                schema_index,
                text_index,
                generator,
                cache,
            },
            config,
        )
    }

    /// Answer `question`, consulting the query cache first
    #[inline]
    pub async fn ask(&mut self, question: &str) -> PipelineResult {
        let start = Instant::now();

        if let Some(result) = self.cache.get(question).await {
            info!("Answered from cache");
            return PipelineResult::cached(question, result);
        }

        match self.answer(question).await {
            Ok((query, used_text_search)) => {
                self.cache.set(question, &query.result).await;
                self.history.record(question, &query.sql, &query.result);
                PipelineResult::answered(question, query, used_text_search, start.elapsed())
            }
            Err(e) => {
                error!("Query failed: {}", e);
                PipelineResult::failed(question, &e, start.elapsed())
            }
        }
    }

    async fn answer(&self, question: &str) -> Result<(GeneratedQuery, bool)> {
        let rewritten = self.rewrite(question);
        if rewritten != question {
            debug!("Rewrote question to: {}", rewritten);
        }

        let query_vector = self.schema_index.embed_query(&rewritten).await?;
        let documents = self
            .schema_index
            .retrieve_by_vector(&query_vector, self.top_k)
            .await?;
        let mut context = render_context(&documents);

        let text_context = self.text_search_context(&rewritten).await;
        let used_text_search = text_context.is_some();
        if let Some(block) = text_context {
            context.push_str("\n\n");
            context.push_str(&block);
        }

        let query = self
            .generator
            .generate_and_execute(
                &rewritten,
                &context,
                &self.history.render(),
                Some(&query_vector),
            )
            .await?;
        Ok((query, used_text_search))
    }

    /// Text-search block for the configured target, if its sub-index exists.
    ///
    /// A missing sub-index or a failed search only drops the block.
    async fn text_search_context(&self, question: &str) -> Option<String> {
        let target = self.text_target.as_ref()?;

        match self.text_index.has_index(target).await {
            Ok(true) => {}
            Ok(false) => {
                warn!(
                    "Text index not found for {}; run build_text_indexes first",
                    target
                );
                return None;
            }
            Err(e) => {
                warn!("Could not inspect text index for {}: {}", target, e);
                return None;
            }
        }

        match self.text_index.search(question, target, self.text_top_k).await {
            Ok(matches) => {
                info!("Text search on {} found {} matches", target, matches.len());
                Some(format_text_context(target, &matches))
            }
            Err(e) => {
                warn!("Text search failed: {}", e);
                None
            }
        }
    }

    fn rewrite(&self, question: &str) -> String {
        self.rewrites
            .iter()
            .fold(question.to_string(), |current, (regex, replacement)| {
                regex
                    .replace_all(&current, replacement.as_str())
                    .into_owned()
            })
    }

    /// Direct vector search over one column; never fails, errors land in the response
    #[inline]
    pub async fn search_text(
        &self,
        query: &str,
        target: &TextSearchTarget,
        k: usize,
    ) -> TextSearchResponse {
        let start = Instant::now();
        let outcome = self.text_index.search(query, target, k).await;
        let execution_time = start.elapsed();

        let (results, error, index_missing) = match outcome {
            Ok(results) => (results, None, false),
            Err(e) => {
                warn!("Text search on {} failed: {}", target, e);
                let missing = matches!(e, TextIndexError::IndexNotFound { .. });
                (Vec::new(), Some(RagError::from(e).to_string()), missing)
            }
        };

        TextSearchResponse {
            success: error.is_none(),
            query: query.to_string(),
            table: target.table.clone(),
            column: target.column.clone(),
            count: results.len(),
            results,
            execution_time,
            error,
            index_missing,
        }
    }

    #[inline]
    pub async fn clear_cache_and_history(&mut self) {
        self.cache.clear().await;
        self.history.clear();
        info!("Cache and history cleared");
    }

    #[inline]
    pub async fn rebuild_index(&mut self) -> Result<()> {
        self.schema_index.rebuild().await
    }

    /// Build text sub-indexes with the active profile, or `profile` when given.
    ///
    /// `target` restricts the build to one pair, which is always rebuilt.
    #[inline]
    pub async fn build_text_indexes(
        &self,
        target: Option<&TextSearchTarget>,
        profile: Option<PerformanceProfile>,
        force: bool,
    ) -> Result<Vec<(TextSearchTarget, usize)>> {
        let profile = self
            .embedding
            .with_profile(profile.unwrap_or(self.profile));
        info!(
            "Building text indexes (batch {}, workers {}, delay {:?})",
            profile.batch_size, profile.max_workers, profile.delay
        );

        match target {
            Some(target) => {
                let count = self.text_index.build_column(target, &profile).await?;
                Ok(vec![(target.clone(), count)])
            }
            None => self.text_index.build_all(&profile, force).await,
        }
    }

    /// Switch the profile used by later text index builds
    #[inline]
    pub fn set_profile(&mut self, profile: PerformanceProfile) {
        info!("Performance profile set to {}", profile);
        self.profile = profile;
    }

    #[inline]
    pub fn profile(&self) -> PerformanceProfile {
        self.profile
    }

    #[inline]
    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    #[inline]
    pub async fn schema_stats(&self) -> Result<SchemaIndexStats> {
        self.schema_index.stats().await
    }

    #[inline]
    pub async fn text_stats(&self) -> Result<Vec<ColumnStats>> {
        self.text_index.stats().await
    }
}

/// Render text-search matches as an extra prompt context block
#[inline]
pub fn format_text_context(target: &TextSearchTarget, matches: &[TextMatch]) -> String {
    let mut block = format!(
        "{RULE}\nCONTEXTE DE RECHERCHE VECTORIELLE (Table: {}, Colonne: {})\n{RULE}\n\nTextes similaires trouvés dans la base de données:\n",
        target.table, target.column
    );

    for (i, hit) in matches.iter().enumerate() {
        let preview = truncate_text(&hit.text, TEXT_PREVIEW_CHARS);
        let ellipsis = if preview.len() < hit.text.len() { "..." } else { "" };
        let _ = write!(
            block,
            "\n[Résultat #{} - Similarité: {:.1}%]\n{}{}\n",
            i + 1,
            hit.similarity * 100.0,
            preview,
            ellipsis
        );
    }

    let _ = write!(
        block,
        "\n{RULE}\nUtilise ces exemples pour comprendre le contexte de la question.\n{RULE}"
    );
    block
}
