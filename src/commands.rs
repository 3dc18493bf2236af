use anyhow::{Context, Result};
use console::style;
use std::fmt;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use crate::config::{Config, PerformanceProfile, TextSearchTarget};
use crate::pipeline::{PipelineResult, RagPipeline, TextSearchResponse};
use crate::retrieval::{ColumnStats, SchemaIndexStats};

/// Request counters for one interactive session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub successful: u32,
    pub failed: u32,
    pub cached: u32,
    pub direct_searches: u32,
}

impl SessionStats {
    #[inline]
    pub fn record_answer(&mut self, result: &PipelineResult) {
        if !result.success {
            self.failed += 1;
        } else if result.from_cache {
            self.cached += 1;
        } else {
            self.successful += 1;
        }
    }

    #[inline]
    pub fn record_search(&mut self, response: &TextSearchResponse) {
        if response.success {
            self.direct_searches += 1;
        } else {
            self.failed += 1;
        }
    }

    #[inline]
    pub fn total(&self) -> u32 {
        self.successful + self.failed + self.cached + self.direct_searches
    }
}

impl fmt::Display for SessionStats {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Requests:        {}", self.total())?;
        writeln!(f, "  Successful:    {}", self.successful)?;
        writeln!(f, "  From cache:    {}", self.cached)?;
        writeln!(f, "  Direct search: {}", self.direct_searches)?;
        write!(f, "  Failed:        {}", self.failed)
    }
}

/// One line typed at the interactive prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Exit,
    Clear,
    Rebuild,
    BuildTextIndexes,
    Profile(PerformanceProfile),
    TextStats,
    Search {
        target: TextSearchTarget,
        query: String,
    },
    Stats,
    History,
    Question(String),
    Empty,
    /// A control word with bad arguments; carries the usage hint
    Invalid(String),
}

impl ReplCommand {
    #[inline]
    pub fn parse(line: &str) -> Self {
        let line = line.trim();

        match line.to_lowercase().as_str() {
            "" => return Self::Empty,
            "exit" | "quit" => return Self::Exit,
            "clear" => return Self::Clear,
            "rebuild" => return Self::Rebuild,
            "build_text_indexes" => return Self::BuildTextIndexes,
            "text_stats" => return Self::TextStats,
            "stats" => return Self::Stats,
            "history" => return Self::History,
            _ => {}
        }

        if let Some(name) = strip_prefix_ignore_case(line, "profile:") {
            return name.trim().parse().map_or_else(
                |_| Self::Invalid("Usage: profile:fast|balanced|safe".to_string()),
                Self::Profile,
            );
        }

        if let Some(rest) = strip_prefix_ignore_case(line, "search:") {
            return parse_search(rest).unwrap_or_else(|| {
                Self::Invalid("Usage: search:table.column:query".to_string())
            });
        }

        Self::Question(line.to_string())
    }
}

fn strip_prefix_ignore_case<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    let head = line.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| line.get(prefix.len()..))
        .flatten()
}

fn parse_search(rest: &str) -> Option<ReplCommand> {
    let (pair, query) = rest.split_once(':')?;
    let (table, column) = pair.trim().split_once('.')?;
    let query = query.trim();
    if table.is_empty() || column.is_empty() || query.is_empty() {
        return None;
    }
    Some(ReplCommand::Search {
        target: TextSearchTarget::new(table, column),
        query: query.to_string(),
    })
}

/// Answer one question and print the outcome
#[inline]
pub async fn ask(config: &Config, question: &str, json: bool) -> Result<()> {
    let mut pipeline = RagPipeline::connect(config).await?;
    let result = pipeline.ask(question).await;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&result).context("Failed to serialize result")?
        );
    } else {
        print_result(&result);
    }

    if result.success {
        Ok(())
    } else {
        Err(anyhow::anyhow!(
            "{}",
            result.error.unwrap_or_else(|| "query failed".to_string())
        ))
    }
}

/// Interactive question loop
#[inline]
pub async fn repl(config: &Config) -> Result<()> {
    let mut pipeline = RagPipeline::connect(config).await?;
    let mut stats = SessionStats::default();

    println!("{}", style("Safety RAG assistant").bold().cyan());
    println!(
        "Commands: exit, clear, rebuild, build_text_indexes, profile:<name>, text_stats, search:table.column:query, stats, history"
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        eprint!("{} ", style("?").bold().green());

        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read input")?,
            _ = tokio::signal::ctrl_c() => {
                println!();
                None
            }
        };
        let Some(line) = line else { break };

        match ReplCommand::parse(&line) {
            ReplCommand::Empty => {}
            ReplCommand::Exit => break,
            ReplCommand::Clear => {
                pipeline.clear_cache_and_history().await;
                stats = SessionStats::default();
                println!("{}", style("Cache, history and statistics cleared").green());
            }
            ReplCommand::Rebuild => match pipeline.rebuild_index().await {
                Ok(()) => println!("{}", style("Schema index rebuilt").green()),
                Err(e) => println!("{} {}", style("Rebuild failed:").red(), e),
            },
            ReplCommand::BuildTextIndexes => {
                match pipeline.build_text_indexes(None, None, true).await {
                    Ok(built) => print_built(&built),
                    Err(e) => println!("{} {}", style("Text index build failed:").red(), e),
                }
            }
            ReplCommand::Profile(profile) => {
                pipeline.set_profile(profile);
                println!("Profile: {}", style(profile).cyan());
            }
            ReplCommand::TextStats => match pipeline.text_stats().await {
                Ok(columns) => print_text_stats(&columns),
                Err(e) => println!("{} {}", style("Could not read text indexes:").red(), e),
            },
            ReplCommand::Search { target, query } => {
                let response = pipeline
                    .search_text(&query, &target, config.retrieval.text_top_k)
                    .await;
                stats.record_search(&response);
                print_search(&response);
            }
            ReplCommand::Stats => println!("{stats}"),
            ReplCommand::History => {
                if pipeline.history().is_empty() {
                    println!("No history yet");
                }
                for (i, turn) in pipeline.history().turns().enumerate() {
                    println!("{}. {}", i + 1, style(&turn.question).bold());
                    println!("   {}", turn.sql);
                }
            }
            ReplCommand::Invalid(usage) => println!("{}", style(usage).yellow()),
            ReplCommand::Question(question) => {
                let result = pipeline.ask(&question).await;
                stats.record_answer(&result);
                print_result(&result);
            }
        }
    }

    info!("Session ended after {} requests", stats.total());
    println!("{stats}");
    Ok(())
}

#[inline]
pub async fn rebuild(config: &Config) -> Result<()> {
    let mut pipeline = RagPipeline::connect(config).await?;
    pipeline.rebuild_index().await?;
    print_schema_stats(&pipeline.schema_stats().await?);
    Ok(())
}

#[inline]
pub async fn build_text_indexes(
    config: &Config,
    target: Option<TextSearchTarget>,
    profile: Option<PerformanceProfile>,
    force: bool,
) -> Result<()> {
    let pipeline = RagPipeline::connect(config).await?;
    let built = pipeline
        .build_text_indexes(target.as_ref(), profile, force)
        .await?;
    print_built(&built);
    Ok(())
}

#[inline]
pub async fn search(
    config: &Config,
    target: &TextSearchTarget,
    query: &str,
    k: usize,
) -> Result<()> {
    let pipeline = RagPipeline::connect(config).await?;
    let response = pipeline.search_text(query, target, k).await;
    print_search(&response);

    match response.error {
        Some(error) => Err(anyhow::anyhow!(error)),
        None => Ok(()),
    }
}

#[inline]
pub async fn show_stats(config: &Config) -> Result<()> {
    let pipeline = RagPipeline::connect(config).await?;
    print_schema_stats(&pipeline.schema_stats().await?);
    print_text_stats(&pipeline.text_stats().await?);
    Ok(())
}

fn print_result(result: &PipelineResult) {
    if !result.success {
        println!(
            "{} {}",
            style("✗").red().bold(),
            result.error.as_deref().unwrap_or("unknown error")
        );
        println!("  Time: {:.2}s", result.execution_time.as_secs_f64());
        return;
    }

    if result.from_cache {
        println!("{}", style("✓ Answer from cache").green());
    } else {
        println!(
            "{} ({:.2}s{})",
            style("✓ SQL generated").green(),
            result.execution_time.as_secs_f64(),
            if result.used_text_search {
                ", with text search"
            } else {
                ""
            }
        );
    }

    if let Some(sql) = &result.sql {
        println!("{}", style(sql).cyan());
    }
    if let Some(rows) = &result.result {
        println!("{}", pretty_json(rows));
    }
}

fn pretty_json(raw: &str) -> String {
    serde_json::from_str::<serde_json::Value>(raw)
        .ok()
        .and_then(|value| serde_json::to_string_pretty(&value).ok())
        .unwrap_or_else(|| raw.to_string())
}

fn print_search(response: &TextSearchResponse) {
    if let Some(error) = &response.error {
        println!("{} {}", style("✗").red().bold(), error);
        if response.index_missing {
            println!(
                "  Build it with: safety-rag build-text-indexes --table {} --column {}",
                response.table, response.column
            );
        }
        return;
    }

    println!(
        "{} {} results in {}.{} ({:.2}s)",
        style("✓").green(),
        response.count,
        response.table,
        response.column,
        response.execution_time.as_secs_f64()
    );
    for hit in &response.results {
        println!(
            "\n#{} similarity {:.4}, distance {:.4} (row {})",
            hit.rank, hit.similarity, hit.distance, hit.row_token
        );
        println!("  {}", hit.text);
    }
}

fn print_built(built: &[(TextSearchTarget, usize)]) {
    if built.is_empty() {
        println!("No text index needed building");
        return;
    }
    for (target, count) in built {
        println!("{} {}: {} vectors", style("✓").green(), target, count);
    }
}

fn print_schema_stats(stats: &SchemaIndexStats) {
    println!("{}", style("Schema index").bold().yellow());
    println!("  Documents: {}", stats.documents);
    println!("  Dimension: {}", stats.dimension);
    match stats.origin {
        Some(origin) => println!("  State:     {} ({})", stats.state, origin),
        None => println!("  State:     {}", stats.state),
    }
}

fn print_text_stats(columns: &[ColumnStats]) {
    println!("{}", style("Text indexes").bold().yellow());
    if columns.is_empty() {
        warn!("No text index has been built");
        println!("  none built; run build_text_indexes");
        return;
    }
    for column in columns {
        println!(
            "  {}.{}: {} vectors, dimension {}, {} metadata entries",
            column.table, column.column, column.vectors, column.dimension, column.metadata
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn control_words_are_case_insensitive() {
        assert_eq!(ReplCommand::parse("  EXIT "), ReplCommand::Exit);
        assert_eq!(ReplCommand::parse("quit"), ReplCommand::Exit);
        assert_eq!(ReplCommand::parse("Clear"), ReplCommand::Clear);
        assert_eq!(
            ReplCommand::parse("build_text_indexes"),
            ReplCommand::BuildTextIndexes
        );
        assert_eq!(ReplCommand::parse(""), ReplCommand::Empty);
    }

    #[test]
    fn profile_switch_parses_names() {
        assert_eq!(
            ReplCommand::parse("profile:fast"),
            ReplCommand::Profile(PerformanceProfile::Fast)
        );
        assert_eq!(
            ReplCommand::parse("profile: safe"),
            ReplCommand::Profile(PerformanceProfile::Safe)
        );
        assert!(matches!(
            ReplCommand::parse("profile:turbo"),
            ReplCommand::Invalid(_)
        ));
    }

    #[test]
    fn search_keeps_colons_in_the_query() {
        assert_eq!(
            ReplCommand::parse("search:event.description:chute: échelle"),
            ReplCommand::Search {
                target: TextSearchTarget::new("event", "description"),
                query: "chute: échelle".to_string(),
            }
        );
        assert!(matches!(
            ReplCommand::parse("search:event:chute"),
            ReplCommand::Invalid(_)
        ));
    }

    #[test]
    fn anything_else_is_a_question() {
        assert_eq!(
            ReplCommand::parse("Combien d'événements ?"),
            ReplCommand::Question("Combien d'événements ?".to_string())
        );
    }

    #[test]
    fn session_stats_count_by_outcome() {
        let mut stats = SessionStats::default();
        let answered = PipelineResult {
            success: true,
            question: "q".to_string(),
            sql: Some("SELECT 1".to_string()),
            result: Some("[]".to_string()),
            from_cache: false,
            execution_time: Duration::from_millis(10),
            used_text_search: false,
            error: None,
        };
        stats.record_answer(&answered);
        stats.record_answer(&PipelineResult {
            from_cache: true,
            ..answered.clone()
        });
        stats.record_answer(&PipelineResult {
            success: false,
            error: Some("boom".to_string()),
            ..answered
        });

        assert_eq!(
            stats,
            SessionStats {
                successful: 1,
                failed: 1,
                cached: 1,
                direct_searches: 0,
            }
        );
        assert_eq!(stats.total(), 3);
    }
}
