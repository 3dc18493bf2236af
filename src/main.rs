use clap::{Parser, Subcommand};
use console::style;
use safety_rag::commands::{ask, build_text_indexes, rebuild, repl, search, show_stats};
use safety_rag::config::{
    Config, PerformanceProfile, TextSearchTarget, resolve_base_dir, run_interactive_config,
    show_config,
};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "safety-rag")]
#[command(about = "Ask questions about the safety-incident database in natural language")]
#[command(version)]
struct Cli {
    /// Directory holding config.toml, indexes and caches (default: ~/.safety-rag)
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,

    /// Log debug output from this crate
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask one question
    Ask {
        question: String,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Interactive question loop
    Repl,
    /// Rebuild the schema index
    Rebuild,
    /// Build vector indexes over free-text columns
    BuildTextIndexes {
        #[arg(long, requires = "column")]
        table: Option<String>,
        #[arg(long, requires = "table")]
        column: Option<String>,
        /// Embedding profile for this build: fast, balanced or safe
        #[arg(long)]
        profile: Option<PerformanceProfile>,
        /// Rebuild indexes that already exist
        #[arg(long)]
        force: bool,
    },
    /// Vector search over one text column
    Search {
        table: String,
        column: String,
        query: String,
        #[arg(short, default_value_t = 5)]
        k: usize,
    },
    /// Schema and text index statistics
    Stats,
    /// Configure Ollama and the database connection
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "warn,safety_rag=debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("{} {:#}", style("Error:").red().bold(), e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let base_dir = resolve_base_dir(cli.base_dir)?;

    if let Commands::Config { show } = cli.command {
        if show {
            show_config(&Config::load(&base_dir)?);
        } else {
            run_interactive_config(&base_dir)?;
        }
        return Ok(());
    }

    let config = Config::load(&base_dir)?;

    match cli.command {
        Commands::Ask { question, json } => ask(&config, &question, json).await,
        Commands::Repl => repl(&config).await,
        Commands::Rebuild => rebuild(&config).await,
        Commands::BuildTextIndexes {
            table,
            column,
            profile,
            force,
        } => {
            let target = table.zip(column).map(|(t, c)| TextSearchTarget::new(t, c));
            build_text_indexes(&config, target, profile, force).await
        }
        Commands::Search {
            table,
            column,
            query,
            k,
        } => search(&config, &TextSearchTarget::new(table, column), &query, k).await,
        Commands::Stats => show_stats(&config).await,
        Commands::Config { .. } => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn ask_command_with_json() {
        let cli = Cli::try_parse_from(["safety-rag", "ask", "Combien d'événements ?", "--json"])
            .expect("should parse");
        assert!(!cli.verbose);
        match cli.command {
            Commands::Ask { question, json } => {
                assert_eq!(question, "Combien d'événements ?");
                assert!(json);
            }
            _ => panic!("expected ask"),
        }
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["safety-rag", "repl", "--base-dir", "/tmp/x", "-v"])
            .expect("should parse");
        assert!(cli.verbose);
        assert_eq!(cli.base_dir, Some(PathBuf::from("/tmp/x")));
    }

    #[test]
    fn build_text_indexes_options() {
        let cli = Cli::try_parse_from([
            "safety-rag",
            "build-text-indexes",
            "--table",
            "event",
            "--column",
            "description",
            "--profile",
            "fast",
            "--force",
        ])
        .expect("should parse");
        match cli.command {
            Commands::BuildTextIndexes {
                table,
                column,
                profile,
                force,
            } => {
                assert_eq!(table.as_deref(), Some("event"));
                assert_eq!(column.as_deref(), Some("description"));
                assert_eq!(profile, Some(PerformanceProfile::Fast));
                assert!(force);
            }
            _ => panic!("expected build-text-indexes"),
        }
    }

    #[test]
    fn table_requires_column() {
        let cli = Cli::try_parse_from(["safety-rag", "build-text-indexes", "--table", "event"]);
        assert!(cli.is_err());
    }

    #[test]
    fn search_default_k() {
        let cli = Cli::try_parse_from(["safety-rag", "search", "event", "description", "chute"])
            .expect("should parse");
        match cli.command {
            Commands::Search { k, .. } => assert_eq!(k, 5),
            _ => panic!("expected search"),
        }
    }

    #[test]
    fn config_show_flag() {
        let cli = Cli::try_parse_from(["safety-rag", "config", "--show"]).expect("should parse");
        assert!(matches!(cli.command, Commands::Config { show: true }));
    }

    #[test]
    fn invalid_command() {
        let cli = Cli::try_parse_from(["safety-rag", "invalid"]);
        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::InvalidSubcommand);
        } else {
            panic!("invalid subcommand should not parse");
        }
    }
}
