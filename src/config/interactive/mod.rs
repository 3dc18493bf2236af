
use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input, Select};
use std::path::Path;

use super::{Config, ConfigError, OllamaConfig, PerformanceProfile, settings::DATABASE_URL_ENV};

#[inline]
pub fn run_interactive_config(base_dir: &Path) -> Result<()> {
    eprintln!("{}", style("🔧 Safety RAG Configuration Setup").bold().cyan());
    eprintln!();

    let mut config = load_existing_config(base_dir)?;

    eprintln!("{}", style("Ollama Configuration").bold().yellow());
    eprintln!("Configure the Ollama instance used for embeddings and SQL generation.");
    eprintln!();

    configure_ollama(&mut config.ollama)?;

    eprintln!();
    eprintln!("{}", style("Database Configuration").bold().yellow());
    configure_database(&mut config)?;

    let profiles = [
        PerformanceProfile::Fast,
        PerformanceProfile::Balanced,
        PerformanceProfile::Safe,
    ];
    let default_index = profiles
        .iter()
        .position(|p| *p == config.embedding.profile)
        .unwrap_or(1);
    let profile_index = Select::new()
        .with_prompt("Batch embedding profile")
        .default(default_index)
        .items(&profiles)
        .interact()?;
    config.embedding.profile = profiles[profile_index];

    eprintln!();
    eprintln!("{}", style("Testing configuration...").yellow());

    if test_ollama_connection(&config.ollama) {
        eprintln!("{}", style("✓ Ollama connection successful!").green());
    } else {
        eprintln!(
            "{}",
            style("⚠ Warning: Could not connect to Ollama").yellow()
        );
        eprintln!("You can continue, but make sure Ollama is running before building indexes.");
    }

    eprintln!();
    if Confirm::new()
        .with_prompt("Save configuration?")
        .default(true)
        .interact()?
    {
        config.save().context("Failed to save configuration")?;
        eprintln!("{}", style("✓ Configuration saved successfully!").green());
        eprintln!(
            "Configuration saved to: {}",
            style(config.config_file_path().display()).cyan()
        );
    } else {
        eprintln!("Configuration not saved.");
    }

    Ok(())
}

#[inline]
pub fn show_config(config: &Config) {
    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Ollama Settings:").bold().yellow());
    match config.ollama.ollama_url() {
        Ok(url) => eprintln!("  URL: {}", style(url).cyan()),
        Err(e) => eprintln!("  URL: {} ({})", style("Invalid").red(), e),
    }
    eprintln!(
        "  Embedding model: {} ({} dims)",
        style(&config.ollama.embedding_model).cyan(),
        config.ollama.embedding_dimension
    );
    eprintln!(
        "  Generation model: {}",
        style(&config.ollama.generation_model).cyan()
    );

    eprintln!();
    eprintln!("{}", style("Database:").bold().yellow());
    let url_source = if std::env::var(DATABASE_URL_ENV).is_ok() {
        format!("from {}", DATABASE_URL_ENV)
    } else if config.database.url.is_some() {
        "from config.toml".to_string()
    } else {
        "not set".to_string()
    };
    eprintln!("  URL: {}", style(url_source).cyan());
    eprintln!(
        "  Statement timeout: {} ms",
        style(config.database.statement_timeout_ms).cyan()
    );

    eprintln!();
    eprintln!("{}", style("Retrieval:").bold().yellow());
    eprintln!(
        "  Schema file: {}",
        style(config.schema_path().display()).cyan()
    );
    eprintln!("  Top-k: {}", style(config.retrieval.top_k).cyan());
    match &config.retrieval.text_search {
        Some(target) => eprintln!("  Text search: {}", style(target).cyan()),
        None => eprintln!("  Text search: {}", style("disabled").dim()),
    }
    eprintln!(
        "  Embedding profile: {}",
        style(config.embedding.profile).cyan()
    );

    eprintln!();
    eprintln!("{}", style("Cache:").bold().yellow());
    eprintln!("  TTL: {} s", style(config.cache.ttl_secs).cyan());
    eprintln!(
        "  Shared store: {}",
        style(if config.cache.shared_store { "on" } else { "off" }).cyan()
    );

    eprintln!();
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );
}

fn load_existing_config(base_dir: &Path) -> Result<Config> {
    if base_dir.join(super::settings::CONFIG_FILE_NAME).exists() {
        let config = Config::load(base_dir)?;
        eprintln!("{}", style("Found existing configuration.").green());
        Ok(config)
    } else {
        eprintln!(
            "{}",
            style("No existing configuration found. Using defaults.").yellow()
        );
        Ok(Config::with_base_dir(base_dir))
    }
}

fn configure_ollama(ollama: &mut OllamaConfig) -> Result<()> {
    let protocols = &["http", "https"];
    let default_index = protocols
        .iter()
        .position(|&p| p == ollama.protocol)
        .unwrap_or(0);

    let protocol_index = Select::new()
        .with_prompt("Ollama protocol")
        .default(default_index)
        .items(protocols)
        .interact()?;

    let protocol = protocols[protocol_index].to_string();

    let host: String = Input::new()
        .with_prompt("Ollama host")
        .default(ollama.host.clone())
        .validate_with(|input: &String| -> Result<(), ConfigError> {
            let candidate = OllamaConfig {
                protocol: protocol.clone(),
                host: input.clone(),
                ..ollama.clone()
            };
            candidate.validate()
        })
        .interact_text()?;

    let port: u16 = Input::new()
        .with_prompt("Ollama port")
        .default(ollama.port)
        .validate_with(|input: &u16| -> Result<(), &str> {
            if *input == 0 {
                Err("Port must be greater than 0")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let embedding_model: String = Input::new()
        .with_prompt("Embedding model")
        .default(ollama.embedding_model.clone())
        .validate_with(non_empty)
        .interact_text()?;

    let generation_model: String = Input::new()
        .with_prompt("Generation model")
        .default(ollama.generation_model.clone())
        .validate_with(non_empty)
        .interact_text()?;

    let embedding_dimension: u32 = Input::new()
        .with_prompt("Embedding dimension")
        .default(ollama.embedding_dimension)
        .validate_with(|input: &u32| -> Result<(), &str> {
            if (64..=4096).contains(input) {
                Ok(())
            } else {
                Err("Dimension must be between 64 and 4096")
            }
        })
        .interact_text()?;

    ollama.protocol = protocol;
    ollama.host = host;
    ollama.port = port;
    ollama.embedding_model = embedding_model;
    ollama.generation_model = generation_model;
    ollama.embedding_dimension = embedding_dimension;
    ollama.validate()?;

    Ok(())
}

fn configure_database(config: &mut Config) -> Result<()> {
    let url: String = Input::new()
        .with_prompt(format!(
            "PostgreSQL URL (leave empty to rely on {})",
            DATABASE_URL_ENV
        ))
        .default(config.database.url.clone().unwrap_or_default())
        .allow_empty(true)
        .interact_text()?;

    config.database.url = if url.trim().is_empty() {
        None
    } else {
        Some(url.trim().to_string())
    };

    Ok(())
}

#[expect(clippy::ptr_arg, reason = "dialoguer validators receive &String")]
fn non_empty(input: &String) -> Result<(), &'static str> {
    if input.trim().is_empty() {
        Err("Model name cannot be empty")
    } else {
        Ok(())
    }
}

fn test_ollama_connection(ollama: &OllamaConfig) -> bool {
    let url = format!(
        "{}://{}:{}/api/version",
        ollama.protocol, ollama.host, ollama.port
    );

    let agent: ureq::Agent = ureq::Agent::config_builder()
        .timeout_global(Some(std::time::Duration::from_secs(5)))
        .build()
        .into();

    match agent.get(&url).call() {
        Ok(_) => true,
        Err(ureq::Error::StatusCode(code)) => (400..500).contains(&code),
        Err(_) => false,
    }
}
