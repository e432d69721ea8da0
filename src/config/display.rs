use anyhow::{Context, Result};
use console::style;
use std::time::Duration;

use super::{Config, OllamaConfig};
use crate::embeddings::OllamaEmbedder;

/// Write a default `config.toml` if none exists, then probe the Ollama server
#[inline]
pub fn init_config(config: &Config) -> Result<()> {
    eprintln!("{}", style("🔧 Docs RAG Configuration").bold().cyan());
    eprintln!();

    let config_path = config.config_file_path();
    if config_path.exists() {
        eprintln!("{}", style("Found existing configuration.").green());
    } else {
        config.save().context("Failed to save configuration")?;
        eprintln!("{}", style("✓ Default configuration written").green());
    }
    eprintln!(
        "Configuration file: {}",
        style(config_path.display()).cyan()
    );

    eprintln!();
    eprintln!("{}", style("Testing Ollama connection...").yellow());

    if test_ollama_connection(&config.ollama) {
        eprintln!("{}", style("✓ Ollama connection successful!").green());
        report_models(config);
    } else {
        eprintln!(
            "{}",
            style("⚠ Warning: Could not connect to Ollama").yellow()
        );
        eprintln!("Make sure `ollama serve` is running before asking questions.");
    }

    Ok(())
}

#[inline]
pub fn show_config(config: &Config) -> Result<()> {
    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Ollama Settings:").bold().yellow());
    eprintln!("  Host: {}", style(&config.ollama.host).cyan());
    eprintln!("  Port: {}", style(config.ollama.port).cyan());
    eprintln!("  Embedding Model: {}", style(&config.ollama.model).cyan());
    eprintln!("  Batch Size: {}", style(config.ollama.batch_size).cyan());
    match config.ollama_url() {
        Ok(url) => eprintln!("  Ollama URL: {}", style(url).cyan()),
        Err(e) => eprintln!("  Ollama URL: {} ({})", style("Invalid").red(), e),
    }

    let generation = &config.generation;
    eprintln!();
    eprintln!("{}", style("Generation Settings:").bold().yellow());
    eprintln!("  Model: {}", style(&generation.model).cyan());
    eprintln!("  Temperature: {}", style(generation.temperature).cyan());
    eprintln!(
        "  Token Budget: {} (summaries: {})",
        style(generation.query_token_budget).cyan(),
        style(generation.summary_token_budget).cyan()
    );
    eprintln!(
        "  Retries: {} attempts, {}ms apart",
        style(generation.max_attempts).cyan(),
        style(generation.retry_delay_ms).cyan()
    );
    eprintln!(
        "  Semantic Cache: {}",
        style(if generation.semantic_cache {
            "enabled"
        } else {
            "disabled"
        })
        .cyan()
    );
    if let Some(distance) = generation.semantic_cache_max_distance {
        eprintln!("  Semantic Cache Max Distance: {}", style(distance).cyan());
    }

    eprintln!();
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );

    Ok(())
}

fn report_models(config: &Config) {
    let embedder = match OllamaEmbedder::new(&config.ollama) {
        Ok(embedder) => embedder,
        Err(e) => {
            eprintln!("{} {}", style("⚠ Could not check models:").yellow(), e);
            return;
        }
    };

    for model in [&config.ollama.model, &config.generation.model] {
        match embedder.has_model(model) {
            Ok(true) => eprintln!("  {} {}", style("✓").green(), model),
            Ok(false) => eprintln!(
                "  {} {} (run `ollama pull {}`)",
                style("✗").red(),
                model,
                model
            ),
            Err(e) => eprintln!("  {} {}: {}", style("?").yellow(), model, e),
        }
    }
}

fn test_ollama_connection(ollama: &OllamaConfig) -> bool {
    let url = format!(
        "{}://{}:{}/api/version",
        ollama.protocol, ollama.host, ollama.port
    );

    let agent: ureq::Agent = ureq::Agent::config_builder()
        .timeout_global(Some(Duration::from_secs(5)))
        .build()
        .into();

    match agent.get(&url).call() {
        Ok(_) => true,
        Err(ureq::Error::StatusCode(code)) if (400..500).contains(&code) => true,
        Err(_) => false,
    }
}
