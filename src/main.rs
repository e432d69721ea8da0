use anyhow::Result;
use clap::{Parser, Subcommand};
use docs_rag::agents::RequestedAgent;
use docs_rag::commands::{EmbedderKind, ask_question, chat, ingest_document, reset};
use docs_rag::config::{Config, init_config, show_config};
use docs_rag::pipeline::DEFAULT_TOP_K;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "docs-rag")]
#[command(about = "Ask questions about a local document, answered by a local Ollama model")]
#[command(version)]
struct Cli {
    /// Directory holding config.toml, the document index and caches
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    /// Use the built-in hashing embedder instead of Ollama embeddings
    #[arg(long, global = true)]
    hashing_embedder: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration and check the Ollama connection
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Index a plain-text document, replacing the current one
    Ingest {
        /// Path to the document
        file: PathBuf,
    },
    /// Answer a question from the indexed document
    Ask {
        question: String,
        /// Number of chunks to retrieve
        #[arg(short, long, default_value_t = DEFAULT_TOP_K)]
        k: usize,
    },
    /// Chat about the document; the message is routed to an agent
    Chat {
        message: String,
        /// auto, qa, summarize or slides
        #[arg(long, default_value = "auto")]
        agent: RequestedAgent,
    },
    /// Forget the current document and delete its index
    Reset {
        /// Also clear the persisted semantic response cache
        #[arg(long)]
        cache: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => Config::default_data_dir()?,
    };
    let config = Config::load(&data_dir)?;
    let embedder = if cli.hashing_embedder {
        EmbedderKind::Hashing
    } else {
        EmbedderKind::Ollama
    };

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config(&config)?;
            } else {
                init_config(&config)?;
            }
        }
        Commands::Ingest { file } => {
            ingest_document(&config, embedder, &file).await?;
        }
        Commands::Ask { question, k } => {
            ask_question(&config, embedder, &question, k).await?;
        }
        Commands::Chat { message, agent } => {
            chat(&config, embedder, &message, agent).await?;
        }
        Commands::Reset { cache } => {
            reset(&config, cache).await?;
        }
    }

    Ok(())
}
