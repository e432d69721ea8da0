use anyhow::{Context, Result};
use console::style;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::agents::{AgentRouter, RequestedAgent, RouterResponse};
use crate::config::Config;
use crate::embeddings::{EmbeddingProvider, HashingEmbedder, OllamaEmbedder};
use crate::generation::GenerationClient;
use crate::pipeline::RetrievalPipeline;
use crate::session::{DocumentSession, IngestOutcome};

/// Which embedding provider backs the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmbedderKind {
    #[default]
    Ollama,
    /// In-process feature hashing, no server needed
    Hashing,
}

/// Everything one CLI invocation needs, wired around a single generation client
pub struct App {
    session: DocumentSession,
    router: AgentRouter,
    pipeline: RetrievalPipeline,
    generator: Arc<GenerationClient>,
}

impl App {
    #[inline]
    pub fn open(config: &Config, embedder_kind: EmbedderKind) -> Result<Self> {
        let embedder = build_embedder(config, embedder_kind)?;
        let generator = Arc::new(
            GenerationClient::from_config(config, Arc::clone(&embedder))
                .context("Failed to create generation client")?,
        );
        Self::from_parts(config, embedder, generator)
    }

    /// Wire an app around an existing embedder and generation client
    #[inline]
    pub fn from_parts(
        config: &Config,
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<GenerationClient>,
    ) -> Result<Self> {
        let session = DocumentSession::open(config, Arc::clone(&embedder))
            .context("Failed to open document session")?;
        let pipeline = RetrievalPipeline::new(embedder, session.index(), Arc::clone(&generator));
        let router = AgentRouter::new(pipeline.clone(), Arc::clone(&generator));

        Ok(Self {
            session,
            router,
            pipeline,
            generator,
        })
    }

    #[inline]
    pub fn session(&self) -> &DocumentSession {
        &self.session
    }

    #[inline]
    pub async fn ingest(&mut self, name: &str, text: &str) -> Result<IngestOutcome> {
        self.session
            .ingest(name, text)
            .await
            .with_context(|| format!("Failed to ingest {}", name))
    }

    #[inline]
    pub async fn ask(&self, question: &str, top_k: usize) -> String {
        self.pipeline.answer(question, top_k).await
    }

    #[inline]
    pub async fn chat(&self, message: &str, agent: RequestedAgent) -> RouterResponse {
        self.router.dispatch(&self.session, message, agent).await
    }

    #[inline]
    pub async fn reset(&mut self) -> Result<()> {
        self.session
            .reset()
            .await
            .context("Failed to reset document session")
    }

    #[inline]
    pub async fn clear_caches(&self) -> Result<()> {
        self.generator
            .clear_caches()
            .await
            .context("Failed to clear response caches")
    }

    /// Load the generation model ahead of the first real request.
    ///
    /// Skipped while no document is loaded, since no request will reach the
    /// backend then.
    #[inline]
    pub async fn warm_up(&self) {
        if !self.session.has_document() {
            return;
        }
        if !self.generator.warm_up().await {
            warn!("Continuing without a warmed-up model");
        }
    }

    #[inline]
    pub async fn shutdown(&self) {
        self.generator.shutdown().await;
    }
}

fn build_embedder(config: &Config, kind: EmbedderKind) -> Result<Arc<dyn EmbeddingProvider>> {
    let embedder: Arc<dyn EmbeddingProvider> = match kind {
        EmbedderKind::Ollama => Arc::new(
            OllamaEmbedder::new(&config.ollama).context("Failed to create Ollama embedder")?,
        ),
        EmbedderKind::Hashing => Arc::new(HashingEmbedder::new(
            config.ollama.embedding_dimension as usize,
        )),
    };
    Ok(embedder)
}

/// Read a plain-text document and index it
#[inline]
pub async fn ingest_document(config: &Config, embedder: EmbedderKind, path: &Path) -> Result<()> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read document: {}", path.display()))?;
    let name = path
        .file_name()
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());

    let mut app = App::open(config, embedder)?;
    info!("Ingesting {}", path.display());

    match app.ingest(&name, &text).await? {
        IngestOutcome::Indexed {
            name,
            text_length,
            chunks,
        } => {
            println!("{} {}", style("✓ Indexed").green(), style(&name).cyan());
            println!("  Characters: {}", text_length);
            println!("  Chunks: {}", chunks);
        }
        IngestOutcome::AlreadyIndexed { name } => {
            println!("{} is already indexed, skipping.", style(&name).cyan());
        }
    }

    app.shutdown().await;
    Ok(())
}

/// Answer a question from the indexed document
#[inline]
pub async fn ask_question(
    config: &Config,
    embedder: EmbedderKind,
    question: &str,
    top_k: usize,
) -> Result<()> {
    let app = App::open(config, embedder)?;
    app.warm_up().await;

    let answer = app.ask(question, top_k).await;
    println!("{}", answer);

    app.shutdown().await;
    Ok(())
}

/// Send a chat message through the agent router
#[inline]
pub async fn chat(
    config: &Config,
    embedder: EmbedderKind,
    message: &str,
    agent: RequestedAgent,
) -> Result<()> {
    let app = App::open(config, embedder)?;
    app.warm_up().await;

    let reply = app.chat(message, agent).await;
    println!("{}", style(format!("[{}]", reply.agent_used)).dim());
    println!("{}", reply.response);

    app.shutdown().await;
    Ok(())
}

/// Forget the current document and delete its index; optionally drop cached answers too
#[inline]
pub async fn reset(config: &Config, clear_cache: bool) -> Result<()> {
    let mut app = App::open(config, EmbedderKind::Hashing)?;
    app.reset().await?;
    println!("{}", style("✓ Document session reset").green());

    if clear_cache {
        app.clear_caches().await?;
        println!("{}", style("✓ Response cache cleared").green());
    }

    app.shutdown().await;
    Ok(())
}
