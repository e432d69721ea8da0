// Generation module
// Cached, retried, streaming answer generation against a text-generation backend

pub mod retry;
pub mod transport;

#[cfg(test)]
mod tests;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::cache::{ResponseCache, SemanticCache, prompt_key};
use crate::config::{Config, GenerationConfig};
use crate::embeddings::EmbeddingProvider;
use crate::{RagError, Result};

pub use retry::{RetryEvent, RetryObserver, RetryPolicy, TracingObserver};
pub use transport::{
    GeneratePayload, GenerationTransport, LineStream, OllamaTransport, SamplingOptions,
    aggregate_stream,
};

/// Returned by [`GenerationClient::generate`] once every attempt has failed
pub const BACKEND_UNAVAILABLE_MESSAGE: &str = "⚠️ Error: Ollama not responding. Please ensure `ollama serve` is running and the model is pulled.";

const WARM_UP_PROMPT: &str = "Hello! This is a warm-up prompt.";
const SUMMARY_MARKERS: [&str; 3] = ["summarize", "summarise", "summary"];

/// How long a failed warm-up stands in for the backend's health
const WARM_UP_FAILURE_WINDOW: Duration = Duration::from_secs(30);

/// System instructions plus the user prompt for one generation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub system: String,
    pub prompt: String,
}

impl GenerationRequest {
    #[inline]
    pub fn new(system: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            prompt: prompt.into(),
        }
    }

    /// The single prompt string sent to the backend
    #[inline]
    pub fn full_prompt(&self) -> String {
        format!("{}\n\nUser Query:\n{}", self.system, self.prompt)
            .trim()
            .to_string()
    }

    /// Whether the prompt asks for summary-style output
    #[inline]
    pub fn wants_summary(&self) -> bool {
        let prompt = self.prompt.to_lowercase();
        SUMMARY_MARKERS.iter().any(|marker| prompt.contains(marker))
    }
}

/// Front door to the generation backend.
///
/// A request walks exact cache, then semantic cache (when configured), then
/// the backend under the retry policy. Successful answers populate both
/// caches. The public entry point always yields a string. Right after a
/// failed warm-up, cache misses fail fast instead of retrying again.
pub struct GenerationClient {
    config: GenerationConfig,
    transport: Box<dyn GenerationTransport>,
    retry: RetryPolicy,
    observer: Arc<dyn RetryObserver>,
    exact_cache: Mutex<ResponseCache>,
    semantic_cache: Option<SemanticCache>,
    warmed_up: AtomicBool,
    warm_up_failed_at: Mutex<Option<Instant>>,
}

impl std::fmt::Debug for GenerationClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationClient")
            .field("model", &self.config.model)
            .field("retry", &self.retry)
            .field("semantic_cache", &self.semantic_cache.is_some())
            .field("warmed_up", &self.warmed_up)
            .finish_non_exhaustive()
    }
}

impl GenerationClient {
    #[inline]
    pub fn new(config: GenerationConfig, transport: impl GenerationTransport + 'static) -> Self {
        Self {
            retry: RetryPolicy::from_config(&config),
            config,
            transport: Box::new(transport),
            observer: Arc::new(TracingObserver),
            exact_cache: Mutex::new(ResponseCache::default()),
            semantic_cache: None,
            warmed_up: AtomicBool::new(false),
            warm_up_failed_at: Mutex::new(None),
        }
    }

    /// Build an Ollama-backed client; opens the semantic cache when enabled
    #[inline]
    pub fn from_config(config: &Config, embedder: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        let transport = OllamaTransport::from_config(config)?;
        let mut client = Self::new(config.generation.clone(), transport);

        if config.generation.semantic_cache {
            let cache = SemanticCache::open(config.semantic_cache_path(), embedder)?
                .with_max_distance(config.generation.semantic_cache_max_distance);
            info!("Semantic cache enabled");
            client = client.with_semantic_cache(cache);
        }

        Ok(client)
    }

    #[inline]
    #[must_use]
    pub fn with_semantic_cache(mut self, cache: SemanticCache) -> Self {
        self.semantic_cache = Some(cache);
        self
    }

    #[inline]
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn RetryObserver>) -> Self {
        self.observer = observer;
        self
    }

    #[inline]
    pub fn is_warmed_up(&self) -> bool {
        self.warmed_up.load(Ordering::Acquire)
    }

    /// Number of answers held by the exact cache
    #[inline]
    pub async fn cached_responses(&self) -> usize {
        self.exact_cache.lock().await.len()
    }

    /// Generate an answer. Failures come back as [`BACKEND_UNAVAILABLE_MESSAGE`].
    #[inline]
    pub async fn generate(&self, prompt: &str, system: &str) -> String {
        match self.try_generate(prompt, system).await {
            Ok(text) => text,
            Err(e) => {
                warn!("Generation failed: {}", e);
                BACKEND_UNAVAILABLE_MESSAGE.to_string()
            }
        }
    }

    /// Like [`generate`](Self::generate), but exhaustion surfaces as
    /// [`RagError::BackendUnavailable`]
    #[inline]
    pub async fn try_generate(&self, prompt: &str, system: &str) -> Result<String> {
        let key = prompt_key(system, prompt);

        let cached = self.exact_cache.lock().await.get(&key).map(str::to_string);
        if let Some(cached) = cached {
            debug!("Using cached response (exact match)");
            return Ok(cached);
        }

        if let Some(cache) = &self.semantic_cache {
            if let Some(answer) = cache.lookup(prompt).await {
                debug!("Using cached response (semantic match)");
                return Ok(answer);
            }
        }

        if self.warm_up_failed_recently().await {
            return Err(RagError::BackendUnavailable(
                "warm-up failed moments ago".to_string(),
            ));
        }

        let request = GenerationRequest::new(system, prompt);
        let text = self.call_backend(&request).await?;

        self.exact_cache.lock().await.insert(key, text.clone());
        if let Some(cache) = &self.semantic_cache {
            cache.store(prompt, &text).await;
        }

        Ok(text)
    }

    /// Run one generation end to end so the backend loads its model.
    ///
    /// Bypasses both caches so the warm-up answer is never served to a
    /// real query. Failure is logged and reported as `false`.
    #[inline]
    pub async fn warm_up(&self) -> bool {
        if self.is_warmed_up() {
            return true;
        }

        info!("Warming up {} model...", self.config.model);
        match self
            .call_backend(&GenerationRequest::new("", WARM_UP_PROMPT))
            .await
        {
            Ok(_) => {
                self.warmed_up.store(true, Ordering::Release);
                *self.warm_up_failed_at.lock().await = None;
                info!("Model warm-up complete");
                true
            }
            Err(e) => {
                warn!("Warm-up failed: {}", e);
                *self.warm_up_failed_at.lock().await = Some(Instant::now());
                false
            }
        }
    }

    /// Forget every cached answer, including the persisted semantic cache
    #[inline]
    pub async fn clear_caches(&self) -> Result<()> {
        self.exact_cache.lock().await.clear();
        if let Some(cache) = &self.semantic_cache {
            cache.clear().await?;
        }
        info!("Response caches cleared");
        Ok(())
    }

    /// Release the backend connection. Safe to call at any time.
    #[inline]
    pub async fn shutdown(&self) {
        self.transport.shutdown().await;
    }

    /// Backend payload for `request`: the token budget widens for summaries
    #[inline]
    pub fn payload(&self, request: &GenerationRequest) -> GeneratePayload {
        let num_predict = if request.wants_summary() {
            self.config.summary_token_budget
        } else {
            self.config.query_token_budget
        };
        let temperature = self.config.temperature;

        GeneratePayload {
            model: self.config.model.clone(),
            prompt: request.full_prompt(),
            stream: true,
            num_predict,
            temperature,
            options: SamplingOptions {
                num_predict,
                temperature,
            },
        }
    }

    async fn warm_up_failed_recently(&self) -> bool {
        let failed_at = *self.warm_up_failed_at.lock().await;
        failed_at.is_some_and(|at| at.elapsed() < WARM_UP_FAILURE_WINDOW)
    }

    async fn call_backend(&self, request: &GenerationRequest) -> Result<String> {
        let payload = self.payload(request);
        let transport = self.transport.as_ref();
        let payload = &payload;

        self.retry
            .run(self.observer.as_ref(), move |attempt| async move {
                debug!("Generation attempt {}", attempt);
                let lines = transport.open_stream(payload).await?;
                aggregate_stream(lines).await
            })
            .await
            .map_err(|e| match e {
                RagError::BackendUnavailable(_) => e,
                other => RagError::BackendUnavailable(other.to_string()),
            })
    }
}
