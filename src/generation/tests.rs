use super::*;
use crate::embeddings::{HashingEmbedder, Vector};
use crate::testing::{CountingEmbedder, Reply, ScriptedTransport};
use std::sync::atomic::AtomicUsize;
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::MissedTickBehavior;

fn fast_config() -> GenerationConfig {
    GenerationConfig {
        retry_delay_ms: 1,
        ..GenerationConfig::default()
    }
}

fn client_with(transport: ScriptedTransport) -> GenerationClient {
    GenerationClient::new(fast_config(), transport)
}

#[test]
fn full_prompt_layout() {
    let request = GenerationRequest::new("Be brief.", "What is RAG?");
    assert_eq!(request.full_prompt(), "Be brief.\n\nUser Query:\nWhat is RAG?");

    let bare = GenerationRequest::new("", "Hello");
    assert_eq!(bare.full_prompt(), "User Query:\nHello");
}

#[test]
fn token_budget_widens_for_summaries() {
    let client = client_with(ScriptedTransport::answering("ok"));

    let question = client.payload(&GenerationRequest::new("", "What is the deadline?"));
    assert_eq!(question.num_predict, 16);
    assert_eq!(question.options.num_predict, 16);
    assert!((question.temperature - 0.3).abs() < f32::EPSILON);
    assert!(question.stream);

    let summary = client.payload(&GenerationRequest::new("", "Please SUMMARIZE the report"));
    assert_eq!(summary.num_predict, 64);
}

#[tokio::test]
async fn successful_generation() {
    let transport = ScriptedTransport::answering("  Paris is the capital.  ");
    let probe = transport.probe();
    let client = client_with(transport);

    let answer = client.generate("Capital of France?", "Answer briefly.").await;

    assert_eq!(answer, "Paris is the capital.");
    assert_eq!(probe.calls(), 1);
    let payload = probe.last_payload().expect("payload recorded");
    assert_eq!(payload.model, "gemma2:2b");
    assert!(payload.prompt.contains("Capital of France?"));
}

#[tokio::test]
async fn exact_cache_prevents_second_backend_call() {
    let transport = ScriptedTransport::answering("cached answer");
    let probe = transport.probe();
    let client = client_with(transport);

    let first = client.generate("same prompt", "same system").await;
    let second = client.generate("same prompt", "same system").await;

    assert_eq!(first, second);
    assert_eq!(probe.calls(), 1);
    assert_eq!(client.cached_responses().await, 1);

    client.generate("same prompt", "different system").await;
    assert_eq!(probe.calls(), 2);
}

#[tokio::test]
async fn retries_then_succeeds() {
    let transport = ScriptedTransport::with_replies(
        vec![
            Reply::Fail("connection refused".to_string()),
            Reply::Lines(vec!["{broken".to_string(), String::new()]),
        ],
        Reply::text("third time lucky"),
    );
    let probe = transport.probe();
    let client = client_with(transport);

    let answer = client.generate("question", "").await;

    assert_eq!(answer, "third time lucky");
    assert_eq!(probe.calls(), 3);
}

#[tokio::test]
async fn exhaustion_returns_fixed_message() {
    let transport = ScriptedTransport::failing();
    let probe = transport.probe();
    let client = client_with(transport);

    let answer = client.generate("question", "system").await;

    assert_eq!(answer, BACKEND_UNAVAILABLE_MESSAGE);
    assert_eq!(probe.calls(), 3);
    assert_eq!(client.cached_responses().await, 0);
}

#[tokio::test]
async fn try_generate_surfaces_backend_unavailable() {
    let client = client_with(ScriptedTransport::failing()).with_retry_policy(RetryPolicy {
        max_attempts: 2,
        delay: Duration::from_millis(1),
    });

    assert!(matches!(
        client.try_generate("question", "").await,
        Err(RagError::BackendUnavailable(_))
    ));
}

#[tokio::test]
async fn empty_stream_counts_as_failure() {
    let transport = ScriptedTransport::with_replies(
        Vec::new(),
        Reply::Lines(vec![r#"{"response":"","done":true}"#.to_string()]),
    );
    let probe = transport.probe();
    let client = client_with(transport);

    assert_eq!(client.generate("q", "").await, BACKEND_UNAVAILABLE_MESSAGE);
    assert_eq!(probe.calls(), 3);
}

#[tokio::test]
async fn semantic_cache_serves_similar_prompt() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let embedder = Arc::new(CountingEmbedder::new(64));
    let cache = SemanticCache::open(temp_dir.path(), embedder.clone())
        .expect("should open cache")
        .with_max_distance(Some(0.5));

    let transport = ScriptedTransport::answering("Rust is a language.");
    let probe = transport.probe();
    let client = client_with(transport).with_semantic_cache(cache);

    let first = client.generate("what is rust", "system A").await;
    let second = client.generate("what is rust", "system B").await;

    assert_eq!(first, "Rust is a language.");
    assert_eq!(second, first);
    assert_eq!(probe.calls(), 1);
    assert!(embedder.calls() >= 2);
}

#[tokio::test]
async fn semantic_cache_faults_do_not_break_generation() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    {
        let seeded = SemanticCache::open(temp_dir.path(), Arc::new(CountingEmbedder::new(8)))
            .expect("should open cache");
        seeded.store("seed prompt", "seed answer").await;
    }

    let embedder = Arc::new(CountingEmbedder::failing(8));
    let cache = SemanticCache::open(temp_dir.path(), embedder.clone()).expect("should open cache");
    let transport = ScriptedTransport::answering("fresh answer");
    let probe = transport.probe();
    let client = client_with(transport).with_semantic_cache(cache);

    let answer = client.generate("seed prompt", "").await;

    assert_eq!(answer, "fresh answer");
    assert_eq!(probe.calls(), 1);
    // one failed lookup, one failed store
    assert_eq!(embedder.calls(), 2);
}

#[tokio::test]
async fn exact_cache_hit_skips_embedding() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let embedder = Arc::new(CountingEmbedder::new(16));
    let cache = SemanticCache::open(temp_dir.path(), embedder.clone()).expect("should open cache");
    let client = client_with(ScriptedTransport::answering("answer")).with_semantic_cache(cache);

    client.generate("prompt", "").await;
    let calls_after_first = embedder.calls();
    client.generate("prompt", "").await;

    assert_eq!(embedder.calls(), calls_after_first);
}

#[tokio::test]
async fn warm_up_bypasses_caches() {
    let transport = ScriptedTransport::answering("hello there");
    let probe = transport.probe();
    let client = client_with(transport);

    assert!(!client.is_warmed_up());
    assert!(client.warm_up().await);
    assert!(client.is_warmed_up());
    assert_eq!(client.cached_responses().await, 0);

    assert!(client.warm_up().await);
    assert_eq!(probe.calls(), 1);
}

#[tokio::test]
async fn warm_up_failure_is_not_fatal() {
    let client = client_with(ScriptedTransport::failing());

    assert!(!client.warm_up().await);
    assert!(!client.is_warmed_up());
}

#[tokio::test]
async fn failed_warm_up_skips_second_retry_cycle() {
    let transport = ScriptedTransport::failing();
    let probe = transport.probe();
    let client = client_with(transport);

    assert!(!client.warm_up().await);
    assert_eq!(probe.calls(), 3);

    let answer = client.generate("What is the deadline?", "").await;

    assert_eq!(answer, BACKEND_UNAVAILABLE_MESSAGE);
    assert_eq!(probe.calls(), 3);
}

#[tokio::test]
async fn successful_warm_up_clears_earlier_failure() {
    let fail = Reply::Fail("connection refused".to_string());
    let transport = ScriptedTransport::with_replies(
        vec![fail.clone(), fail.clone(), fail],
        Reply::text("ready"),
    );
    let probe = transport.probe();
    let client = client_with(transport);

    assert!(!client.warm_up().await);
    assert!(client.warm_up().await);

    assert_eq!(client.generate("question", "").await, "ready");
    assert_eq!(probe.calls(), 5);
}

#[tokio::test]
async fn shutdown_delegates_to_transport() {
    let transport = ScriptedTransport::answering("x");
    let probe = transport.probe();
    let client = client_with(transport);

    client.shutdown().await;
    client.shutdown().await;
    assert_eq!(probe.shutdowns(), 2);
}

#[tokio::test]
async fn custom_observer_receives_events() {
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct Collector(StdMutex<Vec<RetryEvent>>);

    impl RetryObserver for Collector {
        fn on_event(&self, event: &RetryEvent) {
            self.0.lock().expect("lock").push(event.clone());
        }
    }

    let collector = Arc::new(Collector::default());
    let client = client_with(ScriptedTransport::failing()).with_observer(collector.clone());

    client.generate("q", "").await;

    let events = collector.0.lock().expect("lock");
    assert_eq!(events.len(), 4);
    assert!(matches!(events[3], RetryEvent::Exhausted { attempts: 3, .. }));
}

#[tokio::test]
async fn clear_caches_forces_backend_call() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let cache = SemanticCache::open(temp_dir.path(), Arc::new(CountingEmbedder::new(16)))
        .expect("should open cache");
    let transport = ScriptedTransport::answering("answer");
    let probe = transport.probe();
    let client = client_with(transport).with_semantic_cache(cache);

    client.generate("prompt", "").await;
    client.clear_caches().await.expect("should clear");
    assert_eq!(client.cached_responses().await, 0);

    client.generate("prompt", "").await;
    assert_eq!(probe.calls(), 2);
}

/// Embedder that blocks its thread the way a synchronous HTTP client does
struct SlowEmbedder {
    inner: HashingEmbedder,
    delay: Duration,
}

impl EmbeddingProvider for SlowEmbedder {
    fn embed(&self, texts: &[String]) -> Result<Vec<Vector>> {
        std::thread::sleep(self.delay);
        self.inner.embed(texts)
    }

    fn dimension(&self) -> Option<usize> {
        self.inner.dimension()
    }
}

#[tokio::test(flavor = "current_thread")]
async fn semantic_cache_embedding_keeps_runtime_responsive() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let embedder = Arc::new(SlowEmbedder {
        inner: HashingEmbedder::new(16),
        delay: Duration::from_millis(200),
    });
    let cache = SemanticCache::open(temp_dir.path(), embedder).expect("should open cache");
    let client = client_with(ScriptedTransport::answering("answer")).with_semantic_cache(cache);

    let ticks = Arc::new(AtomicUsize::new(0));
    let ticker = tokio::spawn({
        let ticks = Arc::clone(&ticks);
        async move {
            let mut interval = tokio::time::interval(Duration::from_millis(10));
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                ticks.fetch_add(1, Ordering::SeqCst);
            }
        }
    });

    // first call stores, second looks up; each embeds for 200ms
    assert_eq!(client.generate("first prompt", "").await, "answer");
    assert_eq!(client.generate("second prompt", "").await, "answer");
    let observed = ticks.load(Ordering::SeqCst);
    ticker.abort();

    assert!(
        observed >= 10,
        "runtime stalled while embedding: only {} ticks in ~400ms",
        observed
    );
}
