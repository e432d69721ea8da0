// Test doubles shared by unit tests

use async_trait::async_trait;
use futures::stream;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::embeddings::{EmbeddingProvider, HashingEmbedder, Vector};
use crate::generation::{GeneratePayload, GenerationTransport, LineStream};
use crate::{RagError, Result};

/// One scripted backend reply
#[derive(Debug, Clone)]
pub(crate) enum Reply {
    Lines(Vec<String>),
    Fail(String),
}

impl Reply {
    /// A well-formed two-fragment stream spelling `text`
    pub(crate) fn text(text: &str) -> Self {
        Self::Lines(vec![
            serde_json::json!({ "response": text, "done": false }).to_string(),
            serde_json::json!({ "response": "", "done": true }).to_string(),
        ])
    }
}

/// Shared view of what a [`ScriptedTransport`] saw
#[derive(Debug, Clone, Default)]
pub(crate) struct TransportProbe {
    calls: Arc<AtomicUsize>,
    shutdowns: Arc<AtomicUsize>,
    payloads: Arc<Mutex<Vec<GeneratePayload>>>,
}

impl TransportProbe {
    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }

    pub(crate) fn last_payload(&self) -> Option<GeneratePayload> {
        self.payloads.lock().expect("payload lock").last().cloned()
    }
}

/// Transport that replays scripted replies, then repeats `fallback`
#[derive(Debug)]
pub(crate) struct ScriptedTransport {
    replies: Mutex<VecDeque<Reply>>,
    fallback: Reply,
    probe: TransportProbe,
}

impl ScriptedTransport {
    pub(crate) fn answering(text: &str) -> Self {
        Self::with_replies(Vec::new(), Reply::text(text))
    }

    pub(crate) fn failing() -> Self {
        Self::with_replies(Vec::new(), Reply::Fail("connection refused".to_string()))
    }

    pub(crate) fn with_replies(replies: Vec<Reply>, fallback: Reply) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            fallback,
            probe: TransportProbe::default(),
        }
    }

    pub(crate) fn probe(&self) -> TransportProbe {
        self.probe.clone()
    }
}

#[async_trait]
impl GenerationTransport for ScriptedTransport {
    async fn open_stream(&self, payload: &GeneratePayload) -> Result<LineStream> {
        self.probe.calls.fetch_add(1, Ordering::SeqCst);
        self.probe
            .payloads
            .lock()
            .expect("payload lock")
            .push(payload.clone());

        let reply = self
            .replies
            .lock()
            .expect("reply lock")
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        match reply {
            Reply::Lines(lines) => {
                let items: Vec<Result<String>> = lines.into_iter().map(Ok).collect();
                Ok(Box::pin(stream::iter(items)))
            }
            Reply::Fail(message) => Err(RagError::Network(message)),
        }
    }

    async fn shutdown(&self) {
        self.probe.shutdowns.fetch_add(1, Ordering::SeqCst);
    }
}

/// Hashing embedder that counts calls and can be switched to fail
#[derive(Debug)]
pub(crate) struct CountingEmbedder {
    inner: HashingEmbedder,
    calls: AtomicUsize,
    fail: bool,
}

impl CountingEmbedder {
    pub(crate) fn new(dimension: usize) -> Self {
        Self {
            inner: HashingEmbedder::new(dimension),
            calls: AtomicUsize::new(0),
            fail: false,
        }
    }

    pub(crate) fn failing(dimension: usize) -> Self {
        Self {
            fail: true,
            ..Self::new(dimension)
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl EmbeddingProvider for CountingEmbedder {
    fn embed(&self, texts: &[String]) -> Result<Vec<Vector>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(RagError::Embedding("embedding model unavailable".to_string()));
        }
        self.inner.embed(texts)
    }

    fn dimension(&self) -> Option<usize> {
        self.inner.dimension()
    }
}

/// Embedder with a fixed text-to-vector table; unknown text maps to `fallback`
#[derive(Debug)]
pub(crate) struct LookupEmbedder {
    table: HashMap<String, Vector>,
    fallback: Vector,
}

impl LookupEmbedder {
    pub(crate) fn new(entries: &[(&str, Vector)], fallback: Vector) -> Self {
        Self {
            table: entries
                .iter()
                .map(|(text, vector)| ((*text).to_string(), vector.clone()))
                .collect(),
            fallback,
        }
    }
}

impl EmbeddingProvider for LookupEmbedder {
    fn embed(&self, texts: &[String]) -> Result<Vec<Vector>> {
        Ok(texts
            .iter()
            .map(|text| {
                self.table
                    .get(text)
                    .cloned()
                    .unwrap_or_else(|| self.fallback.clone())
            })
            .collect())
    }

    fn dimension(&self) -> Option<usize> {
        Some(self.fallback.len())
    }
}

/// One-hot vector along `axis`
pub(crate) fn unit(dimension: usize, axis: usize) -> Vector {
    let mut vector = vec![0.0; dimension];
    vector[axis] = 1.0;
    vector
}
