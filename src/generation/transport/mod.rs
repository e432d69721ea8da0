#[cfg(test)]
mod tests;

use async_trait::async_trait;
use futures::{Stream, StreamExt, TryStreamExt, stream};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::time::Duration;
use tokio::io::AsyncBufReadExt;
use tokio::sync::Mutex;
use tokio_util::io::StreamReader;
use tracing::{debug, info};
use url::Url;

use crate::config::Config;
use crate::{RagError, Result};

/// Raw newline-delimited lines of a streamed generation response
pub type LineStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Body of a streaming `/api/generate` call
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GeneratePayload {
    pub model: String,
    pub prompt: String,
    pub stream: bool,
    pub num_predict: u32,
    pub temperature: f32,
    /// Ollama reads sampling parameters from here
    pub options: SamplingOptions,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct SamplingOptions {
    pub num_predict: u32,
    pub temperature: f32,
}

/// One line of the streamed response
#[derive(Debug, Deserialize)]
struct StreamFragment {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

/// The network leg of generation: send a payload, get back its response lines
#[async_trait]
pub trait GenerationTransport: Send + Sync {
    async fn open_stream(&self, payload: &GeneratePayload) -> Result<LineStream>;

    /// Release any held connection. Must be safe when nothing was opened.
    async fn shutdown(&self) {}
}

/// Concatenate the `response` field of every fragment.
///
/// Blank and unparseable lines are skipped. A transport error, an `error`
/// fragment, or an empty total is a failure.
#[inline]
pub async fn aggregate_stream(mut lines: LineStream) -> Result<String> {
    let mut text = String::new();
    let mut skipped = 0_usize;

    while let Some(line) = lines.next().await {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let fragment: StreamFragment = match serde_json::from_str(line) {
            Ok(fragment) => fragment,
            Err(e) => {
                skipped += 1;
                debug!(
                    "{}",
                    RagError::MalformedStreamFragment(format!("{} in {:?}", e, line))
                );
                continue;
            }
        };

        if let Some(error) = fragment.error {
            return Err(RagError::BackendUnavailable(error));
        }

        text.push_str(&fragment.response);
        if fragment.done {
            break;
        }
    }

    if skipped > 0 {
        debug!("Skipped {} malformed stream fragments", skipped);
    }

    let text = text.trim();
    if text.is_empty() {
        return Err(RagError::BackendUnavailable(
            "empty response from generation stream".to_string(),
        ));
    }
    Ok(text.to_string())
}

/// Streaming client for Ollama's `/api/generate`.
///
/// The HTTP client is created on first use and then shared by every call;
/// creation happens under a lock so concurrent first callers still build
/// exactly one.
#[derive(Debug)]
pub struct OllamaTransport {
    endpoint: Url,
    timeout: Duration,
    client: Mutex<Option<reqwest::Client>>,
}

impl OllamaTransport {
    #[inline]
    pub fn new(base_url: &Url, timeout: Duration) -> Result<Self> {
        let endpoint = base_url
            .join("/api/generate")
            .map_err(|e| RagError::Config(format!("Failed to build generate URL: {}", e)))?;

        Ok(Self {
            endpoint,
            timeout,
            client: Mutex::new(None),
        })
    }

    #[inline]
    pub fn from_config(config: &Config) -> Result<Self> {
        let base_url = config
            .ollama_url()
            .map_err(|e| RagError::Config(e.to_string()))?;
        Self::new(&base_url, config.generation.request_timeout())
    }

    #[inline]
    pub async fn is_connected(&self) -> bool {
        self.client.lock().await.is_some()
    }

    async fn client(&self) -> Result<reqwest::Client> {
        let mut guard = self.client.lock().await;
        if let Some(client) = guard.as_ref() {
            return Ok(client.clone());
        }

        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| RagError::Network(format!("Failed to build HTTP client: {}", e)))?;
        info!("Opened generation connection to {}", self.endpoint);
        *guard = Some(client.clone());
        Ok(client)
    }
}

#[async_trait]
impl GenerationTransport for OllamaTransport {
    async fn open_stream(&self, payload: &GeneratePayload) -> Result<LineStream> {
        let client = self.client().await?;

        debug!(
            "POST {} (model {}, num_predict {})",
            self.endpoint, payload.model, payload.num_predict
        );

        let response = client
            .post(self.endpoint.clone())
            .json(payload)
            .send()
            .await
            .map_err(|e| RagError::Network(e.to_string()))?
            .error_for_status()
            .map_err(|e| RagError::BackendUnavailable(e.to_string()))?;

        let body = Box::pin(response.bytes_stream().map_err(std::io::Error::other));
        let lines = StreamReader::new(body).lines();

        // a read error ends the stream after being reported once
        let stream = stream::unfold(Some(lines), |state| async move {
            let mut lines = state?;
            match lines.next_line().await {
                Ok(Some(line)) => Some((Ok(line), Some(lines))),
                Ok(None) => None,
                Err(e) => Some((Err(RagError::Network(e.to_string())), None)),
            }
        });

        Ok(Box::pin(stream))
    }

    async fn shutdown(&self) {
        let previous = self.client.lock().await.take();
        if previous.is_some() {
            info!("Closed generation connection to {}", self.endpoint);
        }
    }
}
