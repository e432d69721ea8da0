// Agents module
// Classifies chat messages and routes them to question answering, summaries or slide outlines

pub mod slides;
pub mod summarize;


use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

use crate::generation::GenerationClient;
use crate::pipeline::{DEFAULT_TOP_K, RetrievalPipeline};
use crate::session::DocumentSession;

pub use slides::{OutlineError, SLIDES_FAILED_MESSAGE, Slide, SlideOutliner, clean_text, parse_slides};
pub use summarize::{SUMMARY_FAILED_MESSAGE, SummaryLength, Summarizer};

pub const NO_DOCUMENT_MESSAGE: &str = "Please upload a document first.";

const SUMMARY_KEYWORDS: [&str; 4] = ["summarize", "overview", "brief", "summary"];
const SLIDE_KEYWORDS: [&str; 4] = ["ppt", "slides", "powerpoint", "presentation"];

/// The kind of work a chat message asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Question,
    Summarize,
    Slides,
}

impl TaskKind {
    /// Name reported back to the user
    #[inline]
    pub fn agent_name(self) -> &'static str {
        match self {
            Self::Question => "Q&A Agent",
            Self::Summarize => "Summarization Agent",
            Self::Slides => "Slide Outline Agent",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.agent_name())
    }
}

/// Keyword classification: summary words win over slide words, anything
/// else is a question
#[inline]
pub fn classify(message: &str) -> TaskKind {
    let message = message.to_lowercase();
    if SUMMARY_KEYWORDS.iter().any(|word| message.contains(word)) {
        TaskKind::Summarize
    } else if SLIDE_KEYWORDS.iter().any(|word| message.contains(word)) {
        TaskKind::Slides
    } else {
        TaskKind::Question
    }
}

/// Agent selection from the caller: explicit, or classified from the message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestedAgent {
    #[default]
    Auto,
    Explicit(TaskKind),
}

impl RequestedAgent {
    #[inline]
    pub fn resolve(self, message: &str) -> TaskKind {
        match self {
            Self::Auto => classify(message),
            Self::Explicit(kind) => kind,
        }
    }
}

impl FromStr for RequestedAgent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "qa" | "question" => Ok(Self::Explicit(TaskKind::Question)),
            "summarize" | "summary" => Ok(Self::Explicit(TaskKind::Summarize)),
            "slides" | "ppt" => Ok(Self::Explicit(TaskKind::Slides)),
            other => Err(format!(
                "unknown agent '{}', expected auto, qa, summarize or slides",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentResponse {
    Text(String),
    Slides(Vec<Slide>),
}

impl fmt::Display for AgentResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Slides(slides) => {
                for (i, slide) in slides.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                        writeln!(f)?;
                    }
                    write!(f, "Slide {}: {}", i + 1, slide)?;
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterResponse {
    pub agent_used: TaskKind,
    pub response: AgentResponse,
}

/// Dispatches chat messages to the agent that handles them
#[derive(Debug, Clone)]
pub struct AgentRouter {
    pipeline: RetrievalPipeline,
    summarizer: Summarizer,
    outliner: SlideOutliner,
    top_k: usize,
}

impl AgentRouter {
    #[inline]
    pub fn new(pipeline: RetrievalPipeline, generator: Arc<GenerationClient>) -> Self {
        Self {
            pipeline,
            summarizer: Summarizer::new(Arc::clone(&generator)),
            outliner: SlideOutliner::new(generator),
            top_k: DEFAULT_TOP_K,
        }
    }

    #[inline]
    #[must_use]
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Route `message` against the session's current document
    #[inline]
    pub async fn dispatch(
        &self,
        session: &DocumentSession,
        message: &str,
        requested: RequestedAgent,
    ) -> RouterResponse {
        let agent_used = requested.resolve(message);

        let Some(document_text) = session.document_text() else {
            return RouterResponse {
                agent_used,
                response: AgentResponse::Text(NO_DOCUMENT_MESSAGE.to_string()),
            };
        };

        info!("Routing message to {}", agent_used);
        let response = match agent_used {
            TaskKind::Question => {
                AgentResponse::Text(self.pipeline.answer(message, self.top_k).await)
            }
            TaskKind::Summarize => {
                AgentResponse::Text(self.summarizer.summarize(message, document_text).await)
            }
            TaskKind::Slides => match self.outliner.outline(message, document_text).await {
                Ok(slides) if !slides.is_empty() => AgentResponse::Slides(slides),
                _ => AgentResponse::Text(SLIDES_FAILED_MESSAGE.to_string()),
            },
        };

        RouterResponse {
            agent_used,
            response,
        }
    }
}
