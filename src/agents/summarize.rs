use std::sync::Arc;
use tracing::debug;

use crate::generation::GenerationClient;

pub const SUMMARY_FAILED_MESSAGE: &str =
    "I apologize, but I couldn't generate a summary. Please try again.";

/// How long a summary the request asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryLength {
    Brief,
    Moderate,
    Detailed,
}

impl SummaryLength {
    /// Pick the tier from keywords in the request; moderate when none match
    #[inline]
    pub fn from_request(request: &str) -> Self {
        let request = request.to_lowercase();
        if request.contains("brief") || request.contains("short") {
            Self::Brief
        } else if request.contains("detailed") || request.contains("comprehensive") {
            Self::Detailed
        } else {
            Self::Moderate
        }
    }

    /// Characters of document text given to the model
    #[inline]
    pub fn max_chars(self) -> usize {
        match self {
            Self::Brief => 3000,
            Self::Moderate => 5000,
            Self::Detailed => 8000,
        }
    }

    #[inline]
    pub fn description(self) -> &'static str {
        match self {
            Self::Brief => "brief (3-4 sentences)",
            Self::Moderate => "moderate (1-2 paragraphs)",
            Self::Detailed => "detailed and comprehensive",
        }
    }
}

/// Whole-document summaries
#[derive(Debug, Clone)]
pub struct Summarizer {
    generator: Arc<GenerationClient>,
}

impl Summarizer {
    #[inline]
    pub fn new(generator: Arc<GenerationClient>) -> Self {
        Self { generator }
    }

    #[inline]
    pub async fn summarize(&self, request: &str, document_text: &str) -> String {
        let length = SummaryLength::from_request(request);
        debug!("Summarizing with {:?} length", length);

        let (system, prompt) = summary_prompts(length, document_text);
        let response = self.generator.generate(&prompt, &system).await;

        if response.trim().is_empty() {
            SUMMARY_FAILED_MESSAGE.to_string()
        } else {
            response
        }
    }
}

/// System and user prompt for a summary of `document_text`
#[inline]
pub fn summary_prompts(length: SummaryLength, document_text: &str) -> (String, String) {
    let description = length.description();
    let system = format!(
        "You are an expert at creating {} summaries.
Your summaries should:
1. Capture the main ideas and key points
2. Be written in a clear, engaging style
3. Flow naturally and be easy to read
4. Highlight important themes, characters, or concepts
5. Be coherent and well-structured",
        description
    );
    let prompt = format!(
        "Please provide a {} summary of the following document:\n\n{}\n\nSummary:",
        description,
        truncate_chars(document_text, length.max_chars())
    );
    (system, prompt)
}

/// First `max_chars` characters of `text`, with `...` appended when cut
#[inline]
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => {
            let mut truncated = text.get(..cut).unwrap_or(text).to_string();
            truncated.push_str("...");
            truncated
        }
        None => text.to_string(),
    }
}
