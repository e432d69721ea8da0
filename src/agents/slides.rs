use fancy_regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::sync::LazyLock;
use thiserror::Error;
use tracing::{debug, warn};

use crate::generation::GenerationClient;

pub const SLIDE_COUNT: usize = 3;
pub const SLIDES_FAILED_MESSAGE: &str = "Failed to generate 3 slides. Try again.";

const DOCUMENT_EXCERPT_CHARS: usize = 3000;
const MAX_TITLE_CHARS: usize = 55;
const MAX_BULLETS: usize = 4;

const OUTLINE_SYSTEM_PROMPT: &str = "Create exactly 3 slides. Format strictly as:

SLIDE 1
Title (max 7 words)
Line 1 (around 12 words)
Line 2 (around 12 words)
Line 3 (around 12 words)

SLIDE 2
Title (max 7 words)
Line 1 (around 12 words)
Line 2 (around 12 words)
Line 3 (around 12 words)

SLIDE 3
Title (max 7 words)
Line 1 (around 12 words)
Line 2 (around 12 words)
Line 3 (around 12 words)

NO markdown, NO symbols, NO dashes. Just plain text.
SLIDE 1 must introduce what the document is about with an apt title.
Each line must be concise (around 12 words).
Slide 2 and 3 should summarize other key topics or insights from the document with apt titles.
Keep the output clean, short, and fast to generate.";

static SLIDE_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)SLIDE\s+\d+").expect("valid regex"));
static HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^#{1,6}\s*").expect("valid regex"));
static MARKDOWN_SYMBOLS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[*#`_~]+").expect("valid regex"));
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));
static BULLET_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[-*•]\s*").expect("valid regex"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Slide {
    pub title: String,
    pub bullets: Vec<String>,
}

impl fmt::Display for Slide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.title)?;
        for bullet in &self.bullets {
            write!(f, "\n  • {}", bullet)?;
        }
        Ok(())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OutlineError {
    #[error("Expected 3 slides, model produced {found}")]
    TooFewSlides { found: usize },
}

/// Three-slide outlines of the current document
#[derive(Debug, Clone)]
pub struct SlideOutliner {
    generator: Arc<GenerationClient>,
}

impl SlideOutliner {
    #[inline]
    pub fn new(generator: Arc<GenerationClient>) -> Self {
        Self { generator }
    }

    #[inline]
    pub async fn outline(
        &self,
        request: &str,
        document_text: &str,
    ) -> Result<Vec<Slide>, OutlineError> {
        let excerpt: String = document_text.chars().take(DOCUMENT_EXCERPT_CHARS).collect();
        let prompt = format!("{}\n\nDocument:\n{}", request, excerpt);

        let response = self.generator.generate(&prompt, OUTLINE_SYSTEM_PROMPT).await;
        let slides = parse_slides(&response);
        if let Err(e) = &slides {
            warn!("Slide outline rejected: {}", e);
        }
        slides
    }
}

/// Parse `SLIDE n` blocks out of a model response.
///
/// The first line of a block is the title, the next lines are bullets.
/// Blocks without a title and at least one bullet are dropped.
#[inline]
pub fn parse_slides(response: &str) -> Result<Vec<Slide>, OutlineError> {
    let blocks = slide_blocks(response);
    if blocks.len() < SLIDE_COUNT {
        return Err(OutlineError::TooFewSlides {
            found: blocks.len(),
        });
    }

    let slides: Vec<Slide> = blocks
        .into_iter()
        .take(SLIDE_COUNT)
        .filter_map(parse_block)
        .collect();
    debug!("Parsed {} slides", slides.len());
    Ok(slides)
}

fn slide_blocks(response: &str) -> Vec<&str> {
    let starts: Vec<(usize, usize)> = SLIDE_MARKER
        .find_iter(response)
        .flatten()
        .map(|m| (m.start(), m.end()))
        .collect();

    starts
        .iter()
        .enumerate()
        .filter_map(|(i, &(_, body_start))| {
            let body_end = starts.get(i + 1).map_or(response.len(), |&(next, _)| next);
            response.get(body_start..body_end)
        })
        .map(str::trim)
        .filter(|block| !block.is_empty())
        .collect()
}

fn parse_block(block: &str) -> Option<Slide> {
    let mut lines = block
        .lines()
        .map(clean_text)
        .filter(|line| !line.is_empty());

    let title: String = lines.next()?.chars().take(MAX_TITLE_CHARS).collect();
    let bullets: Vec<String> = lines.take(MAX_BULLETS).collect();
    if bullets.is_empty() {
        return None;
    }

    Some(Slide { title, bullets })
}

/// Strip markdown headings, emphasis symbols and bullet markers
#[inline]
pub fn clean_text(text: &str) -> String {
    let text = HEADING.replace_all(text, "");
    let text = MARKDOWN_SYMBOLS.replace_all(&text, "");
    let text = WHITESPACE.replace_all(&text, " ");
    let text = BULLET_PREFIX.replace_all(text.trim(), "");
    text.trim().to_string()
}
