//! Cleaning and chunking of extracted document text.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::config::RagSettings;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitterConfig {
    /// Maximum chunk size in characters
    pub chunk_size: usize,
    /// Characters shared by consecutive chunks
    pub chunk_overlap: usize,
    /// Hard cap on chunks produced per document
    pub max_chunks: usize,
}

impl From<&RagSettings> for SplitterConfig {
    fn from(settings: &RagSettings) -> Self {
        Self {
            chunk_size: settings.chunk_size,
            chunk_overlap: settings.chunk_overlap,
            max_chunks: settings.max_chunks,
        }
    }
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self::from(&RagSettings::default())
    }
}

/// A text fragment with its position in the split sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextChunk {
    pub text: String,
    pub chunk_index: usize,
    /// Character offset in the cleaned document
    pub start_offset: usize,
}

/// Trims every line, collapses runs of spaces and tabs, and drops empty lines.
pub fn clean_text(text: &str) -> String {
    static SPACES: OnceLock<Regex> = OnceLock::new();
    let spaces = SPACES.get_or_init(|| Regex::new(r"[ \t\u{00A0}]+").expect("valid regex"));

    text.lines()
        .map(|line| spaces.replace_all(line.trim(), " ").into_owned())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Chunks of one document. `truncated` is set when `max_chunks` stopped the
/// split before the end of the text.
#[derive(Debug, Clone, Default)]
pub struct SplitOutput {
    pub chunks: Vec<TextChunk>,
    pub truncated: bool,
}

pub struct TextSplitter {
    config: SplitterConfig,
}

impl TextSplitter {
    pub fn new(config: SplitterConfig) -> Self {
        Self { config }
    }

    /// Split text into overlapping chunks, cutting at a sentence end when one
    /// falls in the last fifth of a window.
    pub fn split(&self, text: &str) -> SplitOutput {
        let chunk_size = self.config.chunk_size.max(1);
        let step = chunk_size.saturating_sub(self.config.chunk_overlap).max(1);

        let chars: Vec<char> = text.chars().collect();
        let total_chars = chars.len();
        let mut chunks = Vec::new();
        let mut start = 0;
        let mut truncated = false;

        while start < total_chars {
            if chunks.len() >= self.config.max_chunks {
                truncated = chars[start..].iter().any(|c| !c.is_whitespace());
                break;
            }

            let end = (start + chunk_size).min(total_chars);
            let window: String = chars[start..end].iter().collect();

            let (chunk_text, consumed) = if end < total_chars {
                let cut = sentence_boundary(&window);
                (window[..cut].to_string(), window[..cut].chars().count())
            } else {
                let len = end - start;
                (window, len)
            };

            let trimmed = chunk_text.trim();
            if !trimmed.is_empty() {
                chunks.push(TextChunk {
                    text: trimmed.to_string(),
                    chunk_index: chunks.len(),
                    start_offset: start,
                });
            }

            if end == total_chars {
                break;
            }
            // Never step past what the chunk actually covered.
            start += step.min(consumed).max(1);
        }

        SplitOutput { chunks, truncated }
    }
}

/// Byte index just after the last sentence ending in the final 20% of
/// `text`, or `text.len()` when there is none.
fn sentence_boundary(text: &str) -> usize {
    const ENDINGS: [&str; 6] = [". ", "! ", "? ", ".\n", "!\n", "?\n"];

    let mut search_start = (text.len() * 80) / 100;
    while !text.is_char_boundary(search_start) {
        search_start += 1;
    }
    let tail = &text[search_start..];

    ENDINGS
        .iter()
        .filter_map(|ending| tail.rfind(ending).map(|pos| pos + ending.len()))
        .max()
        .map(|cut| search_start + cut)
        .unwrap_or(text.len())
}
