//! Overlapping character windows over a document.
//!
//! A window never exceeds `chunk_size` characters. Inside the back half of a
//! window the cut prefers a paragraph break, then a line break, then a
//! sentence end, then any whitespace. The next window starts `chunk_overlap`
//! characters before the previous cut.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::loader::{Document, FileType};
use crate::core::errors::RagError;

const BREAKS: [&[char]; 5] = [
    &['\n', '\n'],
    &['\n'],
    &['.', ' '],
    &['!', ' '],
    &['?', ' '],
];

/// A bounded slice of a document, ready for embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: String,
    pub text: String,
    pub source: String,
    pub file_type: FileType,
    /// Position of this chunk within its document
    pub chunk_index: usize,
    /// Character offsets of the trimmed text in the document
    pub start_offset: usize,
    pub end_offset: usize,
    pub page: Option<u32>,
    pub row: Option<u64>,
}

impl Chunk {
    /// Human-readable provenance, e.g. `manual.pdf, page 3`.
    pub fn citation(&self) -> String {
        match (self.page, self.row) {
            (Some(page), _) => format!("{}, page {}", self.source, page),
            (None, Some(row)) => format!("{}, row {}", self.source, row + 1),
            (None, None) => self.source.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone)]
pub struct Chunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Chunker {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, RagError> {
        if chunk_size == 0 {
            return Err(RagError::InvalidConfig(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        if chunk_overlap >= chunk_size {
            return Err(RagError::InvalidConfig(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                chunk_overlap, chunk_size
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    pub fn split_document(&self, document: &Document) -> Vec<Chunk> {
        let chars: Vec<char> = document.content.chars().collect();

        self.split_chars(&chars)
            .into_iter()
            .enumerate()
            .map(|(chunk_index, span)| {
                let text: String = chars[span.start..span.end].iter().collect();
                Chunk {
                    chunk_id: chunk_id(document, chunk_index, &text),
                    text,
                    source: document.source.clone(),
                    file_type: document.file_type,
                    chunk_index,
                    start_offset: span.start,
                    end_offset: span.end,
                    page: document.page,
                    row: document.row,
                }
            })
            .collect()
    }

    /// Trimmed spans, in character offsets, covering every non-whitespace character.
    pub fn split_text(&self, text: &str) -> Vec<Span> {
        let chars: Vec<char> = text.chars().collect();
        self.split_chars(&chars)
    }

    fn split_chars(&self, chars: &[char]) -> Vec<Span> {
        let total = chars.len();
        let mut spans = Vec::new();
        let mut start = 0;

        while start < total {
            let window_end = (start + self.chunk_size).min(total);
            let cut = if window_end < total {
                let min_cut = (self.chunk_size / 2).max(self.chunk_overlap + 1);
                find_cut(&chars[start..window_end], min_cut)
                    .map(|offset| start + offset)
                    .unwrap_or(window_end)
            } else {
                window_end
            };

            if let Some(span) = trim_span(chars, start, cut) {
                spans.push(span);
            }

            if cut >= total {
                break;
            }
            start = cut.saturating_sub(self.chunk_overlap).max(start + 1);
        }

        spans
    }
}

/// Offset just past the preferred break, at or after `min_cut`.
fn find_cut(window: &[char], min_cut: usize) -> Option<usize> {
    for pattern in BREAKS {
        if let Some(pos) = rfind(window, pattern) {
            let cut = pos + pattern.len();
            if cut >= min_cut {
                return Some(cut);
            }
        }
    }

    window
        .iter()
        .rposition(|c| c.is_whitespace())
        .map(|pos| pos + 1)
        .filter(|cut| *cut >= min_cut)
}

fn rfind(haystack: &[char], needle: &[char]) -> Option<usize> {
    if needle.len() > haystack.len() {
        return None;
    }
    (0..=haystack.len() - needle.len())
        .rev()
        .find(|&i| &haystack[i..i + needle.len()] == needle)
}

fn trim_span(chars: &[char], start: usize, end: usize) -> Option<Span> {
    let first = (start..end).find(|&i| !chars[i].is_whitespace())?;
    let last = (first..end).rev().find(|&i| !chars[i].is_whitespace())?;
    Some(Span {
        start: first,
        end: last + 1,
    })
}

fn chunk_id(document: &Document, chunk_index: usize, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(document.source.as_bytes());
    hasher.update(b":");
    hasher.update(document.page.map(|p| p.to_string()).unwrap_or_default());
    hasher.update(b":");
    hasher.update(document.row.map(|r| r.to_string()).unwrap_or_default());
    hasher.update(b":");
    hasher.update(chunk_index.to_le_bytes());
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(content: &str) -> Document {
        Document {
            source: "manual.txt".to_string(),
            file_type: FileType::Txt,
            content: content.to_string(),
            page: None,
            row: None,
        }
    }

    fn assert_covers(text: &str, spans: &[Span]) {
        for (i, c) in text.chars().enumerate() {
            if c.is_whitespace() {
                continue;
            }
            assert!(
                spans.iter().any(|s| s.start <= i && i < s.end),
                "character {} ({:?}) not covered",
                i,
                c
            );
        }
    }

    #[test]
    fn rejects_overlap_not_smaller_than_size() {
        assert!(Chunker::new(100, 100).is_err());
        assert!(Chunker::new(0, 0).is_err());
        assert!(Chunker::new(100, 99).is_ok());
    }

    #[test]
    fn short_document_yields_one_chunk() {
        let chunker = Chunker::new(1000, 100).expect("chunker");
        let chunks =
            chunker.split_document(&doc("The Nissan Leaf 40kWh battery holds 40 kilowatt-hours."));

        assert_eq!(chunks.len(), 1);
        assert_eq!(
            chunks[0].text,
            "The Nissan Leaf 40kWh battery holds 40 kilowatt-hours."
        );
        assert_eq!(chunks[0].chunk_index, 0);
    }

    #[test]
    fn blank_document_yields_nothing() {
        let chunker = Chunker::new(50, 10).expect("chunker");
        assert!(chunker.split_document(&doc("   \n\t ")).is_empty());
        assert!(chunker.split_document(&doc("")).is_empty());
    }

    #[test]
    fn chunks_respect_size_and_cover_text() {
        let text = "Check the oil level with the engine off. Top up if below the minimum mark! \
                    Is the coolant warm? Never open the cap when hot.\n\nReplace wiper blades \
                    every year.\nRotate tyres every 10,000 km. "
            .repeat(12);

        for (size, overlap) in [(40, 5), (80, 20), (200, 50), (33, 32)] {
            let chunker = Chunker::new(size, overlap).expect("chunker");
            let spans = chunker.split_text(&text);

            assert!(!spans.is_empty());
            for span in &spans {
                assert!(span.end - span.start <= size, "span exceeds {}", size);
            }
            assert_covers(&text, &spans);
        }
    }

    #[test]
    fn adjacent_windows_overlap_by_configured_amount() {
        let text: String = ('a'..='z').cycle().take(95).collect();
        let chunker = Chunker::new(20, 5).expect("chunker");
        let chunks = chunker.split_document(&doc(&text));

        assert_eq!(chunks[0].start_offset, 0);
        for pair in chunks.windows(2) {
            assert_eq!(pair[0].end_offset - pair[1].start_offset, 5);
            let tail: String = pair[0].text.chars().skip(15).collect();
            assert!(pair[1].text.starts_with(&tail));
        }
        assert_eq!(chunks.last().map(|c| c.end_offset), Some(95));
    }

    #[test]
    fn prefers_sentence_boundaries() {
        let text = "First sentence is here. Second sentence follows it and keeps going on.";
        let chunker = Chunker::new(40, 5).expect("chunker");
        let chunks = chunker.split_document(&doc(text));

        assert_eq!(chunks[0].text, "First sentence is here.");
        assert!(chunks.iter().all(|c| c.text.chars().count() <= 40));
    }

    #[test]
    fn prefers_paragraph_breaks_over_sentences() {
        let text = "Brakes. Pads wear out.\n\nTyres. Check tread depth often and carefully.";
        let chunker = Chunker::new(30, 3).expect("chunker");
        let chunks = chunker.split_document(&doc(text));

        assert_eq!(chunks[0].text, "Brakes. Pads wear out.");
    }

    #[test]
    fn multibyte_text_is_split_on_characters() {
        let text = "バッテリー容量は40kWhです。".repeat(10);
        let chunker = Chunker::new(16, 4).expect("chunker");
        let spans = chunker.split_text(&text);

        assert!(spans.iter().all(|s| s.end - s.start <= 16));
        assert_covers(&text, &spans);
    }

    #[test]
    fn chunk_ids_are_stable_and_distinct() {
        let chunker = Chunker::new(20, 5).expect("chunker");
        let document = doc(&"abcdefghij".repeat(6));
        let first = chunker.split_document(&document);
        let second = chunker.split_document(&document);

        assert_eq!(first, second);
        assert_ne!(first[0].chunk_id, first[1].chunk_id);
        assert_eq!(first[0].chunk_id.len(), 16);
    }

    #[test]
    fn citation_includes_page_or_row() {
        let chunker = Chunker::new(100, 10).expect("chunker");
        let mut document = doc("Torque spec: 110 Nm.");
        document.source = "manual.pdf".to_string();
        document.page = Some(3);
        assert_eq!(chunker.split_document(&document)[0].citation(), "manual.pdf, page 3");

        document.page = None;
        document.source = "specs.csv".to_string();
        document.row = Some(0);
        assert_eq!(chunker.split_document(&document)[0].citation(), "specs.csv, row 1");
    }
}
