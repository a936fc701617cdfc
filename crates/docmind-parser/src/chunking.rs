//! Recursive text chunking with overlap
//!
//! Text is first cut into pieces along a hierarchy of separators (paragraph,
//! line, sentence, whitespace, then single characters), splitting a segment
//! further only while it is larger than the chunk size. Pieces are then merged
//! greedily into chunks. Every chunk is an exact slice of the source text and
//! consecutive chunks share a tail of at most `chunk_overlap` characters, so
//! dropping each chunk's overlap with its predecessor rebuilds the document.
//!
//! All sizes and offsets are counted in characters.

use docmind_core::{Chunk, DocmindError, Document, RagConfig, Result};
use std::ops::Range;

/// Separator levels, coarsest first. Separators stay attached to the piece
/// they terminate.
const SEPARATORS: &[&[&str]] = &[
    &["\n\n"],
    &["\n"],
    &[". ", "! ", "? ", "。"],
    &[" ", "\t"],
];

/// Configuration for document chunking
#[derive(Debug, Clone)]
pub struct ChunkConfig {
    /// Maximum chunk size in characters
    pub chunk_size: usize,

    /// Overlap between consecutive chunks in characters
    pub chunk_overlap: usize,

    /// Record each chunk's start offset
    pub add_start_index: bool,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            add_start_index: true,
        }
    }
}

impl From<&RagConfig> for ChunkConfig {
    fn from(config: &RagConfig) -> Self {
        Self {
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
            add_start_index: config.add_start_index,
        }
    }
}

/// A tile of the source text. `start`/`end` are byte positions.
#[derive(Debug, Clone, Copy)]
struct Piece {
    start: usize,
    end: usize,
    chars: usize,
}

/// Splits documents into overlapping chunks
#[derive(Debug, Clone)]
pub struct TextSplitter {
    config: ChunkConfig,
}

impl TextSplitter {
    /// Create a splitter, rejecting sizes that cannot make progress
    pub fn new(config: ChunkConfig) -> Result<Self> {
        if config.chunk_size == 0 {
            return Err(DocmindError::ChunkingError(
                "chunk size must be greater than zero".to_string(),
            ));
        }
        if config.chunk_overlap >= config.chunk_size {
            return Err(DocmindError::ChunkingError(format!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                config.chunk_overlap, config.chunk_size
            )));
        }
        Ok(Self { config })
    }

    /// Get the configuration
    pub fn config(&self) -> &ChunkConfig {
        &self.config
    }

    /// Chunk a document. Empty text yields no chunks.
    pub fn chunk(&self, document: &Document) -> Vec<Chunk> {
        let text = document.text.as_str();
        if text.is_empty() {
            return Vec::new();
        }

        let mut pieces = Vec::new();
        split_recursive(text, 0, self.config.chunk_size, SEPARATORS, &mut pieces);

        // Character offset at which each piece starts
        let mut char_starts = Vec::with_capacity(pieces.len());
        let mut offset = 0;
        for piece in &pieces {
            char_starts.push(offset);
            offset += piece.chars;
        }

        self.merge(&pieces)
            .into_iter()
            .enumerate()
            .map(|(i, range)| {
                let first = pieces[range.start];
                let last = pieces[range.end - 1];
                let start_offset = char_starts[range.start];

                let mut chunk = Chunk::new(document, i as u32, &text[first.start..last.end]);
                if self.config.add_start_index {
                    chunk.start_offset = Some(start_offset);
                }
                chunk.page = document.page_at(start_offset);
                chunk
            })
            .collect()
    }

    /// Group consecutive pieces into chunk ranges
    fn merge(&self, pieces: &[Piece]) -> Vec<Range<usize>> {
        let size = self.config.chunk_size;
        let overlap = self.config.chunk_overlap;

        let mut ranges = Vec::new();
        let mut start = 0;
        let mut total = 0;

        for (i, piece) in pieces.iter().enumerate() {
            if total + piece.chars > size && i > start {
                ranges.push(start..i);

                // Keep a tail of the emitted chunk as overlap, leaving room for this piece
                while start < i && (total > overlap || total + piece.chars > size) {
                    total -= pieces[start].chars;
                    start += 1;
                }
            }
            total += piece.chars;
        }

        if start < pieces.len() {
            ranges.push(start..pieces.len());
        }

        ranges
    }
}

/// Cut `text` (located at byte `base` of the document) into pieces of at
/// most `max` characters where the separators allow it.
fn split_recursive(
    text: &str,
    base: usize,
    max: usize,
    levels: &[&[&str]],
    out: &mut Vec<Piece>,
) {
    let chars = text.chars().count();
    if chars <= max {
        out.push(Piece {
            start: base,
            end: base + text.len(),
            chars,
        });
        return;
    }

    let Some((separators, finer)) = levels.split_first() else {
        // Raw characters
        for (i, c) in text.char_indices() {
            out.push(Piece {
                start: base + i,
                end: base + i + c.len_utf8(),
                chars: 1,
            });
        }
        return;
    };

    let segments = split_keeping_separators(text, separators);
    if segments.len() == 1 {
        split_recursive(text, base, max, finer, out);
        return;
    }

    for segment in segments {
        split_recursive(
            &text[segment.clone()],
            base + segment.start,
            max,
            finer,
            out,
        );
    }
}

/// Split at every occurrence of any separator, keeping the separator at the
/// end of the preceding segment.
fn split_keeping_separators(text: &str, separators: &[&str]) -> Vec<Range<usize>> {
    let mut cuts: Vec<usize> = separators
        .iter()
        .flat_map(|sep| text.match_indices(sep).map(|(pos, m)| pos + m.len()))
        .collect();
    cuts.sort_unstable();
    cuts.dedup();

    let mut segments = Vec::new();
    let mut start = 0;
    for cut in cuts {
        if cut > start {
            segments.push(start..cut);
            start = cut;
        }
    }
    if start < text.len() {
        segments.push(start..text.len());
    }

    segments
}

#[cfg(test)]
mod tests {
    use super::*;
    use docmind_core::PageSpan;

    fn splitter(chunk_size: usize, chunk_overlap: usize) -> TextSplitter {
        TextSplitter::new(ChunkConfig {
            chunk_size,
            chunk_overlap,
            add_start_index: true,
        })
        .unwrap()
    }

    /// Rebuild the source by dropping each chunk's overlap with its predecessor
    fn reconstruct(chunks: &[Chunk]) -> String {
        let mut text = String::new();
        let mut covered = 0;
        for chunk in chunks {
            let start = chunk.start_offset.unwrap();
            text.extend(chunk.content.chars().skip(covered - start));
            covered = start + chunk.char_count();
        }
        text
    }

    #[test]
    fn test_short_text_is_single_chunk() {
        let doc = Document::new("sky.txt", "The sky is blue. Grass is green.");
        let chunks = TextSplitter::new(ChunkConfig::default())
            .unwrap()
            .chunk(&doc);

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "The sky is blue. Grass is green.");
        assert_eq!(chunks[0].start_offset, Some(0));
        assert_eq!(chunks[0].document_id, doc.id);
    }

    #[test]
    fn test_empty_text_yields_no_chunks() {
        let doc = Document::new("empty.txt", "");
        assert!(splitter(100, 10).chunk(&doc).is_empty());
    }

    #[test]
    fn test_invalid_config() {
        assert!(matches!(
            TextSplitter::new(ChunkConfig {
                chunk_size: 0,
                chunk_overlap: 0,
                add_start_index: true,
            }),
            Err(DocmindError::ChunkingError(_))
        ));
        assert!(matches!(
            TextSplitter::new(ChunkConfig {
                chunk_size: 100,
                chunk_overlap: 100,
                add_start_index: true,
            }),
            Err(DocmindError::ChunkingError(_))
        ));
    }

    #[test]
    fn test_sentence_chunks_overlap() {
        let doc = Document::new("test.txt", "This is a test. ".repeat(100));
        let chunks = splitter(200, 50).chunk(&doc);

        assert!(chunks.len() > 1);
        // Twelve 16-char sentences fit in 200; three of them (48) carry over
        assert_eq!(chunks[0].char_count(), 192);
        assert_eq!(chunks[1].start_offset, Some(144));
        assert!(chunks[1].content.starts_with("This is a test. "));

        for chunk in &chunks {
            assert!(chunk.char_count() <= 200);
        }
        assert_eq!(reconstruct(&chunks), doc.text);
    }

    #[test]
    fn test_prefers_paragraph_breaks() {
        let text = format!("{}\n\n{}", "a".repeat(30), "b".repeat(30));
        let doc = Document::new("p.txt", text.clone());
        let chunks = splitter(40, 5).chunk(&doc);

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].content, format!("{}\n\n", "a".repeat(30)));
        assert_eq!(chunks[1].content, "b".repeat(30));
        assert_eq!(reconstruct(&chunks), text);
    }

    #[test]
    fn test_unbroken_token_falls_back_to_characters() {
        let doc = Document::new("token.txt", "x".repeat(25));
        let chunks = splitter(10, 3).chunk(&doc);

        assert!(chunks.iter().all(|c| c.char_count() <= 10));
        assert_eq!(chunks[0].content, "x".repeat(10));
        assert_eq!(chunks[1].start_offset, Some(7));
        assert_eq!(reconstruct(&chunks), doc.text);
    }

    #[test]
    fn test_multibyte_offsets_are_characters() {
        let doc = Document::new("ko.txt", "가나다 라마바 사아자 차카타 파하");
        let chunks = splitter(8, 3).chunk(&doc);

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.char_count() <= 8);
        }
        assert_eq!(reconstruct(&chunks), doc.text);
    }

    #[test]
    fn test_start_index_disabled() {
        let splitter = TextSplitter::new(ChunkConfig {
            chunk_size: 10,
            chunk_overlap: 2,
            add_start_index: false,
        })
        .unwrap();
        let doc = Document::new("n.txt", "one two three four five");

        let chunks = splitter.chunk(&doc);
        assert!(chunks.iter().all(|c| c.start_offset.is_none()));
    }

    #[test]
    fn test_chunk_pages_and_indices() {
        let text = format!("{}\n\n{}", "first page ".repeat(4), "second page ".repeat(4));
        let second_start = "first page ".repeat(4).chars().count() + 2;
        let doc = Document::new("doc.pdf", text).with_pages(vec![
            PageSpan {
                number: 1,
                start_offset: 0,
            },
            PageSpan {
                number: 2,
                start_offset: second_start,
            },
        ]);

        let chunks = splitter(50, 0).chunk(&doc);

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].page, Some(1));
        assert_eq!(chunks[1].page, Some(2));
        assert_eq!(chunks[0].index, 0);
        assert_eq!(chunks[1].index, 1);
    }

    #[test]
    fn test_split_keeping_separators() {
        let text = "One. Two! Three";
        let segments: Vec<&str> = split_keeping_separators(text, &[". ", "! "])
            .into_iter()
            .map(|r| &text[r])
            .collect();

        assert_eq!(segments, vec!["One. ", "Two! ", "Three"]);
    }
}
