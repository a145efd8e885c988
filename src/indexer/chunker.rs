use serde::Serialize;
use tracing::debug;

use super::pdf::Page;
use crate::error::RagError;

/// A contiguous character span of one page, the unit of embedding and retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    pub text: String,
    pub page_number: u32,
    /// Position within the source page, starting at 0.
    pub chunk_index: usize,
}

/// Validated window parameters, measured in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    chunk_size: usize,
    overlap: usize,
}

impl ChunkingConfig {
    pub const DEFAULT_CHUNK_SIZE: usize = 1000;
    pub const DEFAULT_OVERLAP: usize = 200;

    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self, RagError> {
        if chunk_size == 0 {
            return Err(RagError::Configuration(
                "chunk_size must be positive".to_string(),
            ));
        }
        if overlap >= chunk_size {
            return Err(RagError::Configuration(format!(
                "overlap ({overlap}) must be smaller than chunk_size ({chunk_size})"
            )));
        }
        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: Self::DEFAULT_CHUNK_SIZE,
            overlap: Self::DEFAULT_OVERLAP,
        }
    }
}

/// Splits every page into overlapping chunks, in document order.
///
/// Chunks never cross a page boundary. Pages with no visible text yield none.
pub fn create_chunks(pages: &[Page], config: &ChunkingConfig) -> Vec<Chunk> {
    let mut sorted: Vec<&Page> = pages.iter().collect();
    sorted.sort_by_key(|p| p.page_number);

    let mut chunks = Vec::new();
    for page in sorted {
        if page.text.trim().is_empty() {
            continue;
        }
        for (chunk_index, text) in split_page(&page.text, config).into_iter().enumerate() {
            chunks.push(Chunk {
                text,
                page_number: page.page_number,
                chunk_index,
            });
        }
    }

    debug!("Created {} chunks from {} pages", chunks.len(), pages.len());
    chunks
}

/// Splits one page's text into windows of at most `chunk_size` characters.
///
/// Each window after the first starts exactly `overlap` characters before the
/// previous window's end, so the last `overlap` characters of a chunk are the
/// first `overlap` characters of the next one.
pub fn split_page(text: &str, config: &ChunkingConfig) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();
    let mut pieces = Vec::new();
    let mut start = 0;

    loop {
        if len - start <= config.chunk_size {
            pieces.push(chars[start..].iter().collect());
            break;
        }

        let hard_end = start + config.chunk_size;
        let end = natural_break(&chars, start, hard_end, config.overlap).unwrap_or(hard_end);
        pieces.push(chars[start..end].iter().collect());
        start = end - config.overlap;
    }

    pieces
}

/// Finds a paragraph, line or sentence boundary in the second half of the
/// window `[start, hard_end)`. The returned end always leaves the next window
/// starting after `start`.
fn natural_break(chars: &[char], start: usize, hard_end: usize, overlap: usize) -> Option<usize> {
    let floor = (start + (hard_end - start) / 2).max(start + overlap + 1);
    if floor >= hard_end {
        return None;
    }
    let window = &chars[floor..hard_end];

    let after = |pos: usize, width: usize| floor + pos + width;

    // Paragraph break, then line break, then sentence end.
    if let Some(pos) = rfind_pair(window, '\n', '\n') {
        return Some(after(pos, 2));
    }
    if let Some(pos) = window.iter().rposition(|&c| c == '\n') {
        return Some(after(pos, 1));
    }
    window
        .windows(2)
        .rposition(|w| matches!(w[0], '.' | '?' | '!') && w[1] == ' ')
        .map(|pos| after(pos, 2))
}

fn rfind_pair(window: &[char], first: char, second: char) -> Option<usize> {
    window
        .windows(2)
        .rposition(|w| w[0] == first && w[1] == second)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Text without any natural boundary, so every cut is a hard cut.
    fn unbroken(len: usize) -> String {
        (0..len)
            .map(|i| char::from(b'a' + (i % 26) as u8))
            .collect()
    }

    fn prose(sentences: usize) -> String {
        (0..sentences)
            .map(|i| {
                if i % 7 == 6 {
                    format!("Sentence number {i} ends a paragraph.\n\n")
                } else {
                    format!("Sentence number {i} talks about refunds and returns. ")
                }
            })
            .collect()
    }

    fn reconstruct(chunks: &[String], overlap: usize) -> String {
        let mut out = String::new();
        for (i, chunk) in chunks.iter().enumerate() {
            if i == 0 {
                out.push_str(chunk);
            } else {
                out.extend(chunk.chars().skip(overlap));
            }
        }
        out
    }

    #[test]
    fn test_config_rejects_overlap_not_smaller() {
        assert!(matches!(
            ChunkingConfig::new(100, 100),
            Err(RagError::Configuration(_))
        ));
        assert!(matches!(
            ChunkingConfig::new(100, 150),
            Err(RagError::Configuration(_))
        ));
        assert!(matches!(
            ChunkingConfig::new(0, 0),
            Err(RagError::Configuration(_))
        ));
        assert!(ChunkingConfig::new(100, 0).is_ok());
        assert!(ChunkingConfig::new(100, 99).is_ok());
    }

    #[test]
    fn test_scenario_2400_chars() {
        let text = unbroken(2400);
        let config = ChunkingConfig::new(1000, 200).unwrap();
        let chunks = create_chunks(&[Page::new(1, text.clone())], &config);

        assert_eq!(chunks.len(), 3);
        let chars: Vec<char> = text.chars().collect();
        let expected = [(0, 1000), (800, 1800), (1600, 2400)];
        for (chunk, (from, to)) in chunks.iter().zip(expected) {
            let span: String = chars[from..to].iter().collect();
            assert_eq!(chunk.text, span);
            assert_eq!(chunk.page_number, 1);
        }
        let indexes: Vec<usize> = chunks.iter().map(|c| c.chunk_index).collect();
        assert_eq!(indexes, vec![0, 1, 2]);
    }

    #[test]
    fn test_short_page_is_single_chunk() {
        let config = ChunkingConfig::default();
        let chunks = create_chunks(&[Page::new(3, "Just a few words.")], &config);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Just a few words.");
        assert_eq!(chunks[0].page_number, 3);
    }

    #[test]
    fn test_blank_pages_yield_nothing() {
        let config = ChunkingConfig::default();
        let chunks = create_chunks(&[Page::new(1, ""), Page::new(2, "  \n\t ")], &config);
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_coverage_and_overlap_hold_for_many_shapes() {
        let texts = [unbroken(5000), prose(120), "é漢字🙂 ".repeat(700)];
        for (chunk_size, overlap) in [(1000, 200), (300, 0), (50, 49), (257, 31)] {
            let config = ChunkingConfig::new(chunk_size, overlap).unwrap();
            for text in &texts {
                let pieces = split_page(text, &config);
                assert_eq!(&reconstruct(&pieces, overlap), text);

                for piece in &pieces {
                    assert!(piece.chars().count() <= chunk_size);
                }
                for pair in pieces.windows(2) {
                    let tail: String = {
                        let c: Vec<char> = pair[0].chars().collect();
                        c[c.len() - overlap..].iter().collect()
                    };
                    let head: String = pair[1].chars().take(overlap).collect();
                    assert_eq!(tail, head, "size={chunk_size} overlap={overlap}");
                }
            }
        }
    }

    #[test]
    fn test_prefers_paragraph_breaks() {
        let config = ChunkingConfig::new(400, 50).unwrap();
        let text = prose(60);
        let pieces = split_page(&text, &config);
        assert!(pieces.len() > 1);
        let ends_on_boundary = pieces[..pieces.len() - 1]
            .iter()
            .filter(|p| p.ends_with('\n') || p.ends_with(". "))
            .count();
        assert_eq!(ends_on_boundary, pieces.len() - 1);
    }

    #[test]
    fn test_page_attribution_and_order() {
        let config = ChunkingConfig::new(100, 20).unwrap();
        let pages = vec![Page::new(2, unbroken(250)), Page::new(1, unbroken(150))];
        let chunks = create_chunks(&pages, &config);

        let first_page: Vec<&Chunk> = chunks.iter().filter(|c| c.page_number == 1).collect();
        let second_page: Vec<&Chunk> = chunks.iter().filter(|c| c.page_number == 2).collect();
        assert_eq!(first_page.len(), 2);
        assert_eq!(second_page.len(), 3);

        // Page ascending, then chunk_index ascending.
        let order: Vec<(u32, usize)> = chunks
            .iter()
            .map(|c| (c.page_number, c.chunk_index))
            .collect();
        let mut sorted = order.clone();
        sorted.sort();
        assert_eq!(order, sorted);

        // Every chunk's text comes from its own page.
        let page_two = &pages[0].text;
        for chunk in second_page {
            assert!(page_two.contains(&chunk.text));
        }
    }
}
