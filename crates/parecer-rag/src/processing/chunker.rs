/// A window of page text. Offsets are byte positions into the original
/// string, carried so overlapping chunks can be stitched back together.
#[derive(Debug, Clone)]
pub struct ChunkResult {
    pub text: String,
    pub index: usize,
    pub start_offset: usize,
    pub end_offset: usize,
}

/// Sliding-window chunker with overlap. `chunk_size` and `chunk_overlap`
/// count characters, not bytes, so accented text gets full-size windows.
///
/// Total: every character of the input falls inside at least one chunk, and
/// the non-overlapping portions of consecutive chunks tile the input exactly.
pub struct TextChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl TextChunker {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        debug_assert!(chunk_overlap < chunk_size);
        Self {
            chunk_size,
            chunk_overlap,
        }
    }

    pub fn chunk(&self, text: &str) -> Vec<ChunkResult> {
        if text.is_empty() {
            return Vec::new();
        }

        // Byte offset of every char boundary, with the end as a sentinel.
        let mut bounds: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
        bounds.push(text.len());
        let n_chars = bounds.len() - 1;

        let mut chunks = Vec::new();
        let mut start = 0usize;
        let mut index = 0;

        loop {
            let end = (start + self.chunk_size).min(n_chars);
            let (start_offset, end_offset) = (bounds[start], bounds[end]);

            chunks.push(ChunkResult {
                text: text[start_offset..end_offset].to_string(),
                index,
                start_offset,
                end_offset,
            });
            index += 1;

            if end == n_chars {
                break;
            }
            start = (end - self.chunk_overlap).max(start + 1);
        }

        chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reconstruct(text: &str, chunks: &[ChunkResult]) -> String {
        let mut out = String::new();
        let mut covered = 0;
        for chunk in chunks {
            assert!(chunk.start_offset <= covered, "gap before chunk {}", chunk.index);
            if chunk.end_offset > covered {
                let skip = covered - chunk.start_offset;
                out.push_str(&chunk.text[skip..]);
                covered = chunk.end_offset;
            }
        }
        assert_eq!(covered, text.len());
        out
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        let chunker = TextChunker::new(1200, 200);
        let chunks = chunker.chunk("short page");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "short page");
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        let chunker = TextChunker::new(1200, 200);
        assert!(chunker.chunk("").is_empty());
    }

    #[test]
    fn chunks_overlap_by_configured_amount() {
        let text = "a".repeat(3000);
        let chunker = TextChunker::new(1200, 200);
        let chunks = chunker.chunk(&text);
        assert!(chunks.len() >= 3);
        for pair in chunks.windows(2) {
            assert_eq!(pair[0].end_offset - pair[1].start_offset, 200);
        }
    }

    #[test]
    fn concatenation_minus_overlap_reconstructs_input() {
        let text: String = (0..500)
            .map(|i| format!("Parágrafo {} sobre licenciamento ambiental. ", i))
            .collect();
        let chunker = TextChunker::new(1200, 200);
        let chunks = chunker.chunk(&text);
        assert_eq!(reconstruct(&text, &chunks), text);
    }

    #[test]
    fn window_sizes_count_characters_not_bytes() {
        // Every char here is 2 bytes in UTF-8; byte windows would come up
        // half-sized.
        let text = "çãé".repeat(1000);
        let chunker = TextChunker::new(1200, 200);
        let chunks = chunker.chunk(&text);

        for chunk in &chunks[..chunks.len() - 1] {
            assert_eq!(chunk.text.chars().count(), 1200);
        }
        for pair in chunks.windows(2) {
            let overlap_bytes = pair[0].end_offset - pair[1].start_offset;
            assert_eq!(text[pair[1].start_offset..pair[0].end_offset].chars().count(), 200);
            assert_eq!(overlap_bytes, 400);
        }
    }

    #[test]
    fn multibyte_text_is_never_split_mid_char() {
        let text = "çãé".repeat(1000);
        let chunker = TextChunker::new(1201, 199);
        let chunks = chunker.chunk(&text);
        for chunk in &chunks {
            assert!(text.is_char_boundary(chunk.start_offset));
            assert!(text.is_char_boundary(chunk.end_offset));
        }
        assert_eq!(reconstruct(&text, &chunks), text);
    }

    #[test]
    fn chunking_is_deterministic() {
        let text = "x".repeat(5000);
        let chunker = TextChunker::new(800, 120);
        let a = chunker.chunk(&text);
        let b = chunker.chunk(&text);
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(&b) {
            assert_eq!(x.start_offset, y.start_offset);
            assert_eq!(x.end_offset, y.end_offset);
        }
    }
}
