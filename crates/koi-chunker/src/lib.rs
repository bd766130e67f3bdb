//! Document chunking for embedding and retrieval (C9): fixed token-window,
//! sentence-aware, and entity-aware strategies.

use koi_core::{CodeEntity, CodeEntityType};

/// One chunk of a larger text, addressed by token offsets into the
/// whitespace-tokenised source.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub text: String,
    pub index: usize,
    pub start_token: usize,
    pub end_token: usize,
    pub total_chunks: usize,
}

/// Fixed-size sliding token window with overlap.
#[derive(Debug, Clone, Copy)]
pub struct TextChunker {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub min_chunk_size: usize,
}

impl Default for TextChunker {
    fn default() -> Self {
        Self { chunk_size: 500, chunk_overlap: 50, min_chunk_size: 100 }
    }
}

impl TextChunker {
    pub fn new(chunk_size: usize, chunk_overlap: usize, min_chunk_size: usize) -> Self {
        Self { chunk_size, chunk_overlap, min_chunk_size }
    }

    pub fn chunk_text(&self, text: &str) -> Vec<Chunk> {
        if text.trim().is_empty() {
            return vec![];
        }

        let tokens: Vec<&str> = text.split_whitespace().collect();
        let total_tokens = tokens.len();

        if total_tokens <= self.chunk_size {
            return vec![Chunk {
                text: text.trim().to_string(),
                index: 0,
                start_token: 0,
                end_token: total_tokens,
                total_chunks: 1,
            }];
        }

        let mut chunks: Vec<Chunk> = Vec::new();
        let mut start = 0usize;
        let mut chunk_index = 0usize;

        while start < total_tokens {
            let end = (start + self.chunk_size).min(total_tokens);
            let chunk_tokens = &tokens[start..end];

            if chunk_tokens.len() >= self.min_chunk_size || start == 0 {
                chunks.push(Chunk {
                    text: chunk_tokens.join(" "),
                    index: chunk_index,
                    start_token: start,
                    end_token: end,
                    total_chunks: 0,
                });
                chunk_index += 1;
            }

            let mut next_start = end.saturating_sub(self.chunk_overlap);
            let last_start = chunks.last().map(|c| c.start_token).unwrap_or(0);
            if next_start <= last_start {
                next_start = end;
            }
            start = next_start;
        }

        let total = chunks.len();
        for chunk in &mut chunks {
            chunk.total_chunks = total;
        }
        chunks
    }
}

/// Token-window chunking that shifts each boundary left to the nearest
/// sentence end within a backoff window, falling back to the raw boundary
/// when none is found.
#[derive(Debug, Clone, Copy)]
pub struct SentenceAwareChunker {
    pub inner: TextChunker,
}

impl Default for SentenceAwareChunker {
    fn default() -> Self {
        Self { inner: TextChunker::default() }
    }
}

impl SentenceAwareChunker {
    pub fn new(chunk_size: usize, chunk_overlap: usize, min_chunk_size: usize) -> Self {
        Self { inner: TextChunker::new(chunk_size, chunk_overlap, min_chunk_size) }
    }

    pub fn chunk_text(&self, text: &str) -> Vec<Chunk> {
        if text.trim().is_empty() {
            return vec![];
        }

        let tokens: Vec<&str> = text.split_whitespace().collect();
        let total_tokens = tokens.len();
        let chunk_size = self.inner.chunk_size;

        if total_tokens <= chunk_size {
            return vec![Chunk {
                text: text.trim().to_string(),
                index: 0,
                start_token: 0,
                end_token: total_tokens,
                total_chunks: 1,
            }];
        }

        let mut chunks: Vec<Chunk> = Vec::new();
        let mut start = 0usize;
        let mut chunk_index = 0usize;

        while start < total_tokens {
            let target_end = (start + chunk_size).min(total_tokens);
            let end = self.find_sentence_boundary(&tokens, start, target_end);
            let chunk_tokens = &tokens[start..end];

            if chunk_tokens.len() >= self.inner.min_chunk_size || start == 0 {
                chunks.push(Chunk {
                    text: chunk_tokens.join(" "),
                    index: chunk_index,
                    start_token: start,
                    end_token: end,
                    total_chunks: 0,
                });
                chunk_index += 1;
            }

            start = (end.saturating_sub(self.inner.chunk_overlap)).max(start + 1);
        }

        let total = chunks.len();
        for chunk in &mut chunks {
            chunk.total_chunks = total;
        }
        chunks
    }

    fn find_sentence_boundary(&self, tokens: &[&str], start: usize, target_end: usize) -> usize {
        let search_start = start.max(target_end.saturating_sub(self.inner.chunk_size / 5));
        let mut i = target_end;
        while i > search_start {
            i -= 1;
            let token = tokens[i];
            if token.ends_with('.') || token.ends_with('!') || token.ends_with('?') {
                return i + 1;
            }
        }
        target_end
    }
}

/// One chunk per meaningful code entity, for files that were parsed by the
/// indexer. Takes precedence over token-window chunking for such files.
pub fn entity_aware_chunks(entities: &[CodeEntity]) -> Vec<Chunk> {
    const MAX_LEN: usize = 1500;
    let meaningful: Vec<&CodeEntity> = entities
        .iter()
        .filter(|e| {
            matches!(
                e.entity_type,
                CodeEntityType::Function
                    | CodeEntityType::Class
                    | CodeEntityType::Module
                    | CodeEntityType::Interface
            )
        })
        .collect();

    let total = meaningful.len();
    meaningful
        .into_iter()
        .enumerate()
        .map(|(index, entity)| {
            let mut text = format!(
                "{} {} {}\n",
                entity.entity_type.label(),
                entity.name,
                entity.signature.as_deref().unwrap_or("")
            );
            if let Some(docstring) = &entity.docstring {
                text.push_str(docstring);
                text.push('\n');
            }
            if let Some(params) = &entity.params {
                text.push_str(&format!("params: {params}\n"));
            }
            if let Some(return_type) = &entity.return_type {
                text.push_str(&format!("returns: {return_type}\n"));
            }
            text.push_str(&format!("{}:{}-{}", entity.file_path, entity.line_start, entity.line_end));
            text.truncate(text.char_indices().nth(MAX_LEN).map(|(i, _)| i).unwrap_or(text.len()));

            Chunk {
                text,
                index,
                start_token: entity.line_start as usize,
                end_token: entity.line_end as usize,
                total_chunks: total,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_yields_no_chunks() {
        assert!(TextChunker::default().chunk_text("").is_empty());
        assert!(TextChunker::default().chunk_text("   ").is_empty());
    }

    #[test]
    fn short_input_yields_exactly_one_chunk() {
        let chunks = TextChunker::default().chunk_text("a short piece of text");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].total_chunks, 1);
    }

    #[test]
    fn long_input_is_split_with_overlap() {
        let words: Vec<String> = (0..1200).map(|i| format!("w{i}")).collect();
        let text = words.join(" ");
        let chunker = TextChunker::new(500, 50, 100);
        let chunks = chunker.chunk_text(&text);
        assert!(chunks.len() > 1);
        assert_eq!(chunks[0].start_token, 0);
        // every chunk after the first overlaps the previous by chunk_overlap tokens
        for pair in chunks.windows(2) {
            assert!(pair[1].start_token < pair[0].end_token);
        }
        assert!(chunks.iter().all(|c| c.total_chunks == chunks.len()));
    }

    #[test]
    fn sentence_aware_prefers_punctuation_boundary() {
        let mut words: Vec<String> = (0..600).map(|i| format!("w{i}")).collect();
        words[490] = "end.".to_string();
        let text = words.join(" ");
        let chunker = SentenceAwareChunker::new(500, 50, 100);
        let chunks = chunker.chunk_text(&text);
        assert_eq!(chunks[0].end_token, 491);
    }

    #[test]
    fn sentence_aware_falls_back_to_window_boundary_when_no_punctuation() {
        let words: Vec<String> = (0..600).map(|i| format!("w{i}")).collect();
        let text = words.join(" ");
        let chunker = SentenceAwareChunker::new(500, 50, 100);
        let chunks = chunker.chunk_text(&text);
        assert_eq!(chunks[0].end_token, 500);
    }
}
