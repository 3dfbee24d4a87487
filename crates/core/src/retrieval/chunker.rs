use serde::{Deserialize, Serialize};

use super::RetrievalError;

pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

/// Window length and overlap, both counted in characters (Unicode scalar values).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkingConfig {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { chunk_size: DEFAULT_CHUNK_SIZE, chunk_overlap: DEFAULT_CHUNK_OVERLAP }
    }
}

/// One window of source text. `start`/`end` are character offsets, end exclusive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextWindow {
    pub start: usize,
    pub end: usize,
    pub text: String,
}

impl ChunkingConfig {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, RetrievalError> {
        if chunk_size == 0 {
            return Err(RetrievalError::InvalidChunking(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        if chunk_overlap >= chunk_size {
            return Err(RetrievalError::InvalidChunking(format!(
                "chunk_overlap ({chunk_overlap}) must be smaller than chunk_size ({chunk_size})"
            )));
        }
        Ok(Self { chunk_size, chunk_overlap })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    fn step(&self) -> usize {
        self.chunk_size - self.chunk_overlap
    }

    /// Number of windows [`split`](Self::split) yields for a text of `char_count` characters.
    pub fn expected_chunks(&self, char_count: usize) -> usize {
        match char_count {
            0 => 0,
            n if n <= self.chunk_size => 1,
            n => (n - self.chunk_overlap).div_ceil(self.step()),
        }
    }

    pub fn split(&self, text: &str) -> Vec<TextWindow> {
        let boundaries: Vec<usize> =
            text.char_indices().map(|(offset, _)| offset).chain(std::iter::once(text.len())).collect();
        let char_count = boundaries.len() - 1;
        if char_count == 0 {
            return Vec::new();
        }

        let mut windows = Vec::with_capacity(self.expected_chunks(char_count));
        let mut start = 0;
        loop {
            let end = (start + self.chunk_size).min(char_count);
            windows.push(TextWindow {
                start,
                end,
                text: text[boundaries[start]..boundaries[end]].to_string(),
            });
            if end == char_count {
                break;
            }
            start += self.step();
        }

        windows
    }
}
