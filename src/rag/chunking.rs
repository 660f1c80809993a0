//! Sliding-window text splitter.
//!
//! Windows are measured in characters, not bytes, so multi-byte text never
//! splits inside a code point. When a window would end mid-word the split
//! moves back to the last whitespace in the second half of the window.

use crate::error::ConfigError;

use super::types::{Chunk, ChunkMetadata, CorpusRecord};

/// Fixed size/overlap chunking policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl TextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, ConfigError> {
        if chunk_size == 0 {
            return Err(ConfigError::Invalid("chunk_size must be > 0".into()));
        }
        if chunk_overlap >= chunk_size {
            return Err(ConfigError::Invalid(format!(
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

    /// Split text into overlapping windows. Empty input yields no windows.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.trim().chars().collect();
        if chars.is_empty() {
            return Vec::new();
        }
        if chars.len() <= self.chunk_size {
            return vec![chars.iter().collect()];
        }

        let mut windows = Vec::new();
        let mut start = 0;
        loop {
            let mut end = (start + self.chunk_size).min(chars.len());
            if end < chars.len() {
                let floor = start + self.chunk_size / 2;
                if let Some(ws) = (floor..end).rev().find(|&i| chars[i].is_whitespace()) {
                    end = ws;
                }
            }

            let window: String = chars[start..end].iter().collect();
            let window = window.trim();
            if !window.is_empty() {
                windows.push(window.to_string());
            }

            if end >= chars.len() {
                break;
            }
            start = end.saturating_sub(self.chunk_overlap).max(start + 1);
        }
        windows
    }

    /// Split every record into tagged chunks.
    pub fn split_records(&self, records: &[CorpusRecord]) -> Vec<Chunk> {
        records
            .iter()
            .enumerate()
            .flat_map(|(record_index, record)| {
                self.split_text(&record.text)
                    .into_iter()
                    .enumerate()
                    .map(move |(chunk_index, text)| {
                        Chunk::new(
                            text,
                            ChunkMetadata {
                                persona: record.persona.clone(),
                                condition: record.condition.clone(),
                                emotion: record.emotion.clone(),
                                source: record.source.clone(),
                                record_index,
                                chunk_index,
                            },
                        )
                    })
            })
            .collect()
    }
}

impl Default for TextSplitter {
    fn default() -> Self {
        Self {
            chunk_size: 512,
            chunk_overlap: 100,
        }
    }
}
