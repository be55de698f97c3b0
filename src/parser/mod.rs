pub mod pdf;

use std::path::Path;
use tracing::info;

use crate::models::chunk::Chunk;
use pdf::ExtractError;

/// Local parser: extracts text from the source document and splits it into chunks.
pub struct DocumentParser {
    chunk_size: usize,
    chunk_overlap: usize,
    pdftotext_bin: String,
}

impl DocumentParser {
    pub fn new(chunk_size: usize, chunk_overlap: usize, pdftotext_bin: &str) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
            pdftotext_bin: pdftotext_bin.to_string(),
        }
    }

    /// Extract text from `path` and split it into chunks numbered from zero.
    pub async fn parse_and_chunk(&self, path: &Path) -> Result<Vec<Chunk>, ExtractError> {
        let text = pdf::extract_text(path, &self.pdftotext_bin).await?;
        if text.trim().is_empty() {
            return Err(ExtractError::Empty(path.display().to_string()));
        }

        let chunks = self.parse_text_content(&text);
        info!("Parsed {} into {} chunks", path.display(), chunks.len());
        Ok(chunks)
    }

    /// Split already-extracted text into chunks.
    pub fn parse_text_content(&self, text: &str) -> Vec<Chunk> {
        split_text(text, self.chunk_size, self.chunk_overlap)
            .into_iter()
            .enumerate()
            .map(|(id, content)| Chunk { id, content })
            .collect()
    }
}

/// Split text into overlapping fixed-size windows of `chunk_size` characters.
/// Each window starts `chunk_size - chunk_overlap` characters after the
/// previous one. Windows are trimmed and blank windows are dropped.
pub fn split_text(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    if text.is_empty() || chunk_size == 0 {
        return vec![];
    }
    let step = chunk_size.saturating_sub(chunk_overlap).max(1);

    // Byte offset of every char boundary, plus the end of the string.
    let boundaries: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let char_count = boundaries.len() - 1;

    let mut chunks = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + chunk_size).min(char_count);
        let window = text[boundaries[start]..boundaries[end]].trim();
        if !window.is_empty() {
            chunks.push(window.to_string());
        }
        if end >= char_count {
            break;
        }
        start += step;
    }
    chunks
}
