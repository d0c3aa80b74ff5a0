use std::collections::VecDeque;

use crate::error::{WeftError, WeftResult};

use super::Document;

pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

/// Splits text into chunks bounded by a maximum character length.
///
/// Separators are tried in order, from paragraph breaks down to single
/// characters. Pieces produced by a coarse separator are re-split with the
/// finer ones when they are still too large, then merged back greedily with
/// a tail of the previous chunk carried over as overlap.
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

fn default_separators() -> Vec<String> {
    vec!["\n\n".into(), "\n".into(), " ".into(), String::new()]
}

fn text_len(s: &str) -> usize {
    s.chars().count()
}

impl TextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> WeftResult<Self> {
        if chunk_overlap >= chunk_size {
            return Err(WeftError::Document(format!(
                "chunk overlap {chunk_overlap} must be smaller than chunk size {chunk_size}"
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
            separators: default_separators(),
        })
    }

    pub fn with_separators(mut self, separators: Vec<String>) -> Self {
        self.separators = separators;
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split raw text into chunks.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, &self.separators)
    }

    /// Split documents into chunk documents, stamping each chunk with its
    /// index and position while keeping the parent's metadata.
    pub fn split_documents(&self, docs: &[Document]) -> Vec<Document> {
        let mut out = Vec::new();
        for doc in docs {
            let chunks = self.split_text(&doc.page_content);
            let mut search_from = 0usize;
            for (i, chunk) in chunks.into_iter().enumerate() {
                let offset = doc.page_content[search_from..]
                    .find(&chunk)
                    .map(|p| search_from + p);
                if let Some(at) = offset {
                    // Overlapping chunks start before the previous one ends,
                    // so only step past the first character (by its UTF-8 width)
                    let step = doc.page_content[at..]
                        .chars()
                        .next()
                        .map_or(1, char::len_utf8);
                    search_from = at + step;
                }
                let mut metadata = doc.metadata.clone();
                metadata.chunk_index = Some(i);
                metadata.start_offset = offset;
                out.push(Document {
                    page_content: chunk,
                    metadata,
                });
            }
        }
        out
    }

    fn split_recursive(&self, text: &str, separators: &[String]) -> Vec<String> {
        let mut final_chunks = Vec::new();

        // First separator that occurs in the text wins; the ones after it
        // handle pieces that are still too large.
        let mut separator = separators.last().cloned().unwrap_or_default();
        let mut remaining: &[String] = &[];
        for (i, sep) in separators.iter().enumerate() {
            if sep.is_empty() {
                separator = String::new();
                break;
            }
            if text.contains(sep.as_str()) {
                separator = sep.clone();
                remaining = &separators[i + 1..];
                break;
            }
        }

        let splits: Vec<String> = if separator.is_empty() {
            text.chars().map(|c| c.to_string()).collect()
        } else {
            text.split(separator.as_str()).map(|s| s.to_string()).collect()
        };

        let mut good: Vec<String> = Vec::new();
        for split in splits {
            if text_len(&split) < self.chunk_size {
                good.push(split);
            } else {
                if !good.is_empty() {
                    final_chunks.extend(self.merge_splits(&good, &separator));
                    good.clear();
                }
                if remaining.is_empty() {
                    final_chunks.push(split);
                } else {
                    final_chunks.extend(self.split_recursive(&split, remaining));
                }
            }
        }
        if !good.is_empty() {
            final_chunks.extend(self.merge_splits(&good, &separator));
        }
        final_chunks
    }

    /// Greedily pack splits into chunks, sliding a window so the tail of one
    /// chunk reappears at the head of the next.
    fn merge_splits(&self, splits: &[String], separator: &str) -> Vec<String> {
        let sep_len = text_len(separator);
        let mut docs: Vec<String> = Vec::new();
        let mut current: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for split in splits {
            let len = text_len(split);
            let sep_cost = if current.is_empty() { 0 } else { sep_len };
            if total + len + sep_cost > self.chunk_size && !current.is_empty() {
                if let Some(doc) = join_splits(current.iter().copied(), separator) {
                    docs.push(doc);
                }
                while total > self.chunk_overlap
                    || (total + len + if current.is_empty() { 0 } else { sep_len }
                        > self.chunk_size
                        && total > 0)
                {
                    match current.pop_front() {
                        Some(first) => {
                            total -=
                                text_len(first) + if current.is_empty() { 0 } else { sep_len };
                        }
                        None => break,
                    }
                }
            }
            current.push_back(split);
            total += len + if current.len() > 1 { sep_len } else { 0 };
        }

        if let Some(doc) = join_splits(current.iter().copied(), separator) {
            docs.push(doc);
        }
        docs
    }
}

impl Default for TextSplitter {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            separators: default_separators(),
        }
    }
}

fn join_splits<'a>(parts: impl Iterator<Item = &'a str>, separator: &str) -> Option<String> {
    let joined = parts.collect::<Vec<_>>().join(separator);
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
