//! Query engine: validation, pagination, hit resolution, snippets.

use std::sync::Arc;

use tracing::debug;

use uttale_core::types::SearchHit;
use uttale_core::{Error, Result};

use crate::store::IndexStore;

pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const DEFAULT_SNIPPET_LEN: usize = 160;

pub struct SearchService {
    store: Arc<IndexStore>,
    page_size: usize,
    snippet_len: usize,
}

impl SearchService {
    pub fn new(store: Arc<IndexStore>, page_size: usize, snippet_len: usize) -> Self {
        Self { store, page_size, snippet_len }
    }

    /// Ranked, resolved hits for one page. Identical (query, scope, page)
    /// calls return identical results while no reindex has run in between.
    /// Ids retired by a concurrent reindex are dropped from the page, never
    /// surfaced to the caller.
    pub fn search(&self, query_text: &str, scope: Option<&str>, page: usize) -> Result<Vec<SearchHit>> {
        if query_text.trim().is_empty() {
            return Err(Error::InvalidQuery("empty query".to_string()));
        }
        let offset = page * self.page_size;
        let ranked = self.store.search(query_text, scope, self.page_size, offset)?;
        let mut hits = Vec::with_capacity(ranked.len());
        for (doc_id, score) in ranked {
            let document = match self.store.lookup(doc_id) {
                Ok(d) => d,
                Err(Error::NotFound(_)) => {
                    debug!(doc_id, "dropped hit retired by concurrent reindex");
                    continue;
                }
                Err(e) => return Err(e),
            };
            hits.push(SearchHit {
                doc_id,
                score,
                snippet: snippet(&document.text, self.snippet_len),
                file: document.file,
                start: document.start,
                end: document.end,
                text: document.text,
            });
        }
        Ok(hits)
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }
}

/// Char-boundary truncation with an ellipsis marker; `None` when the text
/// already fits.
fn snippet(text: &str, max_chars: usize) -> Option<String> {
    let mut indices = text.char_indices();
    match indices.nth(max_chars) {
        Some((byte_idx, _)) => Some(format!("{}…", &text[..byte_idx])),
        None => None,
    }
}
