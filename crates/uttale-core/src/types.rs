//! Domain types shared by the index, query, and extraction paths.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Stable integer identity of an indexed cue. Allocated once per
/// (file, sequence index) and never reused while the index lives; replacing
/// a file's cues retires the old ids and allocates fresh ones.
pub type DocId = u64;

/// A single time-coded transcript entry.
///
/// - `start`/`end`: fractional seconds, `end > start`
/// - `text`: cue body with interior line breaks preserved
/// - `index`: 0-based position within the source file, the tie-break order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cue {
    pub start: f64,
    pub end: f64,
    pub text: String,
    pub index: usize,
}

/// The indexed unit: one cue plus the identity needed to resolve it back to
/// a playable (file, start, end) tuple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocId,
    /// Relative path of the owning transcript within the corpus root.
    pub file: String,
    /// Scope facet path of the owning file, e.g. "/show/season1".
    pub scope: String,
    pub cue_index: usize,
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// A ranked, resolved search result. Derived, never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub doc_id: DocId,
    pub score: f32,
    pub file: String,
    pub start: f64,
    pub end: f64,
    pub text: String,
    /// Truncated display text, present only when `text` exceeded the
    /// configured snippet length.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
}

/// What the store last saw of a transcript file, used by the reindex diff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileSnapshot {
    pub mtime_secs: i64,
    pub size: u64,
    /// xxh64 of the file contents, to treat touch-without-edit as unchanged.
    pub content_hash: u64,
    pub doc_ids: Vec<DocId>,
}

/// Outcome of one reindex pass. `failed` lists relative paths left at their
/// prior indexed state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReindexReport {
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
    pub unchanged: usize,
    pub failed: Vec<String>,
}

impl ReindexReport {
    pub fn is_noop(&self) -> bool {
        self.added == 0 && self.updated == 0 && self.removed == 0 && self.failed.is_empty()
    }
}

/// Persisted index metadata: doc-id allocator plus the snapshot table,
/// keyed by relative path.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexMeta {
    pub version: u32,
    pub next_doc_id: DocId,
    pub snapshots: BTreeMap<String, FileSnapshot>,
}
