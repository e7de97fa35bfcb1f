//! Incremental corpus indexer.
//!
//! Walks `*.vtt` files under the corpus root, diffs each against the store's
//! recorded snapshot, and applies add/update/delete batches with one commit
//! per file, so an interrupted pass leaves the index at "some subset of
//! files applied" and never a torn document.

use std::collections::BTreeSet;
use std::hash::Hasher;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use indicatif::ProgressBar;
use tracing::{info, warn};
use twox_hash::XxHash64;

use uttale_core::types::{Document, FileSnapshot, ReindexReport};
use uttale_core::{vtt, Result};

use crate::store::IndexStore;

pub const TRANSCRIPT_EXT: &str = "vtt";

pub struct Indexer {
    store: Arc<IndexStore>,
}

enum FileOutcome {
    Added,
    Updated,
    Unchanged,
}

impl Indexer {
    pub fn new(store: Arc<IndexStore>) -> Self {
        Self { store }
    }

    /// One full reindex pass over `corpus_root`. Per-file failures are
    /// recorded in the report and do not abort the pass.
    pub fn reindex(&self, corpus_root: &Path) -> Result<ReindexReport> {
        let files = list_transcripts(corpus_root);
        let mut report = ReindexReport::default();
        let mut seen = BTreeSet::new();

        let progress = ProgressBar::new(files.len() as u64);
        for (rel, abs) in &files {
            seen.insert(rel.clone());
            match self.reindex_file(rel, abs) {
                Ok(FileOutcome::Added) => report.added += 1,
                Ok(FileOutcome::Updated) => report.updated += 1,
                Ok(FileOutcome::Unchanged) => report.unchanged += 1,
                Err(e) => {
                    warn!(file = %rel, error = %e, "left at prior indexed state");
                    report.failed.push(rel.clone());
                }
            }
            progress.inc(1);
        }
        progress.finish_and_clear();

        for path in self.store.snapshot_paths() {
            if seen.contains(&path) {
                continue;
            }
            if let Some(prior) = self.store.snapshot(&path) {
                for id in prior.doc_ids {
                    self.store.delete(id);
                }
            }
            self.store.remove_snapshot(&path);
            self.store.commit()?;
            report.removed += 1;
        }

        info!(
            added = report.added,
            updated = report.updated,
            removed = report.removed,
            unchanged = report.unchanged,
            failed = report.failed.len(),
            "reindex pass complete"
        );
        Ok(report)
    }

    fn reindex_file(&self, rel: &str, abs: &Path) -> Result<FileOutcome> {
        let metadata = std::fs::metadata(abs)?;
        let mtime_secs = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map_or(0, |d| d.as_secs() as i64);
        let size = metadata.len();

        let prior = self.store.snapshot(rel);
        if let Some(p) = &prior {
            if p.mtime_secs == mtime_secs && p.size == size {
                return Ok(FileOutcome::Unchanged);
            }
        }

        let bytes = std::fs::read(abs)?;
        let content_hash = xxh64(&bytes);
        if let Some(p) = &prior {
            // Touched but not edited: refresh the stat triple, keep the docs.
            if p.content_hash == content_hash {
                let snapshot = FileSnapshot { mtime_secs, size, ..p.clone() };
                self.store.set_snapshot(rel, snapshot);
                self.store.commit()?;
                return Ok(FileOutcome::Unchanged);
            }
        }

        // Parse before touching the index: a parse failure must leave the
        // file's prior documents intact.
        let text = String::from_utf8_lossy(&bytes);
        let cues = vtt::parse(&text)?;

        if let Some(p) = &prior {
            for id in &p.doc_ids {
                self.store.delete(*id);
            }
        }
        let ids = self.store.allocate_doc_ids(cues.len());
        let scope = scope_for_path(rel);
        let doc_ids: Vec<_> = ids.collect();
        for (cue, id) in cues.iter().zip(&doc_ids) {
            self.store.upsert(&Document {
                id: *id,
                file: rel.to_string(),
                scope: scope.clone(),
                cue_index: cue.index,
                start: cue.start,
                end: cue.end,
                text: cue.text.clone(),
            })?;
        }
        self.store.set_snapshot(rel, FileSnapshot { mtime_secs, size, content_hash, doc_ids });
        self.store.commit()?;

        Ok(if prior.is_some() { FileOutcome::Updated } else { FileOutcome::Added })
    }
}

fn xxh64(bytes: &[u8]) -> u64 {
    let mut hasher = XxHash64::with_seed(0);
    hasher.write(bytes);
    hasher.finish()
}

/// Sorted (relative path, absolute path) pairs for every transcript under
/// the root. Relative paths use '/' separators so they are stable identities
/// across platforms.
pub fn list_transcripts(root: &Path) -> Vec<(String, PathBuf)> {
    let mut files = Vec::new();
    for entry in walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) != Some(TRANSCRIPT_EXT) {
            continue;
        }
        let rel = path.strip_prefix(root).unwrap_or(path);
        let rel = rel
            .components()
            .filter_map(|c| match c {
                Component::Normal(s) => s.to_str(),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("/");
        files.push((rel, path.to_path_buf()));
    }
    files.sort();
    files
}

/// Scope facet of a transcript: the first two directory components of its
/// relative path (collection/sub-collection), or as many as exist.
pub fn scope_for_path(rel: &str) -> String {
    let parent = Path::new(rel).parent().unwrap_or_else(|| Path::new(""));
    let parts: Vec<&str> = parent
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => s.to_str(),
            _ => None,
        })
        .take(2)
        .collect();
    if parts.is_empty() {
        "/misc".to_string()
    } else {
        format!("/{}", parts.join("/"))
    }
}
