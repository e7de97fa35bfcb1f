//! Persistent cue index with atomic, batched visibility.
//!
//! A tantivy index holds the inverted postings and the stored document
//! table; a versioned `meta.json` sidecar carries the doc-id allocator and
//! the per-file snapshot table used by the incremental indexer. Writers are
//! serialized behind the `IndexWriter` mutex; readers always observe the
//! last committed state (a searcher acquired before a commit keeps its
//! segment view until dropped).

use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use tantivy::collector::{Count, TopDocs};
use tantivy::query::{BooleanQuery, Occur, Query, QueryParser, TermQuery};
use tantivy::schema::{Facet, Field, IndexRecordOption, Value};
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term};
use tracing::{debug, warn};

use uttale_core::types::{DocId, Document, FileSnapshot, IndexMeta};
use uttale_core::{Error, Result};

use crate::indexer::scope_for_path;
use crate::schema::{build_schema, register_tokenizer};

const META_FILE: &str = "meta.json";
const META_VERSION: u32 = 1;
const WRITER_HEAP_BYTES: usize = 50_000_000;

struct Fields {
    doc_id: Field,
    file: Field,
    scope: Field,
    scope_text: Field,
    cue_index: Field,
    start: Field,
    end: Field,
    text: Field,
}

pub struct IndexStore {
    index: Index,
    writer: Mutex<IndexWriter>,
    reader: IndexReader,
    meta: RwLock<IndexMeta>,
    meta_path: PathBuf,
    fields: Fields,
}

fn idx_err(e: impl std::fmt::Display) -> Error {
    Error::Index(e.to_string())
}

/// Atomic replace via temp file + rename.
fn write_meta(path: &Path, meta: &IndexMeta) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    let data = serde_json::to_vec_pretty(meta).map_err(idx_err)?;
    std::fs::write(&tmp, data)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

impl IndexStore {
    /// Open (or create) the index under `dir`. Opening is idempotent; a
    /// present-but-unreadable index or meta file is `IndexCorrupt`.
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let meta_path = dir.join(META_FILE);
        let tantivy_dir = dir.join("tantivy");

        let (index, meta) = if meta_path.exists() {
            let raw = std::fs::read(&meta_path)
                .map_err(|e| Error::IndexCorrupt(format!("unreadable {META_FILE}: {e}")))?;
            let meta: IndexMeta = serde_json::from_slice(&raw)
                .map_err(|e| Error::IndexCorrupt(format!("invalid {META_FILE}: {e}")))?;
            if meta.version != META_VERSION {
                return Err(Error::IndexCorrupt(format!(
                    "incompatible index version {} (expected {META_VERSION})",
                    meta.version
                )));
            }
            let index = Index::open_in_dir(&tantivy_dir)
                .map_err(|e| Error::IndexCorrupt(format!("cannot open index: {e}")))?;
            (index, meta)
        } else {
            if tantivy_dir.exists() {
                return Err(Error::IndexCorrupt(format!(
                    "index segments present but {META_FILE} missing in {}",
                    dir.display()
                )));
            }
            std::fs::create_dir_all(&tantivy_dir)?;
            let index = Index::create_in_dir(&tantivy_dir, build_schema()).map_err(idx_err)?;
            let meta = IndexMeta { version: META_VERSION, ..IndexMeta::default() };
            // Written eagerly so a crash before the first commit still
            // leaves a well-formed index directory.
            write_meta(&meta_path, &meta)?;
            (index, meta)
        };

        register_tokenizer(&index);
        let schema = index.schema();
        let fields = Fields {
            doc_id: schema.get_field("doc_id").map_err(idx_err)?,
            file: schema.get_field("file").map_err(idx_err)?,
            scope: schema.get_field("scope").map_err(idx_err)?,
            scope_text: schema.get_field("scope_text").map_err(idx_err)?,
            cue_index: schema.get_field("cue_index").map_err(idx_err)?,
            start: schema.get_field("start").map_err(idx_err)?,
            end: schema.get_field("end").map_err(idx_err)?,
            text: schema.get_field("text").map_err(idx_err)?,
        };
        let writer = index.writer(WRITER_HEAP_BYTES).map_err(idx_err)?;
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .map_err(idx_err)?;

        let store = Self {
            index,
            writer: Mutex::new(writer),
            reader,
            meta: RwLock::new(meta),
            meta_path,
            fields,
        };
        store.reconcile()?;
        Ok(store)
    }

    /// Reconcile segment state with the meta sidecar after an unclean stop.
    /// The tantivy commit and the meta write are not one atomic step; a
    /// crash between them leaves documents the snapshot table does not know
    /// about, or an allocator behind the committed ids. Meta is the source
    /// of truth for the snapshot table, the index for the id high-water
    /// mark.
    fn reconcile(&self) -> Result<()> {
        let committed = self.committed_doc_ids()?;
        if committed.is_empty() {
            return Ok(());
        }
        let (known, next_doc_id, tracked) = {
            let meta = self.meta.read().expect("meta lock poisoned");
            let known: std::collections::BTreeSet<DocId> = meta
                .snapshots
                .values()
                .flat_map(|s| s.doc_ids.iter().copied())
                .collect();
            (known, meta.next_doc_id, !meta.snapshots.is_empty())
        };
        let max_committed = committed.iter().copied().max().unwrap_or(0);
        // Orphans are only meaningful once the indexer owns the corpus; a
        // store written to directly has an empty snapshot table and its
        // documents are left alone.
        let orphans: Vec<DocId> = if tracked {
            committed.into_iter().filter(|id| !known.contains(id)).collect()
        } else {
            Vec::new()
        };
        if orphans.is_empty() && max_committed < next_doc_id {
            return Ok(());
        }
        if max_committed >= next_doc_id {
            let mut meta = self.meta.write().expect("meta lock poisoned");
            meta.next_doc_id = max_committed + 1;
        }
        if !orphans.is_empty() {
            warn!(orphans = orphans.len(), "removing documents from an interrupted commit");
            for id in orphans {
                self.delete(id);
            }
        }
        self.commit()
    }

    fn committed_doc_ids(&self) -> Result<Vec<DocId>> {
        let searcher = self.reader.searcher();
        let mut ids = Vec::new();
        for segment_reader in searcher.segment_readers() {
            let column = segment_reader.fast_fields().u64("doc_id").map_err(idx_err)?;
            for doc in segment_reader.doc_ids_alive() {
                if let Some(id) = column.first(doc) {
                    ids.push(id);
                }
            }
        }
        Ok(ids)
    }

    /// Reserve `n` fresh document ids. Ids are monotonic and never reused;
    /// the high-water mark persists with the next commit.
    pub fn allocate_doc_ids(&self, n: usize) -> Range<DocId> {
        let mut meta = self.meta.write().expect("meta lock poisoned");
        let first = meta.next_doc_id;
        meta.next_doc_id += n as DocId;
        first..meta.next_doc_id
    }

    /// Stage a document. Deletes any committed document carrying the same id
    /// first, so re-upserting an id replaces rather than duplicates.
    pub fn upsert(&self, document: &Document) -> Result<()> {
        let writer = self.writer.lock().expect("writer lock poisoned");
        writer.delete_term(Term::from_field_u64(self.fields.doc_id, document.id));
        let scope_facet = Facet::from_text(&document.scope)
            .map_err(|e| idx_err(format!("bad scope facet {:?}: {e}", document.scope)))?;
        writer
            .add_document(doc!(
                self.fields.doc_id => document.id,
                self.fields.file => document.file.clone(),
                self.fields.scope => scope_facet,
                self.fields.scope_text => document.scope.clone(),
                self.fields.cue_index => document.cue_index as u64,
                self.fields.start => document.start,
                self.fields.end => document.end,
                self.fields.text => document.text.clone(),
            ))
            .map_err(idx_err)?;
        Ok(())
    }

    /// Stage a deletion. Takes effect at the next commit.
    pub fn delete(&self, document_id: DocId) {
        let writer = self.writer.lock().expect("writer lock poisoned");
        writer.delete_term(Term::from_field_u64(self.fields.doc_id, document_id));
    }

    /// Atomically publish all staged upserts/deletes and persist the meta
    /// sidecar. Readers opened after this call see the full batch; readers
    /// opened before it see none of it.
    pub fn commit(&self) -> Result<()> {
        {
            let mut writer = self.writer.lock().expect("writer lock poisoned");
            writer.commit().map_err(idx_err)?;
        }
        self.reader.reload().map_err(idx_err)?;
        let meta = self.meta.read().expect("meta lock poisoned").clone();
        self.persist_meta(&meta)
    }

    fn persist_meta(&self, meta: &IndexMeta) -> Result<()> {
        write_meta(&self.meta_path, meta)
    }

    /// Ranked search over cue text. `scope` restricts candidates to files
    /// under that facet before ranking; ties on score order by
    /// (file, cue_index, doc_id) so earlier cues in a file rank first.
    pub fn search(
        &self,
        query_text: &str,
        scope: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<(DocId, f32)>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let searcher = self.reader.searcher();
        let query_parser = QueryParser::for_index(&self.index, vec![self.fields.text]);
        let text_query = query_parser
            .parse_query(query_text)
            .map_err(|e| Error::InvalidQuery(e.to_string()))?;
        let query: Box<dyn Query> = match scope.filter(|s| !s.trim().is_empty()) {
            Some(scope) => {
                let normalized = if scope.starts_with('/') {
                    scope.to_string()
                } else {
                    format!("/{scope}")
                };
                let facet = Facet::from_text(&normalized)
                    .map_err(|e| Error::InvalidQuery(format!("bad scope {scope:?}: {e}")))?;
                let scope_query = TermQuery::new(
                    Term::from_facet(self.fields.scope, &facet),
                    IndexRecordOption::Basic,
                );
                Box::new(BooleanQuery::new(vec![
                    (Occur::Must, text_query),
                    (Occur::Must, Box::new(scope_query)),
                ]))
            }
            None => text_query,
        };

        // Ties can straddle a page boundary; collecting only limit+offset
        // docs would let segment order decide which tied documents survive.
        // Collect the full match set and slice after ordering.
        let total = searcher.search(&query, &Count).map_err(idx_err)?;
        if total == 0 || offset >= total {
            return Ok(Vec::new());
        }
        let top_docs = searcher
            .search(&query, &TopDocs::with_limit(total))
            .map_err(idx_err)?;
        debug!(candidates = top_docs.len(), "search collected");

        // BM25 scores tie across documents with identical term stats, so a
        // deterministic total order is imposed here instead of in a custom
        // collector: score desc, then (file, cue_index, doc_id) asc.
        let mut ranked = Vec::with_capacity(top_docs.len());
        for (score, addr) in top_docs {
            let doc: TantivyDocument = searcher.doc(addr).map_err(idx_err)?;
            let stored = self.document_from_stored(&doc)?;
            ranked.push((score, stored.file, stored.cue_index, stored.id));
        }
        ranked.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.1.cmp(&b.1))
                .then_with(|| a.2.cmp(&b.2))
                .then_with(|| a.3.cmp(&b.3))
        });
        Ok(ranked
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|(score, _, _, id)| (id, score))
            .collect())
    }

    /// Resolve a committed document id. Retired or never-issued ids are
    /// `NotFound`.
    pub fn lookup(&self, document_id: DocId) -> Result<Document> {
        let searcher = self.reader.searcher();
        let query = TermQuery::new(
            Term::from_field_u64(self.fields.doc_id, document_id),
            IndexRecordOption::Basic,
        );
        let top_docs = searcher
            .search(&query, &TopDocs::with_limit(1))
            .map_err(idx_err)?;
        let (_, addr) = top_docs
            .into_iter()
            .next()
            .ok_or_else(|| Error::NotFound(format!("document {document_id}")))?;
        let doc: TantivyDocument = searcher.doc(addr).map_err(idx_err)?;
        self.document_from_stored(&doc)
    }

    fn document_from_stored(&self, doc: &TantivyDocument) -> Result<Document> {
        let missing = |field: &str| idx_err(format!("stored document missing field {field}"));
        let get_u64 = |f: Field, name: &str| {
            doc.get_first(f).and_then(|v| v.as_u64()).ok_or_else(|| missing(name))
        };
        let get_f64 = |f: Field, name: &str| {
            doc.get_first(f).and_then(|v| v.as_f64()).ok_or_else(|| missing(name))
        };
        let get_str = |f: Field, name: &str| {
            doc.get_first(f)
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .ok_or_else(|| missing(name))
        };
        Ok(Document {
            id: get_u64(self.fields.doc_id, "doc_id")?,
            file: get_str(self.fields.file, "file")?,
            scope: get_str(self.fields.scope_text, "scope_text")?,
            cue_index: get_u64(self.fields.cue_index, "cue_index")? as usize,
            start: get_f64(self.fields.start, "start")?,
            end: get_f64(self.fields.end, "end")?,
            text: get_str(self.fields.text, "text")?,
        })
    }

    /// Known scope identifiers, derived from the snapshot table.
    pub fn scopes(&self) -> Vec<String> {
        let meta = self.meta.read().expect("meta lock poisoned");
        let mut scopes: Vec<String> =
            meta.snapshots.keys().map(|p| scope_for_path(p)).collect();
        scopes.sort();
        scopes.dedup();
        scopes
    }

    pub fn snapshot(&self, path: &str) -> Option<FileSnapshot> {
        self.meta
            .read()
            .expect("meta lock poisoned")
            .snapshots
            .get(path)
            .cloned()
    }

    pub fn snapshot_paths(&self) -> Vec<String> {
        self.meta
            .read()
            .expect("meta lock poisoned")
            .snapshots
            .keys()
            .cloned()
            .collect()
    }

    pub fn set_snapshot(&self, path: &str, snapshot: FileSnapshot) {
        self.meta
            .write()
            .expect("meta lock poisoned")
            .snapshots
            .insert(path.to_string(), snapshot);
    }

    pub fn remove_snapshot(&self, path: &str) {
        self.meta
            .write()
            .expect("meta lock poisoned")
            .snapshots
            .remove(path);
    }
}
