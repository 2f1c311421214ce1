//! Event-driven reconciliation between the scanner's event log, the
//! content-addressed page store, and the two secondary indexes.
//!
//! `IndexCoordinator` owns a `files(id, type, scope, path, hash)` ledger and
//! a `pages(id, pdf_hash, page_index, hash)` table that mirrors each
//! ingested document's page list, and applies one [`Event`] at a time:
//! insert/update/delete the `files` row, run the ingest pipeline when the
//! path's content hash is new, then run the release pipeline once no
//! `files` row references the old hash any more. Ingest always commits
//! before release runs, so a page shared between the old and new content of
//! the same path is never garbage-collected out from under itself. A page's
//! refcount is never stored directly — it is `COUNT(*) FROM pages WHERE
//! hash = ?`, the same pattern `files` already uses to decide when a
//! `pdf_hash` has gone unreferenced.
//!
//! Calls to [`IndexCoordinator::process_event`] are not internally
//! serialized: callers that drive multiple pool workers must route event
//! application through a single thread (the pool is for the concurrent
//! parse/embed work that precedes a commit, not for concurrent commits).

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Mutex;

use pdfidx_core::error::CoordinatorError;
use pdfidx_core::types::{EntryTarget, Event, EventKind, NodeType, Segment, annotation_node_id};
use pdfidx_state::lexical::LexicalIndex;
use pdfidx_state::page_store::PageStore;
use pdfidx_vector::{EmbeddingProvider, VectorIndex};
use rusqlite::{OptionalExtension, params};

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS files (
    id INTEGER PRIMARY KEY,
    type TEXT NOT NULL,
    scope TEXT NOT NULL,
    path TEXT NOT NULL,
    hash TEXT NOT NULL,
    UNIQUE(scope, path)
);

CREATE TABLE IF NOT EXISTS pages (
    id INTEGER PRIMARY KEY,
    pdf_hash TEXT NOT NULL,
    page_index INTEGER NOT NULL,
    hash TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_coordinator_pages_hash ON pages(hash);
CREATE INDEX IF NOT EXISTS idx_coordinator_pages_pdf_hash ON pages(pdf_hash, page_index);
"#;

pub struct IndexCoordinator {
    conn: rusqlite::Connection,
    page_store: PageStore,
    lexical: LexicalIndex,
    vector: VectorIndex,
}

impl IndexCoordinator {
    pub fn open(
        coordinator_db: &Path,
        page_store_db: &Path,
        pages_dir: &Path,
        lexical_db: &Path,
        vector_dir: &Path,
        dimensions: usize,
        metric: pdfidx_core::types::DistanceMetric,
    ) -> Result<Self, CoordinatorError> {
        let conn = pdfidx_state::db::open_connection(coordinator_db).map_err(CoordinatorError::sqlite)?;
        conn.execute_batch(SCHEMA_SQL).map_err(CoordinatorError::sqlite)?;
        let page_store = PageStore::open(page_store_db, pages_dir)?;
        let lexical = LexicalIndex::open(lexical_db)?;
        let vector = VectorIndex::open(vector_dir, dimensions, metric)?;
        Ok(Self { conn, page_store, lexical, vector })
    }

    /// Apply a single scanner event. The caller should only `close_event`
    /// against the scanner once this returns `Ok`: on `Err` the event stays
    /// unconsumed and a later scan retries it.
    pub fn process_event(
        &self,
        event: &Event,
        root: &Path,
        embedder: &Mutex<Box<dyn EmbeddingProvider + Send>>,
        check_cancel: &dyn Fn() -> bool,
    ) -> Result<(), CoordinatorError> {
        if event.target != EntryTarget::File {
            return Ok(());
        }

        let existing_hash: Option<String> = self
            .conn
            .query_row(
                "SELECT hash FROM files WHERE scope = ?1 AND path = ?2",
                params![event.scope, event.relative_path],
                |row| row.get(0),
            )
            .optional()
            .map_err(CoordinatorError::sqlite)?;

        let new_hash = if event.kind == EventKind::Removed {
            None
        } else {
            let abs = root.join(&event.relative_path);
            Some(
                pdfidx_core::hash::sha512_base64_file(&abs)
                    .map_err(|e| CoordinatorError::Consistency(format!("hash {}: {e}", event.relative_path)))?,
            )
        };

        if existing_hash == new_hash {
            return Ok(());
        }

        // Ingest before touching the `files` row: if it fails or is
        // interrupted, the row must still reflect `existing_hash` so the
        // next scan retries this path instead of treating it as settled.
        if let Some(hash) = &new_hash {
            let abs = root.join(&event.relative_path);
            self.ingest_pdf(hash, &abs, embedder, check_cancel)?;
        }

        match &new_hash {
            Some(hash) => {
                self.conn
                    .execute(
                        "INSERT INTO files(type, scope, path, hash) VALUES (?1, ?2, ?3, ?4)
                         ON CONFLICT(scope, path) DO UPDATE SET hash = excluded.hash",
                        params![EntryTarget::File.as_str(), event.scope, event.relative_path, hash],
                    )
                    .map_err(CoordinatorError::sqlite)?;
            }
            None => {
                self.conn
                    .execute(
                        "DELETE FROM files WHERE scope = ?1 AND path = ?2",
                        params![event.scope, event.relative_path],
                    )
                    .map_err(CoordinatorError::sqlite)?;
            }
        }

        if let Some(old_hash) = &existing_hash {
            let remaining: i64 = self
                .conn
                .query_row("SELECT COUNT(*) FROM files WHERE hash = ?1", params![old_hash], |row| row.get(0))
                .map_err(CoordinatorError::sqlite)?;
            if remaining == 0 {
                self.release_pdf(old_hash)?;
            }
        }

        Ok(())
    }

    /// Every `(scope, relative_path)` currently pointing at `pdf_hash`, used
    /// by queries to resolve a matched document back to its on-disk paths.
    pub fn paths_for_pdf_hash(&self, pdf_hash: &str) -> Result<Vec<(String, String)>, CoordinatorError> {
        let mut stmt = self
            .conn
            .prepare("SELECT scope, path FROM files WHERE hash = ?1 ORDER BY scope, path")
            .map_err(CoordinatorError::sqlite)?;
        let rows = stmt
            .query_map(params![pdf_hash], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
            .map_err(CoordinatorError::sqlite)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(CoordinatorError::sqlite)?;
        Ok(rows)
    }

    pub fn page_store(&self) -> &PageStore {
        &self.page_store
    }

    pub fn lexical(&self) -> &LexicalIndex {
        &self.lexical
    }

    pub fn vector(&self) -> &VectorIndex {
        &self.vector
    }

    /// Cancellable, revertible: on interrupt or error, every node this call
    /// saved is removed from both indexes before the error propagates.
    fn ingest_pdf(
        &self,
        pdf_hash: &str,
        file_path: &Path,
        embedder: &Mutex<Box<dyn EmbeddingProvider + Send>>,
        check_cancel: &dyn Fn() -> bool,
    ) -> Result<(), CoordinatorError> {
        let mut saved_node_ids: Vec<String> = Vec::new();
        let result = self.ingest_pdf_inner(pdf_hash, file_path, embedder, check_cancel, &mut saved_node_ids);
        if result.is_err() {
            for node_id in &saved_node_ids {
                let _ = self.lexical.remove(node_id);
                let _ = self.vector.remove(node_id);
            }
        }
        result
    }

    fn ingest_pdf_inner(
        &self,
        pdf_hash: &str,
        file_path: &Path,
        embedder: &Mutex<Box<dyn EmbeddingProvider + Send>>,
        check_cancel: &dyn Fn() -> bool,
        saved_node_ids: &mut Vec<String>,
    ) -> Result<(), CoordinatorError> {
        let doc = self.page_store.ingest(pdf_hash, file_path, check_cancel)?;
        if check_cancel() {
            return Err(CoordinatorError::Interrupted);
        }

        self.save_node(pdf_hash, NodeType::Pdf.as_str(), &doc.metadata.header_text(), embedder)?;
        saved_node_ids.push(pdf_hash.to_string());

        for page in &doc.pages {
            if check_cancel() {
                return Err(CoordinatorError::Interrupted);
            }
            if !self.insert_page_row(pdf_hash, page.page_index, &page.page_hash)? {
                // Already indexed by an earlier reference to this page's content.
                continue;
            }

            self.save_node(&page.page_hash, NodeType::PdfPage.as_str(), &page.plain_text, embedder)?;
            saved_node_ids.push(page.page_hash.clone());

            for (index, annotation) in page.annotations.iter().enumerate() {
                if let Some(content) = &annotation.content {
                    let node_id = annotation_node_id(&page.page_hash, index, false);
                    self.save_node(&node_id, NodeType::PdfPageAnnoContent.as_str(), content, embedder)?;
                    saved_node_ids.push(node_id);
                }
                if let Some(extracted) = &annotation.extracted_text {
                    let node_id = annotation_node_id(&page.page_hash, index, true);
                    self.save_node(&node_id, NodeType::PdfPageAnnoExtracted.as_str(), extracted, embedder)?;
                    saved_node_ids.push(node_id);
                }
            }
        }
        Ok(())
    }

    /// Non-cancellable best-effort cleanup: `pdf_hash` has no remaining
    /// `files` reference, so drop its "pdf" node, its rows in `pages`, and
    /// every page whose refcount just hit zero.
    fn release_pdf(&self, pdf_hash: &str) -> Result<(), CoordinatorError> {
        let doc = self.page_store.document_or_none(pdf_hash)?;
        self.page_store.release(pdf_hash)?;
        self.lexical.remove(pdf_hash)?;
        self.vector.remove(pdf_hash)?;

        let Some(doc) = doc else { return Ok(()) };
        self.conn
            .execute("DELETE FROM pages WHERE pdf_hash = ?1", params![pdf_hash])
            .map_err(CoordinatorError::sqlite)?;

        let mut seen = HashSet::new();
        for page in &doc.pages {
            if !seen.insert(page.page_hash.clone()) {
                continue;
            }
            let remaining: i64 = self
                .conn
                .query_row("SELECT COUNT(*) FROM pages WHERE hash = ?1", params![page.page_hash], |row| row.get(0))
                .map_err(CoordinatorError::sqlite)?;
            if remaining > 0 {
                continue;
            }
            self.lexical.remove(&page.page_hash)?;
            self.vector.remove(&page.page_hash)?;
            for index in 0..page.annotations.len() {
                let content_id = annotation_node_id(&page.page_hash, index, false);
                let extracted_id = annotation_node_id(&page.page_hash, index, true);
                self.lexical.remove(&content_id)?;
                self.vector.remove(&content_id)?;
                self.lexical.remove(&extracted_id)?;
                self.vector.remove(&extracted_id)?;
            }
        }
        Ok(())
    }

    fn save_node(
        &self,
        node_id: &str,
        node_type: &str,
        text: &str,
        embedder: &Mutex<Box<dyn EmbeddingProvider + Send>>,
    ) -> Result<(), CoordinatorError> {
        let segments = paragraph_segments(text);
        let metadata: HashMap<String, serde_json::Value> = HashMap::new();
        self.lexical.save(node_id, node_type, &segments, &metadata)?;
        let mut guard = embedder.lock().unwrap();
        self.vector.save(node_id, node_type, &segments, &metadata, guard.as_mut())?;
        Ok(())
    }

    /// Records this document's reference to `page_hash` at `page_index` and
    /// returns `true` if it is the page's first recorded reference — the
    /// same `COUNT(*)` test `process_event` already uses to decide when a
    /// `pdf_hash` has gone unreferenced, applied to `pages` instead of
    /// `files`.
    fn insert_page_row(&self, pdf_hash: &str, page_index: usize, page_hash: &str) -> Result<bool, CoordinatorError> {
        self.conn
            .execute(
                "INSERT INTO pages(pdf_hash, page_index, hash) VALUES (?1, ?2, ?3)",
                params![pdf_hash, page_index as i64, page_hash],
            )
            .map_err(CoordinatorError::sqlite)?;
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM pages WHERE hash = ?1", params![page_hash], |row| row.get(0))
            .map_err(CoordinatorError::sqlite)?;
        Ok(count == 1)
    }
}

/// Split on blank lines so highlight spans can point at a paragraph instead
/// of an entire page; falls back to one segment spanning the whole text.
fn paragraph_segments(text: &str) -> Vec<Segment> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    let mut segments = Vec::new();
    let mut offset = 0usize;
    for part in text.split("\n\n") {
        let start = offset;
        let end = start + part.len();
        offset = end + 2;
        let trimmed = part.trim();
        if !trimmed.is_empty() {
            segments.push(Segment { start, end, text: trimmed.to_string() });
        }
    }
    if segments.is_empty() {
        segments.push(Segment { start: 0, end: text.len(), text: text.to_string() });
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::*;
    use pdfidx_core::types::{DistanceMetric, EntryTarget};
    use pdfidx_vector::DeterministicEmbeddingProvider;

    fn make_embedder() -> Mutex<Box<dyn EmbeddingProvider + Send>> {
        Mutex::new(Box::new(DeterministicEmbeddingProvider::new("test-model", 8)))
    }

    fn open_coordinator(dir: &Path) -> IndexCoordinator {
        IndexCoordinator::open(
            &dir.join("coordinator.sqlite3"),
            &dir.join("pages.sqlite3"),
            &dir.join("pages"),
            &dir.join("lexical.sqlite3"),
            &dir.join("vectors"),
            8,
            DistanceMetric::Cosine,
        )
        .unwrap()
    }

    fn single_page_pdf_with_text(text: &str) -> Vec<u8> {
        use lopdf::content::Content;
        use lopdf::{Object, Stream, dictionary};

        let mut doc = lopdf::Document::with_version("1.5");
        let content = Content { operations: vec![lopdf::content::Operation::new("Tj", vec![Object::string_literal(text)])] };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let font_id = doc.add_object(dictionary! { "Type" => "Font", "Subtype" => "Type1", "BaseFont" => "Helvetica" });
        let resources_id = doc.add_object(dictionary! { "Font" => dictionary! { "F1" => font_id } });
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        });
        let pages_id = doc.add_object(dictionary! { "Type" => "Pages", "Kids" => vec![page_id.into()], "Count" => 1 });
        doc.objects.get_mut(&page_id).unwrap().as_dict_mut().unwrap().set("Parent", pages_id);
        let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
        doc.trailer.set("Root", catalog_id);
        let mut buf = Vec::new();
        doc.save_to(&mut buf).unwrap();
        buf
    }

    fn added_event(relative_path: &str, mtime: i64) -> Event {
        Event {
            id: 1,
            kind: EventKind::Added,
            target: EntryTarget::File,
            scope: "main".into(),
            relative_path: relative_path.into(),
            mtime,
        }
    }

    #[test]
    fn ingesting_a_pdf_makes_its_page_text_searchable() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("report.pdf"), single_page_pdf_with_text("quarterly revenue analysis")).unwrap();
        let coordinator = open_coordinator(dir.path());
        let embedder = make_embedder();

        coordinator.process_event(&added_event("report.pdf", 1), dir.path(), &embedder, &|| false).unwrap();

        let results = coordinator.lexical.query("revenue analysis", pdfidx_state::lexical::QueryMode::AndOnly).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].node_type, "pdf.page");
    }

    #[test]
    fn removing_a_file_drops_its_pdf_node_once_unreferenced() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("report.pdf"), single_page_pdf_with_text("quarterly revenue analysis")).unwrap();
        let coordinator = open_coordinator(dir.path());
        let embedder = make_embedder();
        coordinator.process_event(&added_event("report.pdf", 1), dir.path(), &embedder, &|| false).unwrap();

        let removed = Event {
            id: 2,
            kind: EventKind::Removed,
            target: EntryTarget::File,
            scope: "main".into(),
            relative_path: "report.pdf".into(),
            mtime: 1,
        };
        coordinator.process_event(&removed, dir.path(), &embedder, &|| false).unwrap();

        let results = coordinator.lexical.query("revenue analysis", pdfidx_state::lexical::QueryMode::AndOnly).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn two_paths_sharing_identical_page_content_index_the_page_once() {
        let dir = tempfile::tempdir().unwrap();
        let bytes = single_page_pdf_with_text("shared boilerplate text");
        std::fs::write(dir.path().join("a.pdf"), &bytes).unwrap();
        std::fs::write(dir.path().join("b.pdf"), &bytes).unwrap();
        let coordinator = open_coordinator(dir.path());
        let embedder = make_embedder();

        coordinator.process_event(&added_event("a.pdf", 1), dir.path(), &embedder, &|| false).unwrap();
        coordinator.process_event(&added_event("b.pdf", 1), dir.path(), &embedder, &|| false).unwrap();

        let results = coordinator.lexical.query("shared boilerplate", pdfidx_state::lexical::QueryMode::AndOnly).unwrap();
        assert_eq!(results.len(), 1);

        // Removing one path must not remove the page the other still references.
        let removed = Event {
            id: 3,
            kind: EventKind::Removed,
            target: EntryTarget::File,
            scope: "main".into(),
            relative_path: "a.pdf".into(),
            mtime: 1,
        };
        coordinator.process_event(&removed, dir.path(), &embedder, &|| false).unwrap();
        let results = coordinator.lexical.query("shared boilerplate", pdfidx_state::lexical::QueryMode::AndOnly).unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn interrupted_ingest_leaves_no_partial_nodes_behind() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("report.pdf"), single_page_pdf_with_text("interrupted ingest text")).unwrap();
        let coordinator = open_coordinator(dir.path());
        let embedder = make_embedder();

        let result = coordinator.process_event(&added_event("report.pdf", 1), dir.path(), &embedder, &|| true);
        assert!(result.is_err());

        let results = coordinator.lexical.query("interrupted ingest", pdfidx_state::lexical::QueryMode::OrExcludingAnd).unwrap();
        assert!(results.is_empty());
    }
}
