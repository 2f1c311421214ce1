//! Content-addressed PDF page cache. `pdfs`/`pages` rows live in
//! `pages.sqlite3`; page blobs, text snapshots, and annotation JSON live as
//! files under `pages/{page_hash}.*`, refcounted by how many `pages` rows
//! reference the hash.

use pdfidx_core::error::PageStoreError;
use pdfidx_core::hash::sha512_base64;
use pdfidx_core::ids::new_local_id;
use pdfidx_core::types::{Annotation, PdfDocument, PdfMetadata, PdfPage};
use rusqlite::{OptionalExtension, params};
use std::path::{Path, PathBuf};

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS pdfs (
    id INTEGER PRIMARY KEY,
    hash TEXT NOT NULL UNIQUE,
    meta TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS pages (
    id INTEGER PRIMARY KEY,
    pdf_id INTEGER NOT NULL REFERENCES pdfs(id),
    hash TEXT NOT NULL,
    idx INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_pages_hash ON pages(hash);
CREATE INDEX IF NOT EXISTS idx_pages_pdf_idx ON pages(pdf_id, idx);
"#;

/// A read-only view of a cached page, independent of which document it
/// came from.
#[derive(Debug, Clone)]
pub struct StoredPage {
    pub page_hash: String,
    pub plain_text: String,
    pub annotations: Vec<Annotation>,
}

pub struct PageStore {
    conn: rusqlite::Connection,
    pages_dir: PathBuf,
}

impl PageStore {
    pub fn open(db_path: &Path, pages_dir: &Path) -> Result<Self, PageStoreError> {
        let conn = crate::db::open_connection(db_path).map_err(PageStoreError::sqlite)?;
        conn.execute_batch(SCHEMA_SQL).map_err(PageStoreError::sqlite)?;
        std::fs::create_dir_all(pages_dir)?;
        Ok(Self {
            conn,
            pages_dir: pages_dir.to_path_buf(),
        })
    }

    /// `check_cancel` is polled once per page, between that page's row
    /// insert and its (possibly first-reference) file write, so an
    /// interrupt lands before the next page's disk work starts rather than
    /// only between whole documents.
    pub fn ingest(&self, pdf_hash: &str, file_path: &Path, check_cancel: &dyn Fn() -> bool) -> Result<PdfDocument, PageStoreError> {
        if let Some(doc) = self.document_or_none(pdf_hash)? {
            return Ok(doc);
        }

        let page_blobs = crate::pdf::split_pages(file_path)?;
        let whole_doc = lopdf::Document::load(file_path)
            .map_err(|e| PageStoreError::PdfParseFailed { path: e.to_string() })?;
        let metadata = crate::pdf::parse_metadata(&whole_doc);
        let meta_json = serde_json::to_string(&metadata).unwrap_or_default();

        let tx = self.conn.unchecked_transaction().map_err(PageStoreError::sqlite)?;
        tx.execute(
            "INSERT INTO pdfs(hash, meta) VALUES (?1, ?2)",
            params![pdf_hash, meta_json],
        )
        .map_err(PageStoreError::sqlite)?;
        let pdf_id = tx.last_insert_rowid();

        let mut pages = Vec::with_capacity(page_blobs.len());
        let mut newly_written: Vec<String> = Vec::new();

        for (idx, blob) in page_blobs.iter().enumerate() {
            if check_cancel() {
                for written in &newly_written {
                    self.remove_page_files(written);
                }
                return Err(PageStoreError::Interrupted);
            }

            let page_hash = sha512_base64(blob);
            tx.execute(
                "INSERT INTO pages(pdf_id, hash, idx) VALUES (?1, ?2, ?3)",
                params![pdf_id, page_hash, idx as i64],
            )
            .map_err(PageStoreError::sqlite)?;

            let reference_count: i64 = tx
                .query_row(
                    "SELECT COUNT(*) FROM pages WHERE hash = ?1",
                    params![page_hash],
                    |row| row.get(0),
                )
                .map_err(PageStoreError::sqlite)?;
            let is_first_reference = reference_count == 1;

            let (plain_text, annotations) = if is_first_reference {
                match self.write_page_files(&page_hash, blob) {
                    Ok(pair) => {
                        newly_written.push(page_hash.clone());
                        pair
                    }
                    Err(e) => {
                        for written in &newly_written {
                            self.remove_page_files(written);
                        }
                        return Err(e);
                    }
                }
            } else {
                self.read_page_text_and_annotations(&page_hash)?
            };

            pages.push(PdfPage {
                page_hash,
                pdf_hash: pdf_hash.to_string(),
                page_index: idx,
                plain_text,
                annotations,
            });
        }

        tx.commit().map_err(PageStoreError::sqlite)?;
        Ok(PdfDocument {
            pdf_hash: pdf_hash.to_string(),
            metadata,
            pages,
        })
    }

    /// Drop the `pdfs`/`pages` rows for `pdf_hash`, then delete any page
    /// file set that is no longer referenced.
    pub fn release(&self, pdf_hash: &str) -> Result<(), PageStoreError> {
        let pdf_id: Option<i64> = self
            .conn
            .query_row("SELECT id FROM pdfs WHERE hash = ?1", params![pdf_hash], |row| row.get(0))
            .optional()
            .map_err(PageStoreError::sqlite)?;
        let Some(pdf_id) = pdf_id else {
            return Ok(());
        };

        let page_hashes: Vec<String> = {
            let mut stmt = self
                .conn
                .prepare("SELECT DISTINCT hash FROM pages WHERE pdf_id = ?1")
                .map_err(PageStoreError::sqlite)?;
            let rows = stmt
                .query_map(params![pdf_id], |row| row.get(0))
                .map_err(PageStoreError::sqlite)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(PageStoreError::sqlite)?
        };

        self.conn
            .execute("DELETE FROM pages WHERE pdf_id = ?1", params![pdf_id])
            .map_err(PageStoreError::sqlite)?;
        self.conn
            .execute("DELETE FROM pdfs WHERE id = ?1", params![pdf_id])
            .map_err(PageStoreError::sqlite)?;

        for hash in page_hashes {
            let still_referenced: i64 = self
                .conn
                .query_row("SELECT COUNT(*) FROM pages WHERE hash = ?1", params![hash], |row| row.get(0))
                .map_err(PageStoreError::sqlite)?;
            if still_referenced == 0 {
                self.remove_page_files(&hash);
            }
        }
        Ok(())
    }

    pub fn document_or_none(&self, pdf_hash: &str) -> Result<Option<PdfDocument>, PageStoreError> {
        let row: Option<(i64, String)> = self
            .conn
            .query_row(
                "SELECT id, meta FROM pdfs WHERE hash = ?1",
                params![pdf_hash],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(PageStoreError::sqlite)?;
        let Some((pdf_id, meta_json)) = row else {
            return Ok(None);
        };
        let metadata: PdfMetadata = serde_json::from_str(&meta_json).unwrap_or_default();

        let mut stmt = self
            .conn
            .prepare("SELECT hash, idx FROM pages WHERE pdf_id = ?1 ORDER BY idx ASC")
            .map_err(PageStoreError::sqlite)?;
        let rows = stmt
            .query_map(params![pdf_id], |row| {
                let hash: String = row.get(0)?;
                let idx: i64 = row.get(1)?;
                Ok((hash, idx as usize))
            })
            .map_err(PageStoreError::sqlite)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(PageStoreError::sqlite)?;

        let mut pages = Vec::with_capacity(rows.len());
        for (page_hash, page_index) in rows {
            let (plain_text, annotations) = self.read_page_text_and_annotations(&page_hash)?;
            pages.push(PdfPage {
                page_hash,
                pdf_hash: pdf_hash.to_string(),
                page_index,
                plain_text,
                annotations,
            });
        }

        Ok(Some(PdfDocument {
            pdf_hash: pdf_hash.to_string(),
            metadata,
            pages,
        }))
    }

    pub fn page(&self, page_hash: &str) -> Result<Option<StoredPage>, PageStoreError> {
        let exists: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM pages WHERE hash = ?1", params![page_hash], |row| row.get(0))
            .map_err(PageStoreError::sqlite)?;
        if exists == 0 {
            return Ok(None);
        }
        let (plain_text, annotations) = self.read_page_text_and_annotations(page_hash)?;
        Ok(Some(StoredPage {
            page_hash: page_hash.to_string(),
            plain_text,
            annotations,
        }))
    }

    /// Every `pdf_hash` that currently owns a page with this hash, used by
    /// queries to resolve a matched page back to its containing document(s).
    pub fn pdf_hashes_for_page(&self, page_hash: &str) -> Result<Vec<String>, PageStoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT pdfs.hash FROM pages JOIN pdfs ON pdfs.id = pages.pdf_id WHERE pages.hash = ?1")
            .map_err(PageStoreError::sqlite)?;
        let rows = stmt
            .query_map(params![page_hash], |row| row.get::<_, String>(0))
            .map_err(PageStoreError::sqlite)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(PageStoreError::sqlite)?;
        Ok(rows)
    }

    fn write_page_files(&self, page_hash: &str, blob: &[u8]) -> Result<(String, Vec<Annotation>), PageStoreError> {
        let (plain_text, annotations) = crate::pdf::extract(blob)?;

        let tmp_dir = self.pages_dir.join(format!(".tmp-{}", new_local_id()));
        std::fs::create_dir_all(&tmp_dir)?;

        let pdf_tmp = tmp_dir.join("page.pdf");
        std::fs::write(&pdf_tmp, blob)?;
        std::fs::rename(&pdf_tmp, self.pdf_path(page_hash))?;

        if !plain_text.is_empty() {
            let snap_tmp = tmp_dir.join("page.snapshot.txt");
            std::fs::write(&snap_tmp, &plain_text)?;
            std::fs::rename(&snap_tmp, self.snapshot_path(page_hash))?;
        }
        if !annotations.is_empty() {
            let json = serde_json::to_string(&annotations)
                .map_err(|e| PageStoreError::Consistency(e.to_string()))?;
            let anno_tmp = tmp_dir.join("page.annotation.json");
            std::fs::write(&anno_tmp, json)?;
            std::fs::rename(&anno_tmp, self.annotation_path(page_hash))?;
        }

        let _ = std::fs::remove_dir(&tmp_dir);
        Ok((plain_text, annotations))
    }

    fn read_page_text_and_annotations(&self, page_hash: &str) -> Result<(String, Vec<Annotation>), PageStoreError> {
        let plain_text = std::fs::read_to_string(self.snapshot_path(page_hash)).unwrap_or_default();
        let annotations = std::fs::read_to_string(self.annotation_path(page_hash))
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default();
        Ok((plain_text, annotations))
    }

    fn remove_page_files(&self, page_hash: &str) {
        let _ = std::fs::remove_file(self.pdf_path(page_hash));
        let _ = std::fs::remove_file(self.snapshot_path(page_hash));
        let _ = std::fs::remove_file(self.annotation_path(page_hash));
    }

    fn pdf_path(&self, page_hash: &str) -> PathBuf {
        self.pages_dir.join(format!("{page_hash}.pdf"))
    }

    fn snapshot_path(&self, page_hash: &str) -> PathBuf {
        self.pages_dir.join(format!("{page_hash}.snapshot.txt"))
    }

    fn annotation_path(&self, page_hash: &str) -> PathBuf {
        self.pages_dir.join(format!("{page_hash}.annotation.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{Document, Stream, dictionary};

    fn write_single_page_pdf(dir: &Path, name: &str, text: &str) -> PathBuf {
        let mut doc = Document::with_version("1.5");
        let content = lopdf::content::Content {
            operations: vec![lopdf::content::Operation::new(
                "Tj",
                vec![lopdf::Object::string_literal(text)],
            )],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Contents" => content_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        });
        let pages_id = doc.add_object(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        });
        doc.objects
            .get_mut(&page_id)
            .unwrap()
            .as_dict_mut()
            .unwrap()
            .set("Parent", pages_id);
        let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
        doc.trailer.set("Root", catalog_id);

        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        doc.save_to(&mut file).unwrap();
        path
    }

    fn write_multi_page_pdf(dir: &Path, name: &str, page_texts: &[&str]) -> PathBuf {
        let mut doc = Document::with_version("1.5");
        let mut page_ids = Vec::with_capacity(page_texts.len());
        for text in page_texts {
            let content = lopdf::content::Content {
                operations: vec![lopdf::content::Operation::new("Tj", vec![lopdf::Object::string_literal(*text)])],
            };
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Contents" => content_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            });
            page_ids.push(page_id);
        }
        let pages_id = doc.add_object(dictionary! {
            "Type" => "Pages",
            "Kids" => page_ids.iter().map(|id| (*id).into()).collect::<Vec<_>>(),
            "Count" => page_ids.len() as i64,
        });
        for page_id in &page_ids {
            doc.objects.get_mut(page_id).unwrap().as_dict_mut().unwrap().set("Parent", pages_id);
        }
        let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
        doc.trailer.set("Root", catalog_id);

        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        doc.save_to(&mut file).unwrap();
        path
    }

    #[test]
    fn ingest_is_idempotent_on_same_hash() {
        let dir = tempfile::tempdir().unwrap();
        let pdf_path = write_single_page_pdf(dir.path(), "a.pdf", "hello");
        let store = PageStore::open(&dir.path().join("pages.sqlite3"), &dir.path().join("pages")).unwrap();

        let bytes = std::fs::read(&pdf_path).unwrap();
        let hash = sha512_base64(&bytes);

        let first = store.ingest(&hash, &pdf_path, &|| false).unwrap();
        let second = store.ingest(&hash, &pdf_path, &|| false).unwrap();
        assert_eq!(first.pages.len(), second.pages.len());
        assert_eq!(first.pages[0].page_hash, second.pages[0].page_hash);
    }

    #[test]
    fn release_removes_unreferenced_page_files() {
        let dir = tempfile::tempdir().unwrap();
        let pdf_path = write_single_page_pdf(dir.path(), "a.pdf", "hello");
        let pages_dir = dir.path().join("pages");
        let store = PageStore::open(&dir.path().join("pages.sqlite3"), &pages_dir).unwrap();

        let bytes = std::fs::read(&pdf_path).unwrap();
        let hash = sha512_base64(&bytes);
        let doc = store.ingest(&hash, &pdf_path, &|| false).unwrap();
        let page_hash = doc.pages[0].page_hash.clone();
        assert!(pages_dir.join(format!("{page_hash}.pdf")).exists());

        store.release(&hash).unwrap();
        assert!(!pages_dir.join(format!("{page_hash}.pdf")).exists());
        assert!(store.document_or_none(&hash).unwrap().is_none());
    }

    #[test]
    fn cancelling_between_pages_leaves_no_page_files_or_rows_behind() {
        let dir = tempfile::tempdir().unwrap();
        let pdf_path = write_multi_page_pdf(dir.path(), "a.pdf", &["first page", "second page", "third page"]);
        let pages_dir = dir.path().join("pages");
        let store = PageStore::open(&dir.path().join("pages.sqlite3"), &pages_dir).unwrap();

        let bytes = std::fs::read(&pdf_path).unwrap();
        let hash = sha512_base64(&bytes);

        // Let the first page through, then cancel before the second.
        let seen = std::cell::Cell::new(0u32);
        let result = store.ingest(&hash, &pdf_path, &|| {
            let n = seen.get();
            seen.set(n + 1);
            n >= 1
        });

        assert!(matches!(result, Err(PageStoreError::Interrupted)));
        assert!(store.document_or_none(&hash).unwrap().is_none());
        let leftover = std::fs::read_dir(&pages_dir).unwrap().count();
        assert_eq!(leftover, 0, "no page file should survive a mid-ingest cancel");
    }
}
