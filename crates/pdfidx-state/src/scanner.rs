//! Directory scanner: turns filesystem state into an ordered event log.
//!
//! Two tables own the persisted state: `scopes` (named roots) and `files`
//! (the last-observed snapshot per path). A third, `events`, holds the
//! ordered, collapsed delta log that `Scanner::scan` appends to and that
//! consumers drain with `next_events`/`close_event`.

use pdfidx_core::error::ScannerError;
use pdfidx_core::types::{EntryTarget, Event, EventKind, FileRecord};
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use tracing::debug;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS scopes (
    name TEXT PRIMARY KEY,
    path TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS files (
    id INTEGER PRIMARY KEY,
    scope TEXT NOT NULL,
    path TEXT NOT NULL,
    mtime INTEGER NOT NULL,
    children TEXT,
    UNIQUE(scope, path)
);

CREATE TABLE IF NOT EXISTS events (
    id INTEGER PRIMARY KEY,
    kind TEXT NOT NULL,
    target TEXT NOT NULL,
    path TEXT NOT NULL,
    scope TEXT NOT NULL,
    mtime INTEGER NOT NULL,
    UNIQUE(scope, path, target)
);
"#;

pub struct Scanner {
    conn: Connection,
}

impl Scanner {
    pub fn open(path: &Path) -> Result<Self, ScannerError> {
        let conn = crate::db::open_connection(path).map_err(ScannerError::sqlite)?;
        conn.execute_batch(SCHEMA_SQL).map_err(ScannerError::sqlite)?;
        Ok(Self { conn })
    }

    /// Reconcile the `scopes` table against the desired `{name -> root}` map.
    /// Scopes dropped from `sources` synthesize `Removed` events for every
    /// `FileRecord` previously observed under them.
    pub fn commit_sources(
        &self,
        sources: &std::collections::HashMap<String, PathBuf>,
    ) -> Result<(), ScannerError> {
        for (name, path) in sources {
            if name.is_empty() {
                return Err(ScannerError::EmptyScopeName);
            }
            self.conn
                .execute(
                    "INSERT INTO scopes(name, path) VALUES (?1, ?2)
                     ON CONFLICT(name) DO UPDATE SET path = excluded.path",
                    params![name, path.to_string_lossy()],
                )
                .map_err(ScannerError::sqlite)?;
        }

        let existing = self.list_scope_names()?;
        for name in existing {
            if sources.contains_key(&name) {
                continue;
            }
            let records = self.list_file_records(&name)?;
            for record in &records {
                self.record_event(
                    &name,
                    &record.relative_path,
                    record.target(),
                    EventKind::Removed,
                    record.mtime,
                )?;
            }
            self.conn
                .execute("DELETE FROM files WHERE scope = ?1", params![name])
                .map_err(ScannerError::sqlite)?;
            self.conn
                .execute("DELETE FROM scopes WHERE name = ?1", params![name])
                .map_err(ScannerError::sqlite)?;
        }
        Ok(())
    }

    /// Breadth-first walk of every committed scope, diffing against the
    /// stored snapshot and appending collapsed events.
    pub fn scan(&self) -> Result<(), ScannerError> {
        self.scan_with_cancel(&|| false)
    }

    pub fn scan_with_cancel(&self, check_cancel: &dyn Fn() -> bool) -> Result<(), ScannerError> {
        for (name, root) in self.list_scopes()? {
            self.scan_scope(&name, &root, check_cancel)?;
        }
        Ok(())
    }

    fn scan_scope(
        &self,
        scope: &str,
        root: &Path,
        check_cancel: &dyn Fn() -> bool,
    ) -> Result<(), ScannerError> {
        let mut queue: VecDeque<String> = VecDeque::new();
        queue.push_back(String::new());

        while let Some(rel) = queue.pop_front() {
            if check_cancel() {
                return Err(ScannerError::Interrupted);
            }

            let abs = join_relative(root, &rel);
            let existing = self.get_file_record(scope, &rel)?;
            let metadata = std::fs::metadata(&abs).ok();

            match (metadata, existing) {
                (None, None) => {}
                (None, Some(record)) => {
                    self.remove_subtree(scope, &record)?;
                }
                (Some(meta), None) => {
                    let mtime = file_mtime(&meta);
                    if meta.is_dir() {
                        let children = list_children(&abs)?;
                        self.insert_file_record(scope, &rel, mtime, Some(&children))?;
                        self.record_event(scope, &rel, EntryTarget::Directory, EventKind::Added, mtime)?;
                        for child in &children {
                            queue.push_back(join_rel(&rel, child));
                        }
                    } else {
                        self.insert_file_record(scope, &rel, mtime, None)?;
                        self.record_event(scope, &rel, EntryTarget::File, EventKind::Added, mtime)?;
                    }
                }
                (Some(meta), Some(record)) => {
                    let mtime = file_mtime(&meta);
                    let stored_is_dir = record.is_dir();
                    if stored_is_dir != meta.is_dir() {
                        self.remove_subtree(scope, &record)?;
                        if meta.is_dir() {
                            let children = list_children(&abs)?;
                            self.insert_file_record(scope, &rel, mtime, Some(&children))?;
                            self.record_event(
                                scope,
                                &rel,
                                EntryTarget::Directory,
                                EventKind::Added,
                                mtime,
                            )?;
                            for child in &children {
                                queue.push_back(join_rel(&rel, child));
                            }
                        } else {
                            self.insert_file_record(scope, &rel, mtime, None)?;
                            self.record_event(scope, &rel, EntryTarget::File, EventKind::Added, mtime)?;
                        }
                        continue;
                    }

                    if meta.is_dir() {
                        let new_children = list_children(&abs)?;
                        if mtime == record.mtime {
                            for child in &new_children {
                                queue.push_back(join_rel(&rel, child));
                            }
                            continue;
                        }
                        let old_set: HashSet<&String> =
                            record.children.as_deref().unwrap_or(&[]).iter().collect();
                        let new_set: HashSet<&String> = new_children.iter().collect();
                        for vanished in old_set.difference(&new_set) {
                            let child_rel = join_rel(&rel, vanished);
                            if let Some(child_record) = self.get_file_record(scope, &child_rel)? {
                                self.remove_subtree(scope, &child_record)?;
                            }
                        }
                        self.update_file_record(scope, &rel, mtime, Some(&new_children))?;
                        self.record_event(
                            scope,
                            &rel,
                            EntryTarget::Directory,
                            EventKind::Updated,
                            mtime,
                        )?;
                        for child in &new_children {
                            queue.push_back(join_rel(&rel, child));
                        }
                    } else if mtime != record.mtime {
                        self.update_file_record(scope, &rel, mtime, None)?;
                        self.record_event(scope, &rel, EntryTarget::File, EventKind::Updated, mtime)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Recursively delete a `FileRecord` (and, if it is a directory, every
    /// descendant) and emit `Removed` events for each.
    fn remove_subtree(&self, scope: &str, record: &FileRecord) -> Result<(), ScannerError> {
        if let Some(children) = &record.children {
            for child in children {
                let child_rel = join_rel(&record.relative_path, child);
                if let Some(child_record) = self.get_file_record(scope, &child_rel)? {
                    self.remove_subtree(scope, &child_record)?;
                }
            }
        }
        self.record_event(scope, &record.relative_path, record.target(), EventKind::Removed, record.mtime)?;
        self.conn
            .execute(
                "DELETE FROM files WHERE scope = ?1 AND path = ?2",
                params![scope, record.relative_path],
            )
            .map_err(ScannerError::sqlite)?;
        Ok(())
    }

    /// Apply the event-log collapse rules for `(scope, path, target)`.
    fn record_event(
        &self,
        scope: &str,
        path: &str,
        target: EntryTarget,
        kind: EventKind,
        mtime: i64,
    ) -> Result<(), ScannerError> {
        let existing: Option<(i64, String)> = self
            .conn
            .query_row(
                "SELECT id, kind FROM events WHERE scope = ?1 AND path = ?2 AND target = ?3",
                params![scope, path, target.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(ScannerError::sqlite)?;

        match existing {
            None => {
                self.conn
                    .execute(
                        "INSERT INTO events(kind, target, path, scope, mtime) VALUES (?1, ?2, ?3, ?4, ?5)",
                        params![kind.as_str(), target.as_str(), path, scope, mtime],
                    )
                    .map_err(ScannerError::sqlite)?;
            }
            Some((id, existing_kind)) => {
                let existing_kind = EventKind::parse(&existing_kind)
                    .ok_or_else(|| ScannerError::sqlite("corrupt event kind"))?;
                match (existing_kind, kind) {
                    (EventKind::Added, EventKind::Removed) => {
                        self.conn
                            .execute("DELETE FROM events WHERE id = ?1", params![id])
                            .map_err(ScannerError::sqlite)?;
                    }
                    (EventKind::Added, EventKind::Updated) | (_, EventKind::Added) => {
                        debug!(scope, path, "collapsed event dropped per table");
                    }
                    (EventKind::Updated, EventKind::Updated) => {
                        self.conn
                            .execute("UPDATE events SET mtime = ?1 WHERE id = ?2", params![mtime, id])
                            .map_err(ScannerError::sqlite)?;
                    }
                    (EventKind::Updated, EventKind::Removed)
                    | (EventKind::Removed, EventKind::Updated)
                    | (EventKind::Removed, EventKind::Removed) => {
                        self.conn
                            .execute(
                                "UPDATE events SET kind = ?1, mtime = ?2 WHERE id = ?3",
                                params![kind.as_str(), mtime, id],
                            )
                            .map_err(ScannerError::sqlite)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Next pending events in ascending id order, without consuming them.
    pub fn next_events(&self, limit: usize) -> Result<Vec<Event>, ScannerError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, kind, target, scope, path, mtime FROM events ORDER BY id ASC LIMIT ?1",
            )
            .map_err(ScannerError::sqlite)?;
        let rows = stmt
            .query_map(params![limit as i64], |row| {
                let kind: String = row.get(1)?;
                let target: String = row.get(2)?;
                Ok(Event {
                    id: row.get(0)?,
                    kind: EventKind::parse(&kind).unwrap_or(EventKind::Updated),
                    target: EntryTarget::parse(&target).unwrap_or(EntryTarget::File),
                    scope: row.get(3)?,
                    relative_path: row.get(4)?,
                    mtime: row.get(5)?,
                })
            })
            .map_err(ScannerError::sqlite)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(ScannerError::sqlite)
    }

    /// Explicitly close (delete) an event after the consumer has committed
    /// whatever it did in response. Exactly-once consumption.
    pub fn close_event(&self, id: i64) -> Result<(), ScannerError> {
        self.conn
            .execute("DELETE FROM events WHERE id = ?1", params![id])
            .map_err(ScannerError::sqlite)?;
        Ok(())
    }

    fn list_scope_names(&self) -> Result<Vec<String>, ScannerError> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM scopes ORDER BY name")
            .map_err(ScannerError::sqlite)?;
        let rows = stmt
            .query_map([], |row| row.get(0))
            .map_err(ScannerError::sqlite)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(ScannerError::sqlite)
    }

    pub fn list_scopes(&self) -> Result<Vec<(String, PathBuf)>, ScannerError> {
        let mut stmt = self
            .conn
            .prepare("SELECT name, path FROM scopes ORDER BY name")
            .map_err(ScannerError::sqlite)?;
        let rows = stmt
            .query_map([], |row| {
                let name: String = row.get(0)?;
                let path: String = row.get(1)?;
                Ok((name, PathBuf::from(path)))
            })
            .map_err(ScannerError::sqlite)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(ScannerError::sqlite)
    }

    fn list_file_records(&self, scope: &str) -> Result<Vec<FileRecord>, ScannerError> {
        let mut stmt = self
            .conn
            .prepare("SELECT path, mtime, children FROM files WHERE scope = ?1")
            .map_err(ScannerError::sqlite)?;
        let rows = stmt
            .query_map(params![scope], |row| {
                let path: String = row.get(0)?;
                let mtime: i64 = row.get(1)?;
                let children: Option<String> = row.get(2)?;
                Ok(FileRecord {
                    scope: scope.to_string(),
                    relative_path: path,
                    mtime,
                    children: children.map(|c| FileRecord::decode_children(&c)),
                })
            })
            .map_err(ScannerError::sqlite)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(ScannerError::sqlite)
    }

    fn get_file_record(&self, scope: &str, rel: &str) -> Result<Option<FileRecord>, ScannerError> {
        self.conn
            .query_row(
                "SELECT mtime, children FROM files WHERE scope = ?1 AND path = ?2",
                params![scope, rel],
                |row| {
                    let mtime: i64 = row.get(0)?;
                    let children: Option<String> = row.get(1)?;
                    Ok(FileRecord {
                        scope: scope.to_string(),
                        relative_path: rel.to_string(),
                        mtime,
                        children: children.map(|c| FileRecord::decode_children(&c)),
                    })
                },
            )
            .optional()
            .map_err(ScannerError::sqlite)
    }

    fn insert_file_record(
        &self,
        scope: &str,
        rel: &str,
        mtime: i64,
        children: Option<&[String]>,
    ) -> Result<(), ScannerError> {
        let encoded = children.map(FileRecord::encode_children);
        self.conn
            .execute(
                "INSERT INTO files(scope, path, mtime, children) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(scope, path) DO UPDATE SET mtime = excluded.mtime, children = excluded.children",
                params![scope, rel, mtime, encoded],
            )
            .map_err(ScannerError::sqlite)?;
        Ok(())
    }

    fn update_file_record(
        &self,
        scope: &str,
        rel: &str,
        mtime: i64,
        children: Option<&[String]>,
    ) -> Result<(), ScannerError> {
        self.insert_file_record(scope, rel, mtime, children)
    }
}

fn join_relative(root: &Path, rel: &str) -> PathBuf {
    if rel.is_empty() {
        root.to_path_buf()
    } else {
        root.join(rel)
    }
}

fn join_rel(parent: &str, child: &str) -> String {
    if parent.is_empty() {
        child.to_string()
    } else {
        format!("{parent}/{child}")
    }
}

fn list_children(abs: &Path) -> Result<Vec<String>, ScannerError> {
    let mut names: Vec<String> = std::fs::read_dir(abs)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    Ok(names)
}

fn file_mtime(meta: &std::fs::Metadata) -> i64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn scanner_with_scope(root: &Path) -> Scanner {
        let db_dir = tempfile::tempdir().unwrap();
        let scanner = Scanner::open(&db_dir.path().join("scanner.sqlite3")).unwrap();
        std::mem::forget(db_dir);
        let mut sources = HashMap::new();
        sources.insert("main".to_string(), root.to_path_buf());
        scanner.commit_sources(&sources).unwrap();
        scanner
    }

    #[test]
    fn initial_scan_emits_added_for_every_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("foobar"), "x").unwrap();
        std::fs::create_dir_all(dir.path().join("earth")).unwrap();
        std::fs::write(dir.path().join("earth/land"), "x").unwrap();

        let scanner = scanner_with_scope(dir.path());
        scanner.scan().unwrap();

        let events = scanner.next_events(100).unwrap();
        assert!(events.iter().all(|e| e.kind == EventKind::Added));
        let paths: HashSet<&str> = events.iter().map(|e| e.relative_path.as_str()).collect();
        assert!(paths.contains(""));
        assert!(paths.contains("foobar"));
        assert!(paths.contains("earth"));
        assert!(paths.contains("earth/land"));
    }

    #[test]
    fn unchanged_tree_yields_no_events_on_second_scan() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "x").unwrap();
        let scanner = scanner_with_scope(dir.path());
        scanner.scan().unwrap();
        for e in scanner.next_events(100).unwrap() {
            scanner.close_event(e.id).unwrap();
        }

        scanner.scan().unwrap();
        assert!(scanner.next_events(100).unwrap().is_empty());
    }

    #[test]
    fn removed_file_emits_removed_event() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("a.txt");
        std::fs::write(&file_path, "x").unwrap();
        let scanner = scanner_with_scope(dir.path());
        scanner.scan().unwrap();
        for e in scanner.next_events(100).unwrap() {
            scanner.close_event(e.id).unwrap();
        }

        std::fs::remove_file(&file_path).unwrap();
        scanner.scan().unwrap();
        let events = scanner.next_events(100).unwrap();
        let removed: Vec<&Event> = events
            .iter()
            .filter(|e| e.relative_path == "a.txt")
            .collect();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].kind, EventKind::Removed);
    }

    #[test]
    fn added_then_removed_before_consumption_cancels_out() {
        let dir = tempfile::tempdir().unwrap();
        let scanner = scanner_with_scope(dir.path());
        scanner
            .record_event("main", "x", EntryTarget::File, EventKind::Added, 1)
            .unwrap();
        scanner
            .record_event("main", "x", EntryTarget::File, EventKind::Removed, 2)
            .unwrap();
        let events = scanner.next_events(100).unwrap();
        assert!(events.iter().all(|e| e.relative_path != "x"));
    }

    #[test]
    fn commit_sources_drops_scope_and_emits_removed_for_known_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "x").unwrap();
        let scanner = scanner_with_scope(dir.path());
        scanner.scan().unwrap();
        for e in scanner.next_events(100).unwrap() {
            scanner.close_event(e.id).unwrap();
        }

        scanner.commit_sources(&HashMap::new()).unwrap();
        let events = scanner.next_events(100).unwrap();
        assert!(events.iter().any(|e| e.relative_path == "a.txt" && e.kind == EventKind::Removed));
    }
}
