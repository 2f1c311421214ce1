//! Tokenized full-text index backed by a raw SQLite FTS5 virtual table.
//!
//! One row in `contents` holds the space-joined concatenation of every
//! segment's tokens for a node; `nodes` carries the node's metadata and an
//! encoded `len:start-end,…` string aligned with that token stream, so a
//! query can walk back from a token-position match to the segment it fell
//! in without a second, denormalized copy of the tokens.

use pdfidx_core::constants::FTS_RANK_DECAY;
use pdfidx_core::error::LexicalError;
use pdfidx_core::types::{IndexNode, Matching, MatchedSegment, Segment};
use rusqlite::{OptionalExtension, params};
use std::collections::{HashMap, HashSet};
use std::path::Path;

const SCHEMA_SQL: &str = r#"
CREATE VIRTUAL TABLE IF NOT EXISTS contents USING fts5(
    content,
    tokenize = 'unicode61 remove_diacritics 2'
);

CREATE TABLE IF NOT EXISTS nodes (
    node_id TEXT PRIMARY KEY,
    type TEXT NOT NULL,
    metadata TEXT NOT NULL,
    segments TEXT NOT NULL,
    content_id INTEGER NOT NULL
);
"#;

const SEPARATORS: &[char] = &['-', '+', ':', '!', '"', '\'', '{', '}', ',', '.'];
const RESERVED: &[&str] = &["near", "and", "or", "not"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryMode {
    AndOnly,
    OrExcludingAnd,
}

pub struct LexicalIndex {
    conn: rusqlite::Connection,
}

impl LexicalIndex {
    pub fn open(path: &Path) -> Result<Self, LexicalError> {
        let conn = crate::db::open_connection(path).map_err(LexicalError::sqlite)?;
        conn.execute_batch(SCHEMA_SQL).map_err(LexicalError::sqlite)?;
        Ok(Self { conn })
    }

    pub fn save(
        &self,
        node_id: &str,
        node_type: &str,
        segments: &[Segment],
        metadata: &HashMap<String, serde_json::Value>,
    ) -> Result<(), LexicalError> {
        self.remove(node_id)?;

        let mut all_tokens: Vec<String> = Vec::new();
        let mut encoded_parts: Vec<String> = Vec::new();
        for seg in segments {
            let tokens = tokenize(&seg.text);
            encoded_parts.push(format!("{}:{}-{}", tokens.len(), seg.start, seg.end));
            all_tokens.extend(tokens);
        }
        let content = all_tokens.join(" ");
        let encoded_segments = encoded_parts.join(",");
        let metadata_json = serde_json::to_string(metadata).unwrap_or_else(|_| "{}".into());

        self.conn
            .execute("INSERT INTO contents(content) VALUES (?1)", params![content])
            .map_err(LexicalError::sqlite)?;
        let content_id = self.conn.last_insert_rowid();

        self.conn
            .execute(
                "INSERT INTO nodes(node_id, type, metadata, segments, content_id) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![node_id, node_type, metadata_json, encoded_segments, content_id],
            )
            .map_err(LexicalError::sqlite)?;
        Ok(())
    }

    pub fn remove(&self, node_id: &str) -> Result<(), LexicalError> {
        let content_id: Option<i64> = self
            .conn
            .query_row(
                "SELECT content_id FROM nodes WHERE node_id = ?1",
                params![node_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(LexicalError::sqlite)?;
        if let Some(content_id) = content_id {
            self.conn
                .execute("DELETE FROM contents WHERE rowid = ?1", params![content_id])
                .map_err(LexicalError::sqlite)?;
            self.conn
                .execute("DELETE FROM nodes WHERE node_id = ?1", params![node_id])
                .map_err(LexicalError::sqlite)?;
        }
        Ok(())
    }

    pub fn query(&self, text: &str, mode: QueryMode) -> Result<Vec<IndexNode>, LexicalError> {
        let query_tokens = tokenize(text);
        if query_tokens.is_empty() {
            return Ok(Vec::new());
        }
        let n = query_tokens.len();
        let query_set: HashSet<&str> = query_tokens.iter().map(String::as_str).collect();
        let match_expr = build_match_expr(&query_tokens, mode);

        let mut stmt = self
            .conn
            .prepare(
                "SELECT n.node_id, n.type, n.metadata, n.segments, c.content
                 FROM contents c JOIN nodes n ON n.content_id = c.rowid
                 WHERE c.content MATCH ?1",
            )
            .map_err(LexicalError::sqlite)?;

        let rows = stmt
            .query_map(params![match_expr], |row| {
                let node_id: String = row.get(0)?;
                let node_type: String = row.get(1)?;
                let metadata: String = row.get(2)?;
                let segments: String = row.get(3)?;
                let content: String = row.get(4)?;
                Ok((node_id, node_type, metadata, segments, content))
            })
            .map_err(LexicalError::sqlite)?;

        let matching = match mode {
            QueryMode::AndOnly => Matching::Matched,
            QueryMode::OrExcludingAnd => Matching::MatchedPartial,
        };

        let mut nodes = Vec::new();
        for row in rows {
            let (node_id, node_type, metadata_json, segments_enc, content) =
                row.map_err(LexicalError::sqlite)?;
            let all_tokens: Vec<&str> = content.split(' ').filter(|s| !s.is_empty()).collect();
            let decoded_segments = decode_segments(&segments_enc);

            let mut cursor = 0usize;
            let mut slot = vec![false; n + 1];
            let mut matched_segments = Vec::new();

            for (len, start, end) in decoded_segments {
                let seg_tokens = all_tokens.get(cursor..cursor + len).unwrap_or(&[]);
                cursor += len;
                let mut matched: Vec<String> = seg_tokens
                    .iter()
                    .filter(|t| query_set.contains(**t))
                    .map(|t| t.to_string())
                    .collect();
                matched.sort();
                matched.dedup();
                let k = matched.len();
                if k == 0 {
                    continue;
                }
                let p = n - k;
                slot[p] = true;
                matched_segments.push(MatchedSegment { start, end, matched_tokens: matched });
            }

            if matched_segments.is_empty() {
                continue;
            }

            let fts_rank: f64 = slot
                .iter()
                .enumerate()
                .filter(|(_, hit)| **hit)
                .map(|(p, _)| FTS_RANK_DECAY.powi(p as i32))
                .sum();

            nodes.push(IndexNode {
                node_id,
                node_type,
                matching,
                metadata: serde_json::from_str(&metadata_json).unwrap_or_default(),
                fts_rank,
                vector_distance: 0.0,
                segments: matched_segments,
            });
        }
        Ok(nodes)
    }
}

fn build_match_expr(tokens: &[String], mode: QueryMode) -> String {
    let quoted: Vec<String> = tokens.iter().map(|t| format!("\"{}\"", t.replace('"', "\"\""))).collect();
    match mode {
        QueryMode::AndOnly => quoted.join(" AND "),
        QueryMode::OrExcludingAnd => {
            format!("({}) NOT ({})", quoted.join(" OR "), quoted.join(" AND "))
        }
    }
}

fn decode_segments(encoded: &str) -> Vec<(usize, usize, usize)> {
    if encoded.is_empty() {
        return Vec::new();
    }
    encoded
        .split(',')
        .filter_map(|part| {
            let (len_str, range) = part.split_once(':')?;
            let (start_str, end_str) = range.split_once('-')?;
            Some((len_str.parse().ok()?, start_str.parse().ok()?, end_str.parse().ok()?))
        })
        .collect()
}

/// Tokenize: lowercase, pre-split custom separators, fold common Latin
/// diacritics, drop reserved query words and the empty string.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut normalized = String::with_capacity(text.len());
    for c in text.chars() {
        if SEPARATORS.contains(&c) {
            normalized.push(' ');
        } else {
            normalized.push(fold_diacritic(c).to_ascii_lowercase());
        }
    }
    normalized
        .split_whitespace()
        .filter(|t| !t.is_empty() && !RESERVED.contains(t))
        .map(str::to_string)
        .collect()
}

fn fold_diacritic(c: char) -> char {
    match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'À' | 'Á' | 'Â' | 'Ã' | 'Ä' | 'Å' => 'a',
        'è' | 'é' | 'ê' | 'ë' | 'È' | 'É' | 'Ê' | 'Ë' => 'e',
        'ì' | 'í' | 'î' | 'ï' | 'Ì' | 'Í' | 'Î' | 'Ï' => 'i',
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'Ò' | 'Ó' | 'Ô' | 'Õ' | 'Ö' => 'o',
        'ù' | 'ú' | 'û' | 'ü' | 'Ù' | 'Ú' | 'Û' | 'Ü' => 'u',
        'ñ' | 'Ñ' => 'n',
        'ç' | 'Ç' => 'c',
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(start: usize, end: usize, text: &str) -> Segment {
        Segment { start, end, text: text.to_string() }
    }

    #[test]
    fn tokenize_drops_reserved_words_and_separators() {
        let tokens = tokenize("Transference-analysis AND \"quoted\" near OR empty,");
        assert_eq!(tokens, vec!["transference", "analysis", "quoted", "empty"]);
    }

    #[test]
    fn tokenize_folds_common_diacritics() {
        assert_eq!(tokenize("café"), vec!["cafe"]);
    }

    #[test]
    fn and_query_returns_only_fully_matched_node() {
        let dir = tempfile::tempdir().unwrap();
        let index = LexicalIndex::open(&dir.path().join("fts.sqlite3")).unwrap();

        index
            .save(
                "id1",
                "pdf.page",
                &[segment(0, 20, "a study of transference")],
                &HashMap::new(),
            )
            .unwrap();
        index
            .save(
                "id2",
                "pdf.page",
                &[segment(0, 30, "transference analysis in practice")],
                &HashMap::new(),
            )
            .unwrap();

        let and_results = index.query("Transference analysis", QueryMode::AndOnly).unwrap();
        let ids: Vec<&str> = and_results.iter().map(|n| n.node_id.as_str()).collect();
        assert_eq!(ids, vec!["id2"]);
        assert_eq!(and_results[0].segments[0].matched_tokens, vec!["analysis", "transference"]);

        let or_results = index.query("Transference analysis", QueryMode::OrExcludingAnd).unwrap();
        let ids: Vec<&str> = or_results.iter().map(|n| n.node_id.as_str()).collect();
        assert_eq!(ids, vec!["id1"]);
    }

    #[test]
    fn remove_drops_node_from_future_queries() {
        let dir = tempfile::tempdir().unwrap();
        let index = LexicalIndex::open(&dir.path().join("fts.sqlite3")).unwrap();
        index
            .save("id2", "pdf.page", &[segment(0, 10, "transference analysis")], &HashMap::new())
            .unwrap();
        index.remove("id2").unwrap();

        assert!(index.query("Transference analysis", QueryMode::AndOnly).unwrap().is_empty());
    }

    #[test]
    fn fts_rank_dedupes_multiple_segments_at_same_level() {
        let dir = tempfile::tempdir().unwrap();
        let index = LexicalIndex::open(&dir.path().join("fts.sqlite3")).unwrap();
        // two segments each matching exactly one of the two query tokens (k=1, p=1 for both)
        index
            .save(
                "id1",
                "pdf.page",
                &[segment(0, 10, "transference only"), segment(10, 25, "analysis elsewhere")],
                &HashMap::new(),
            )
            .unwrap();

        let results = index.query("transference analysis", QueryMode::OrExcludingAnd).unwrap();
        assert_eq!(results.len(), 1);
        // both segments land on p = 2 - 1 = 1, deduped to a single 0.35^1 contribution.
        assert!((results[0].fts_rank - FTS_RANK_DECAY).abs() < 1e-9);
    }
}
