//! Shared vocabulary for the indexing engine: scopes, scanner events, the PDF
//! content-addressed model, and the node/segment shape stored in both
//! secondary indexes.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A named handle for a root directory the scanner watches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope {
    pub name: String,
    pub abs_path: String,
}

/// What kind of filesystem entry an event or record refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryTarget {
    File,
    Directory,
}

impl EntryTarget {
    pub fn as_str(self) -> &'static str {
        match self {
            EntryTarget::File => "file",
            EntryTarget::Directory => "directory",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "file" => Some(EntryTarget::File),
            "directory" => Some(EntryTarget::Directory),
            _ => None,
        }
    }
}

/// The kind of change a scanner event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Added,
    Updated,
    Removed,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Added => "added",
            EventKind::Updated => "updated",
            EventKind::Removed => "removed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "added" => Some(EventKind::Added),
            "updated" => Some(EventKind::Updated),
            "removed" => Some(EventKind::Removed),
            _ => None,
        }
    }
}

/// A scanner-owned snapshot row for one `(scope, relative_path)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub scope: String,
    pub relative_path: String,
    pub mtime: i64,
    /// Present iff the entry is a directory: immediate child names.
    pub children: Option<Vec<String>>,
}

impl FileRecord {
    pub fn is_dir(&self) -> bool {
        self.children.is_some()
    }

    pub fn target(&self) -> EntryTarget {
        if self.is_dir() {
            EntryTarget::Directory
        } else {
            EntryTarget::File
        }
    }

    /// Encode child names using `/` as separator (disallowed in path
    /// components on both Unix and Windows).
    pub fn encode_children(children: &[String]) -> String {
        children.join("/")
    }

    pub fn decode_children(encoded: &str) -> Vec<String> {
        if encoded.is_empty() {
            Vec::new()
        } else {
            encoded.split('/').map(str::to_string).collect()
        }
    }
}

/// One totally-ordered entry in the scanner's event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    pub kind: EventKind,
    pub target: EntryTarget,
    pub scope: String,
    pub relative_path: String,
    pub mtime: i64,
}

/// Metadata extracted from a PDF's document-level dictionary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PdfMetadata {
    pub author: Option<String>,
    pub modified_at: Option<String>,
    pub producer: Option<String>,
}

impl PdfMetadata {
    /// The flattened metadata header text stored as the `"pdf"` node's content.
    pub fn header_text(&self) -> String {
        format!(
            "Author: {}\nModified At: {}\nProducer: {}\n",
            self.author.as_deref().unwrap_or(""),
            self.modified_at.as_deref().unwrap_or(""),
            self.producer.as_deref().unwrap_or(""),
        )
    }
}

/// An annotation attached to a PDF page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub kind: Option<String>,
    pub title: Option<String>,
    pub content: Option<String>,
    pub uri: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    pub quad_points: Option<Vec<f64>>,
    pub extracted_text: Option<String>,
}

/// A single page carved out of a `PdfDocument`, content-addressed by `page_hash`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PdfPage {
    pub page_hash: String,
    pub pdf_hash: String,
    pub page_index: usize,
    pub plain_text: String,
    pub annotations: Vec<Annotation>,
}

/// A whole PDF, content-addressed by the SHA-512 of its bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PdfDocument {
    pub pdf_hash: String,
    pub metadata: PdfMetadata,
    pub pages: Vec<PdfPage>,
}

/// The kind of addressable unit stored in both indexes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Pdf,
    PdfPage,
    PdfPageAnnoContent,
    PdfPageAnnoExtracted,
}

impl NodeType {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeType::Pdf => "pdf",
            NodeType::PdfPage => "pdf.page",
            NodeType::PdfPageAnnoContent => "pdf.page.anno.content",
            NodeType::PdfPageAnnoExtracted => "pdf.page.anno.extracted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pdf" => Some(NodeType::Pdf),
            "pdf.page" => Some(NodeType::PdfPage),
            "pdf.page.anno.content" => Some(NodeType::PdfPageAnnoContent),
            "pdf.page.anno.extracted" => Some(NodeType::PdfPageAnnoExtracted),
            _ => None,
        }
    }
}

/// An annotation node id: `{page_hash}/anno/{index}/{content|extracted}`.
pub fn annotation_node_id(page_hash: &str, index: usize, extracted: bool) -> String {
    format!(
        "{page_hash}/anno/{index}/{}",
        if extracted { "extracted" } else { "content" }
    )
}

/// A contiguous character range `[start, end)` of a node's source text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start: usize,
    pub end: usize,
    pub text: String,
}

/// A segment as returned by a lexical-index query: which query tokens matched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchedSegment {
    pub start: usize,
    pub end: usize,
    pub matched_tokens: Vec<String>,
}

/// Which ranking tier produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Matching {
    Matched,
    MatchedPartial,
    Similarity,
}

/// The unit returned by both index queries, fused in the query engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexNode {
    pub node_id: String,
    pub node_type: String,
    pub matching: Matching,
    pub metadata: HashMap<String, serde_json::Value>,
    pub fts_rank: f64,
    pub vector_distance: f64,
    pub segments: Vec<MatchedSegment>,
}

/// Distance metric configured for the vector index. Ranking comparators
/// assume "smaller is better" — true for L2 and cosine-as-distance, but not
/// raw inner product, which is negated here so the convention still holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    L2,
    InnerProduct,
    Cosine,
}

impl DistanceMetric {
    pub fn as_str(self) -> &'static str {
        match self {
            DistanceMetric::L2 => "l2",
            DistanceMetric::InnerProduct => "ip",
            DistanceMetric::Cosine => "cosine",
        }
    }

    /// Whether smaller raw values mean "closer" — false for inner product,
    /// where larger raw values mean more similar.
    pub fn smaller_is_closer(self) -> bool {
        !matches!(self, DistanceMetric::InnerProduct)
    }

    /// Turn a raw similarity/distance score into a "smaller is better" distance.
    pub fn normalize(self, raw: f64) -> f64 {
        if self.smaller_is_closer() { raw } else { -raw }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn children_roundtrip_through_slash_encoding() {
        let children = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let encoded = FileRecord::encode_children(&children);
        assert_eq!(FileRecord::decode_children(&encoded), children);
    }

    #[test]
    fn empty_children_roundtrip() {
        let encoded = FileRecord::encode_children(&[]);
        assert!(FileRecord::decode_children(&encoded).is_empty());
    }

    #[test]
    fn annotation_node_id_formats_content_and_extracted() {
        assert_eq!(annotation_node_id("H", 0, false), "H/anno/0/content");
        assert_eq!(annotation_node_id("H", 2, true), "H/anno/2/extracted");
    }

    #[test]
    fn metadata_header_text_uses_empty_for_missing_fields() {
        let m = PdfMetadata {
            author: Some("A".into()),
            modified_at: None,
            producer: Some("P".into()),
        };
        assert_eq!(m.header_text(), "Author: A\nModified At: \nProducer: P\n");
    }

    #[test]
    fn inner_product_distance_is_negated_smaller_is_better() {
        assert_eq!(DistanceMetric::InnerProduct.normalize(0.9), -0.9);
        assert_eq!(DistanceMetric::L2.normalize(0.9), 0.9);
        assert!(!DistanceMetric::InnerProduct.smaller_is_closer());
        assert!(DistanceMetric::Cosine.smaller_is_closer());
    }

    #[test]
    fn node_type_roundtrips_through_str() {
        for nt in [
            NodeType::Pdf,
            NodeType::PdfPage,
            NodeType::PdfPageAnnoContent,
            NodeType::PdfPageAnnoExtracted,
        ] {
            assert_eq!(NodeType::parse(nt.as_str()), Some(nt));
        }
    }
}
