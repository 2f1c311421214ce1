//! Result shapes returned by [`crate::engine::query`].

use pdfidx_core::types::PdfMetadata;
use serde::{Deserialize, Serialize};

/// One non-overlapping highlighted span within a segment's text, given as a
/// byte offset from the segment's own start and a byte length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HighlightSpan {
    pub offset: usize,
    pub length: usize,
}

/// A matched segment annotated with the spans to highlight inside it.
/// `main` marks the segment(s) tying the node's best `(fts_rank,
/// vector_distance)` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HighlightedSegment {
    pub start: usize,
    pub end: usize,
    pub main: bool,
    pub highlights: Vec<HighlightSpan>,
}

/// An annotation hit attached to its parent page's result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageAnnoQueryItem {
    pub node_id: String,
    pub extracted: bool,
    pub content: String,
    pub distance: f64,
}

/// A `pdf.page` hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageQueryItem {
    pub page_hash: String,
    pub pdf_files: Vec<String>,
    pub content: String,
    pub distance: f64,
    pub highlight_segments: Vec<HighlightedSegment>,
    pub annotations: Vec<PageAnnoQueryItem>,
}

/// A `pdf` hit (the document's metadata header node).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PdfQueryItem {
    pub pdf_hash: String,
    pub paths: Vec<String>,
    pub metadata: PdfMetadata,
    pub distance: f64,
}

/// One result row, shaped per the node type it came from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum QueryItem {
    #[serde(rename = "pdf")]
    Pdf(PdfQueryItem),
    #[serde(rename = "pdf.page")]
    Page(PageQueryItem),
}
