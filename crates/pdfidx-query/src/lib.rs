pub mod engine;
pub mod highlight;
pub mod segmentation;
pub mod types;

pub use engine::query;
pub use types::{HighlightSpan, HighlightedSegment, PageAnnoQueryItem, PageQueryItem, PdfQueryItem, QueryItem};
