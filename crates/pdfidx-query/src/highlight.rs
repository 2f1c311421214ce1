//! Turns a node's matched segments into renderable highlight spans.
//!
//! A node's `fts_rank` is constant across all of its segments (it is a
//! property of the node, not the segment), so "minimum `(fts_rank,
//! vector_distance)` pair, tied on both axes" reduces to "minimum
//! `vector_distance`, tied" once segments are scoped to a single node.

use pdfidx_core::types::{Matching, MatchedSegment};

use crate::types::{HighlightSpan, HighlightedSegment};

const TIE_EPSILON: f64 = 1e-9;

/// Build highlighted segments for one node. `segment_distances` must be the
/// same length and order as `segments`.
pub fn highlight_segments(
    segments: &[MatchedSegment],
    segment_distances: &[f64],
    matching: Matching,
    content: &str,
) -> Vec<HighlightedSegment> {
    let min_distance = segment_distances.iter().copied().fold(f64::INFINITY, f64::min);
    let lower = content.to_lowercase();

    let mut out = Vec::with_capacity(segments.len());
    for (seg, &distance) in segments.iter().zip(segment_distances) {
        let main = (distance - min_distance).abs() < TIE_EPSILON;
        let highlights = token_spans(&lower, seg);
        if highlights.is_empty() && matching != Matching::Similarity {
            continue;
        }
        out.push(HighlightedSegment { start: seg.start, end: seg.end, main, highlights });
    }
    out
}

/// All non-overlapping occurrences of each matched token within
/// `[seg.start, seg.end)` of the already-lowercased content, as offsets
/// relative to `seg.start`.
fn token_spans(lower_content: &str, seg: &MatchedSegment) -> Vec<HighlightSpan> {
    let end = seg.end.min(lower_content.len());
    if seg.start >= end {
        return Vec::new();
    }
    let window = &lower_content[seg.start..end];

    let mut spans = Vec::new();
    for token in &seg.matched_tokens {
        let token_lower = token.to_lowercase();
        if token_lower.is_empty() {
            continue;
        }
        let mut cursor = 0usize;
        while let Some(pos) = window[cursor..].find(&token_lower) {
            let offset = cursor + pos;
            spans.push(HighlightSpan { offset, length: token_lower.len() });
            cursor = offset + token_lower.len();
            if cursor >= window.len() {
                break;
            }
        }
    }
    spans.sort_by_key(|s| s.offset);
    spans
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(start: usize, end: usize, tokens: &[&str]) -> MatchedSegment {
        MatchedSegment { start, end, matched_tokens: tokens.iter().map(|s| s.to_string()).collect() }
    }

    #[test]
    fn marks_the_segment_with_the_smallest_distance_as_main() {
        let segments = vec![seg(0, 10, &["alpha"]), seg(10, 20, &["alpha"])];
        let content = "alpha one alpha two";
        let out = highlight_segments(&segments, &[0.5, 0.1], Matching::Matched, content);
        assert!(!out[0].main);
        assert!(out[1].main);
    }

    #[test]
    fn finds_non_overlapping_token_occurrences() {
        let segments = vec![seg(0, 9, &["aa"])];
        let out = highlight_segments(&segments, &[0.0], Matching::Matched, "aaaa rest");
        assert_eq!(out[0].highlights, vec![HighlightSpan { offset: 0, length: 2 }, HighlightSpan { offset: 2, length: 2 }]);
    }

    #[test]
    fn similarity_segments_with_no_tokens_are_kept() {
        let segments = vec![MatchedSegment { start: 0, end: 5, matched_tokens: Vec::new() }];
        let out = highlight_segments(&segments, &[0.2], Matching::Similarity, "hello");
        assert_eq!(out.len(), 1);
        assert!(out[0].highlights.is_empty());
    }

    #[test]
    fn lexical_segments_with_no_surviving_tokens_are_dropped() {
        let segments = vec![MatchedSegment { start: 0, end: 5, matched_tokens: Vec::new() }];
        let out = highlight_segments(&segments, &[0.2], Matching::Matched, "hello");
        assert!(out.is_empty());
    }
}
