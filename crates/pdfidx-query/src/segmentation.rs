//! Default text segmentation: no model runtime, just sentence-boundary
//! punctuation and a fixed English stopword list. Exists so the query engine
//! has a keyword extractor to call without pulling in an NLP stack; a
//! richer provider can replace these two functions without touching callers.

use pdfidx_core::types::Segment;

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "if", "in", "into", "is", "it",
    "no", "not", "of", "on", "or", "such", "that", "the", "their", "then", "there", "these",
    "they", "this", "to", "was", "were", "will", "with", "you", "your", "i", "we", "our", "can",
    "do", "does", "did", "has", "have", "had", "my", "me", "he", "she", "his", "her", "its",
    "what", "which", "who", "whom", "so", "than", "too", "very", "just", "about", "also",
];

fn is_stopword(token: &str) -> bool {
    STOPWORDS.contains(&token)
}

/// Below this many characters, a sentence fragment is folded into the
/// previous segment rather than standing alone.
const MIN_FRAGMENT_CHARS: usize = 24;

/// Split on `. ! ? \n\n`, merging fragments shorter than
/// [`MIN_FRAGMENT_CHARS`] into the one before them.
pub fn segment(text: &str) -> Vec<Segment> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let mut segments: Vec<Segment> = Vec::new();
    let mut frag_start = 0usize;

    for (idx, &(byte_idx, ch)) in chars.iter().enumerate() {
        let is_boundary = match ch {
            '.' | '!' | '?' => true,
            '\n' => chars.get(idx + 1).is_some_and(|&(_, next)| next == '\n'),
            _ => false,
        };
        if is_boundary {
            let end = byte_idx + ch.len_utf8();
            push_fragment(&mut segments, text, frag_start, end);
            frag_start = end;
        }
    }
    if frag_start < text.len() {
        push_fragment(&mut segments, text, frag_start, text.len());
    }
    segments
}

fn push_fragment(segments: &mut Vec<Segment>, text: &str, start: usize, end: usize) {
    let trimmed = text[start..end].trim();
    if trimmed.is_empty() {
        return;
    }
    if let Some(last) = segments.last_mut() {
        if trimmed.chars().count() < MIN_FRAGMENT_CHARS {
            last.end = end;
            last.text = format!("{} {}", last.text, trimmed);
            return;
        }
    }
    segments.push(Segment { start, end, text: trimmed.to_string() });
}

/// Lowercased, stopword-filtered word tokens, in order of appearance.
pub fn keywords(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .filter(|t| !is_stopword(t))
        .collect()
}
