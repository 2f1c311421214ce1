//! Pure geometry helpers for turning PDF annotation `quad_points` and
//! per-line character boxes into extracted text. No PDF parsing lives here;
//! `pdf.rs` is the only caller.

/// An axis-aligned box in PDF user space (origin bottom-left).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl Rect {
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self { x0, y0, x1, y1 }
    }

    /// Bounding box of one quad (8 floats: four corners, x/y interleaved).
    pub fn from_quad(quad: &[f64]) -> Self {
        let xs = [quad[0], quad[2], quad[4], quad[6]];
        let ys = [quad[1], quad[3], quad[5], quad[7]];
        Rect {
            x0: xs.iter().cloned().fold(f64::INFINITY, f64::min),
            x1: xs.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
            y0: ys.iter().cloned().fold(f64::INFINITY, f64::min),
            y1: ys.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
        }
    }

    pub fn overlaps(&self, other: &Rect) -> bool {
        self.x0 < other.x1 && self.x1 > other.x0 && self.y0 < other.y1 && self.y1 > other.y0
    }

    /// Shrink toward the box's own center by `rate` (e.g. 0.01 for 1%).
    pub fn shrink(&self, rate: f64) -> Rect {
        let dx = (self.x1 - self.x0) * rate;
        let dy = (self.y1 - self.y0) * rate;
        Rect {
            x0: self.x0 + dx,
            x1: self.x1 - dx,
            y0: self.y0 + dy,
            y1: self.y1 - dy,
        }
    }

    pub fn contains(&self, other: &Rect) -> bool {
        self.x0 <= other.x0 && self.x1 >= other.x1 && self.y0 <= other.y0 && self.y1 >= other.y1
    }
}

/// The set of axis-aligned boxes derived from an annotation's `quad_points`.
#[derive(Debug, Clone)]
pub struct AnnotationPolygon {
    pub rects: Vec<Rect>,
}

impl AnnotationPolygon {
    pub fn from_quad_points(quad_points: &[f64]) -> Self {
        let rects = quad_points.chunks_exact(8).map(Rect::from_quad).collect();
        Self { rects }
    }

    pub fn intersects(&self, target: &Rect) -> bool {
        self.rects.iter().any(|r| r.overlaps(target))
    }

    /// True if `target`, shrunk by `shrink_rate` toward its own center, fits
    /// entirely inside any one of the polygon's rects.
    pub fn contains(&self, target: &Rect, shrink_rate: f64) -> bool {
        let shrunk = target.shrink(shrink_rate);
        self.rects.iter().any(|r| r.contains(&shrunk))
    }
}

/// One recovered text line with a per-character bounding box.
#[derive(Debug, Clone)]
pub struct Line {
    pub rect: Rect,
    pub chars: Vec<(char, Rect)>,
}

/// Build an approximate per-character layout for a line given its overall
/// box, by dividing the width evenly across characters in reading order.
pub fn layout_chars(text: &str, rect: Rect) -> Vec<(char, Rect)> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return Vec::new();
    }
    let step = (rect.x1 - rect.x0) / chars.len() as f64;
    chars
        .into_iter()
        .enumerate()
        .map(|(i, c)| {
            let x0 = rect.x0 + step * i as f64;
            (c, Rect::new(x0, rect.y0, x0 + step, rect.y1))
        })
        .collect()
}

/// Extract the text covered by `polygon` from `lines`, sorted top-to-bottom
/// (higher native PDF y is physically higher on the page). Characters whose
/// box, shrunk by `shrink_rate`, is contained in any polygon rect are kept.
pub fn extract_covered_text(polygon: &AnnotationPolygon, lines: &[Line], shrink_rate: f64) -> String {
    let mut candidates: Vec<&Line> = lines.iter().filter(|l| polygon.intersects(&l.rect)).collect();
    candidates.sort_by(|a, b| b.rect.y1.partial_cmp(&a.rect.y1).unwrap_or(std::cmp::Ordering::Equal));

    let mut out = String::new();
    for line in candidates {
        let mut line_text = String::new();
        for (ch, char_rect) in &line.chars {
            if polygon.contains(char_rect, shrink_rate) {
                line_text.push(*ch);
            }
        }
        if !line_text.is_empty() {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(&line_text);
        }
    }
    out
}

/// Collapse whitespace runs: a run containing a newline becomes one `\n`,
/// any other run of spaces/tabs becomes one space.
pub fn standardize_text(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        if c.is_whitespace() {
            let mut saw_newline = c == '\n' || c == '\r';
            while let Some(&next) = chars.peek() {
                if !next.is_whitespace() {
                    break;
                }
                if next == '\n' || next == '\r' {
                    saw_newline = true;
                }
                chars.next();
            }
            out.push(if saw_newline { '\n' } else { ' ' });
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quad_bounding_box_is_axis_aligned() {
        let quad = [0.0, 0.0, 10.0, 0.0, 10.0, 5.0, 0.0, 5.0];
        let rect = Rect::from_quad(&quad);
        assert_eq!(rect, Rect::new(0.0, 0.0, 10.0, 5.0));
    }

    #[test]
    fn shrink_moves_edges_toward_center() {
        let rect = Rect::new(0.0, 0.0, 100.0, 100.0);
        let shrunk = rect.shrink(0.01);
        assert_eq!(shrunk, Rect::new(1.0, 1.0, 99.0, 99.0));
    }

    #[test]
    fn polygon_contains_respects_shrink() {
        let polygon = AnnotationPolygon::from_quad_points(&[0.0, 0.0, 10.0, 0.0, 10.0, 10.0, 0.0, 10.0]);
        // exactly matches the polygon's edge: only contained after shrinking the target.
        let target = Rect::new(0.0, 0.0, 10.0, 10.0);
        assert!(polygon.contains(&target, 0.01));
        assert!(!polygon.contains(&target, -0.5));
    }

    #[test]
    fn extract_covered_text_sorts_top_to_bottom_and_filters_chars() {
        let top_line = Line {
            rect: Rect::new(0.0, 90.0, 20.0, 100.0),
            chars: layout_chars("hello", Rect::new(0.0, 90.0, 20.0, 100.0)),
        };
        let bottom_line = Line {
            rect: Rect::new(0.0, 0.0, 20.0, 10.0),
            chars: layout_chars("world", Rect::new(0.0, 0.0, 20.0, 10.0)),
        };
        let polygon = AnnotationPolygon::from_quad_points(&[
            0.0, 0.0, 20.0, 0.0, 20.0, 100.0, 0.0, 100.0,
        ]);
        let text = extract_covered_text(&polygon, &[bottom_line, top_line], 0.01);
        assert_eq!(text, "hello\nworld");
    }

    #[test]
    fn standardize_text_collapses_whitespace_runs() {
        assert_eq!(standardize_text("a\n\n\nb   c\t\td"), "a\nb c d");
        assert_eq!(standardize_text("a \n b"), "a\nb");
    }
}
