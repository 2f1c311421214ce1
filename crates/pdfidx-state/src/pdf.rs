//! The `split_pages`/`extract` collaborator interface, backed by `lopdf`.
//!
//! Page splitting must be deterministic: re-splitting the same document
//! bytes must yield byte-identical per-page blobs, since identical pages
//! across different documents are expected to share a `page_hash`.

use crate::annotation_geometry::{AnnotationPolygon, Line, layout_chars, standardize_text};
use lopdf::content::Content;
use lopdf::{Dictionary, Document, Object, ObjectId};
use pdfidx_core::constants::ANNOTATION_CONTAINMENT_SHRINK;
use pdfidx_core::error::PageStoreError;
use pdfidx_core::types::{Annotation, PdfMetadata};
use std::path::Path;

pub fn parse_metadata(doc: &Document) -> PdfMetadata {
    let info = doc
        .trailer
        .get(b"Info")
        .ok()
        .and_then(|o| o.as_reference().ok())
        .and_then(|id| doc.get_object(id).ok())
        .and_then(|o| o.as_dict().ok());

    PdfMetadata {
        author: info.and_then(|d| get_text(d, b"Author")),
        modified_at: info.and_then(|d| get_text(d, b"ModDate")),
        producer: info.and_then(|d| get_text(d, b"Producer")),
    }
}

/// Split a whole-document PDF into one single-page document per page,
/// in page order.
pub fn split_pages(path: &Path) -> Result<Vec<Vec<u8>>, PageStoreError> {
    let doc = Document::load(path).map_err(|e| PageStoreError::PdfParseFailed { path: e.to_string() })?;
    split_pages_doc(&doc)
}

pub fn split_pages_bytes(bytes: &[u8]) -> Result<Vec<Vec<u8>>, PageStoreError> {
    let doc = Document::load_mem(bytes).map_err(|e| PageStoreError::PdfParseFailed { path: e.to_string() })?;
    split_pages_doc(&doc)
}

fn split_pages_doc(doc: &Document) -> Result<Vec<Vec<u8>>, PageStoreError> {
    let page_numbers: Vec<u32> = doc.get_pages().keys().copied().collect();
    let mut out = Vec::with_capacity(page_numbers.len());
    for &page_num in &page_numbers {
        let mut single = doc.clone();
        let others: Vec<u32> = page_numbers.iter().copied().filter(|&p| p != page_num).collect();
        single.delete_pages(&others);
        single.prune_objects();
        single.renumber_objects();
        let mut buf = Vec::new();
        single
            .save_to(&mut buf)
            .map_err(|e| PageStoreError::PdfParseFailed { path: e.to_string() })?;
        out.push(buf);
    }
    Ok(out)
}

/// Extract plain text and annotations from a single-page PDF blob.
pub fn extract(page_bytes: &[u8]) -> Result<(String, Vec<Annotation>), PageStoreError> {
    let doc = Document::load_mem(page_bytes)
        .map_err(|e| PageStoreError::PdfParseFailed { path: e.to_string() })?;
    let pages = doc.get_pages();
    let (&page_num, &page_id) = pages
        .iter()
        .next()
        .ok_or_else(|| PageStoreError::PdfParseFailed { path: "page has no content".into() })?;

    let raw_text = doc.extract_text(&[page_num]).unwrap_or_default();
    let plain_text = standardize_text(&raw_text);

    let page_height = page_height(&doc, page_id).unwrap_or(792.0);
    let lines = extract_lines(&doc, page_id).unwrap_or_default();
    let annotations = extract_annotations(&doc, page_id, &lines, page_height);

    Ok((plain_text, annotations))
}

fn page_height(doc: &Document, page_id: ObjectId) -> Option<f64> {
    let dict = doc.get_object(page_id).ok()?.as_dict().ok()?;
    let media_box = dict.get(b"MediaBox").ok()?;
    let arr = media_box.as_array().ok()?;
    if arr.len() < 4 {
        return None;
    }
    let y0 = to_f64(&arr[1])?;
    let y1 = to_f64(&arr[3])?;
    Some((y1 - y0).abs())
}

fn extract_lines(doc: &Document, page_id: ObjectId) -> Option<Vec<Line>> {
    let content_data = doc.get_page_content(page_id).ok()?;
    let content = Content::decode(&content_data).ok()?;

    let mut lines = Vec::new();
    let (mut x, mut y) = (0.0f64, 0.0f64);
    let mut font_size = 12.0f64;

    for op in content.operations {
        match op.operator.as_str() {
            "Tf" if op.operands.len() >= 2 => {
                if let Some(size) = to_f64(&op.operands[1]) {
                    font_size = size;
                }
            }
            "Td" | "TD" if op.operands.len() >= 2 => {
                if let (Some(dx), Some(dy)) = (to_f64(&op.operands[0]), to_f64(&op.operands[1])) {
                    x += dx;
                    y += dy;
                }
            }
            "Tm" if op.operands.len() >= 6 => {
                if let (Some(tx), Some(ty)) = (to_f64(&op.operands[4]), to_f64(&op.operands[5])) {
                    x = tx;
                    y = ty;
                }
            }
            "Tj" if !op.operands.is_empty() => {
                if let Some(text) = operand_text(&op.operands[0]) {
                    push_line(&mut lines, &text, x, y, font_size);
                }
            }
            "TJ" if !op.operands.is_empty() => {
                if let Ok(arr) = op.operands[0].as_array() {
                    let mut text = String::new();
                    for item in arr {
                        if let Some(part) = operand_text(item) {
                            text.push_str(&part);
                        }
                    }
                    push_line(&mut lines, &text, x, y, font_size);
                }
            }
            _ => {}
        }
    }
    Some(lines)
}

fn push_line(lines: &mut Vec<Line>, text: &str, x: f64, y: f64, font_size: f64) {
    if text.trim().is_empty() {
        return;
    }
    let width = text.chars().count() as f64 * font_size * 0.5;
    let rect = crate::annotation_geometry::Rect::new(x, y, x + width, y + font_size);
    lines.push(Line {
        rect,
        chars: layout_chars(text, rect),
    });
}

fn operand_text(object: &Object) -> Option<String> {
    match object {
        Object::String(bytes, _) => Some(String::from_utf8_lossy(bytes).into_owned()),
        _ => None,
    }
}

fn extract_annotations(
    doc: &Document,
    page_id: ObjectId,
    lines: &[Line],
    page_height: f64,
) -> Vec<Annotation> {
    let Some(dict) = doc.get_object(page_id).ok().and_then(|o| o.as_dict().ok()) else {
        return Vec::new();
    };
    let Some(annots) = dict.get(b"Annots").ok().and_then(|o| o.as_array().ok()) else {
        return Vec::new();
    };

    annots
        .iter()
        .filter_map(|entry| {
            let annot_dict = resolve_dict(doc, entry)?;
            Some(build_annotation(doc, annot_dict, lines, page_height))
        })
        .collect()
}

fn build_annotation(doc: &Document, dict: &Dictionary, lines: &[Line], page_height: f64) -> Annotation {
    let kind = dict.get(b"Subtype").ok().and_then(|o| o.as_name_str().ok()).map(str::to_string);
    let title = get_text(dict, b"T");
    let content = get_text(dict, b"Contents");
    let created_at = get_text(dict, b"CreationDate");
    let updated_at = get_text(dict, b"M");
    let uri = dict
        .get(b"A")
        .ok()
        .and_then(|o| resolve_dict(doc, o))
        .and_then(|a| get_text(a, b"URI"));

    let quad_points: Option<Vec<f64>> = dict.get(b"QuadPoints").ok().and_then(|o| o.as_array().ok()).map(|arr| {
        arr.iter().filter_map(to_f64).collect()
    });

    let extracted_text = quad_points.as_ref().and_then(|qp| {
        if qp.len() < 8 {
            return None;
        }
        let polygon = AnnotationPolygon::from_quad_points(qp);
        let text = crate::annotation_geometry::extract_covered_text(&polygon, lines, ANNOTATION_CONTAINMENT_SHRINK);
        if text.is_empty() { None } else { Some(standardize_text(&text)) }
    });

    let _ = page_height;
    Annotation {
        kind,
        title,
        content,
        uri,
        created_at,
        updated_at,
        quad_points,
        extracted_text,
    }
}

fn resolve_dict<'a>(doc: &'a Document, object: &'a Object) -> Option<&'a Dictionary> {
    match object {
        Object::Dictionary(d) => Some(d),
        Object::Reference(id) => doc.get_object(*id).ok().and_then(|o| o.as_dict().ok()),
        _ => None,
    }
}

fn get_text(dict: &Dictionary, key: &[u8]) -> Option<String> {
    match dict.get(key).ok()? {
        Object::String(bytes, _) => Some(String::from_utf8_lossy(bytes).into_owned()),
        Object::Name(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
        _ => None,
    }
}

fn to_f64(object: &Object) -> Option<f64> {
    match object {
        Object::Real(f) => Some(*f as f64),
        Object::Integer(i) => Some(*i as f64),
        _ => None,
    }
}
