//! Fuses the lexical and vector indexes into one ranked result list.
//!
//! `query()` runs three tiers in order — exact lexical matches, partial
//! lexical matches, then vector similarity — each cheaper to skip than the
//! one before it: if the exact tier alone fills `limit`, nothing past it
//! runs at all.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use pdfidx_coordinator::IndexCoordinator;
use pdfidx_core::error::QueryError;
use pdfidx_core::types::{IndexNode, Matching, NodeType};
use pdfidx_state::lexical::QueryMode;
use pdfidx_vector::{EmbeddingProvider, VectorIndex};

use crate::highlight::highlight_segments;
use crate::segmentation::keywords;
use crate::types::{PageAnnoQueryItem, PageQueryItem, PdfQueryItem, QueryItem};

/// A fused node plus the per-segment vector distances used both to rank it
/// and, later, to pick its highlighted ("main") segment.
struct Candidate {
    node: IndexNode,
    segment_distances: Vec<f64>,
}

/// Run a query against `coordinator`'s indexes, returning the shaped result
/// items alongside the keyword list the query text was reduced to.
pub fn query(
    coordinator: &IndexCoordinator,
    embedder: &mut dyn EmbeddingProvider,
    text: &str,
    limit: usize,
) -> Result<(Vec<QueryItem>, Vec<String>), QueryError> {
    let keywords = keywords(text);
    if keywords.is_empty() || limit == 0 {
        return Ok((Vec::new(), keywords));
    }
    let query_str = keywords.join(" ");
    let query_vec = embedder.embed_batch(&[query_str.clone()])?.into_iter().next().unwrap_or_default();

    let mut seen_ids: HashSet<String> = HashSet::new();

    let exact = coordinator.lexical().query(&query_str, QueryMode::AndOnly)?;
    let mut exact = close_and_sort(exact, &query_vec, coordinator.vector())?;
    exact.truncate(limit);
    seen_ids.extend(exact.iter().map(|c| c.node.node_id.clone()));

    if exact.len() >= limit {
        let items = shape_results(coordinator, &exact)?;
        return Ok((items, keywords));
    }

    let mut candidates = exact;

    let partial = coordinator.lexical().query(&query_str, QueryMode::OrExcludingAnd)?;
    let mut partial = close_and_sort(partial, &query_vec, coordinator.vector())?;
    partial.retain(|c| !seen_ids.contains(&c.node.node_id));
    let remaining = limit.saturating_sub(candidates.len());
    partial.truncate(remaining);
    seen_ids.extend(partial.iter().map(|c| c.node.node_id.clone()));
    candidates.extend(partial);

    if !query_vec.is_empty() {
        let similar = coordinator.vector().query(&query_vec, limit)?;
        let mut similar: Vec<Candidate> = similar
            .into_iter()
            .filter(|n| !seen_ids.contains(&n.node_id))
            .map(|node| {
                let distance = node.vector_distance;
                Candidate { node, segment_distances: vec![distance] }
            })
            .collect();
        similar.sort_by(|a, b| a.node.vector_distance.partial_cmp(&b.node.vector_distance).unwrap_or(Ordering::Equal));
        candidates.extend(similar);
    }

    let items = shape_results(coordinator, &candidates)?;
    Ok((items, keywords))
}

/// Attach a per-segment vector distance to every matched segment of a
/// lexical hit, set the node's own distance to the minimum of those, then
/// sort by `(descending fts_rank, ascending vector_distance)`.
fn close_and_sort(nodes: Vec<IndexNode>, query_vec: &[f32], vector: &VectorIndex) -> Result<Vec<Candidate>, QueryError> {
    let mut closed = Vec::with_capacity(nodes.len());
    for mut node in nodes {
        let ranges: Vec<(usize, usize)> = node.segments.iter().map(|s| (s.start, s.end)).collect();
        let segment_distances = if query_vec.is_empty() || ranges.is_empty() {
            vec![f64::INFINITY; ranges.len()]
        } else {
            vector.distances_for_ranges(query_vec, &node.node_id, &ranges)?
        };
        node.vector_distance = segment_distances.iter().copied().fold(f64::INFINITY, f64::min);
        closed.push(Candidate { node, segment_distances });
    }
    closed.sort_by(|a, b| {
        b.node
            .fts_rank
            .partial_cmp(&a.node.fts_rank)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.node.vector_distance.partial_cmp(&b.node.vector_distance).unwrap_or(Ordering::Equal))
    });
    Ok(closed)
}

fn shape_results(coordinator: &IndexCoordinator, candidates: &[Candidate]) -> Result<Vec<QueryItem>, QueryError> {
    let mut items: Vec<QueryItem> = Vec::new();
    let mut page_index: HashMap<String, usize> = HashMap::new();
    let mut anno_candidates: Vec<&Candidate> = Vec::new();

    for candidate in candidates {
        match NodeType::parse(&candidate.node.node_type) {
            Some(NodeType::Pdf) => {
                let pdf_hash = candidate.node.node_id.clone();
                let Some(doc) = coordinator.page_store().document_or_none(&pdf_hash)? else { continue };
                let paths = coordinator
                    .paths_for_pdf_hash(&pdf_hash)?
                    .into_iter()
                    .map(|(_scope, relative_path)| relative_path)
                    .collect();
                items.push(QueryItem::Pdf(PdfQueryItem {
                    pdf_hash,
                    paths,
                    metadata: doc.metadata,
                    distance: candidate.node.vector_distance,
                }));
            }
            Some(NodeType::PdfPage) => {
                let page_hash = candidate.node.node_id.clone();
                let Some(stored) = coordinator.page_store().page(&page_hash)? else { continue };
                let pdf_files = pdf_files_for_page(coordinator, &page_hash)?;
                let highlights = highlight_segments(
                    &candidate.node.segments,
                    &candidate.segment_distances,
                    candidate.node.matching,
                    &stored.plain_text,
                );
                page_index.insert(page_hash.clone(), items.len());
                items.push(QueryItem::Page(PageQueryItem {
                    page_hash,
                    pdf_files,
                    content: stored.plain_text,
                    distance: candidate.node.vector_distance,
                    highlight_segments: highlights,
                    annotations: Vec::new(),
                }));
            }
            Some(NodeType::PdfPageAnnoContent) | Some(NodeType::PdfPageAnnoExtracted) => {
                anno_candidates.push(candidate);
            }
            None => {}
        }
    }

    for candidate in anno_candidates {
        let Some((page_hash, index, extracted)) = parse_anno_node_id(&candidate.node.node_id) else { continue };
        // Orphan: the parent page didn't itself make this result set.
        let Some(&idx) = page_index.get(&page_hash) else { continue };
        let Some(stored) = coordinator.page_store().page(&page_hash)? else { continue };
        let Some(annotation) = stored.annotations.get(index) else { continue };
        let text = if extracted { annotation.extracted_text.clone() } else { annotation.content.clone() };
        let Some(text) = text else { continue };
        if let QueryItem::Page(page) = &mut items[idx] {
            page.annotations.push(PageAnnoQueryItem {
                node_id: candidate.node.node_id.clone(),
                extracted,
                content: text,
                distance: candidate.node.vector_distance,
            });
        }
    }

    Ok(items)
}

fn pdf_files_for_page(coordinator: &IndexCoordinator, page_hash: &str) -> Result<Vec<String>, QueryError> {
    let mut files = Vec::new();
    for pdf_hash in coordinator.page_store().pdf_hashes_for_page(page_hash)? {
        for (_scope, relative_path) in coordinator.paths_for_pdf_hash(&pdf_hash)? {
            if !files.contains(&relative_path) {
                files.push(relative_path);
            }
        }
    }
    Ok(files)
}

/// Parses `{page_hash}/anno/{index}/{content|extracted}` back into its parts.
fn parse_anno_node_id(node_id: &str) -> Option<(String, usize, bool)> {
    let (page_hash, rest) = node_id.split_once("/anno/")?;
    let (index_str, kind) = rest.split_once('/')?;
    let index = index_str.parse().ok()?;
    let extracted = match kind {
        "extracted" => true,
        "content" => false,
        _ => return None,
    };
    Some((page_hash.to_string(), index, extracted))
}
