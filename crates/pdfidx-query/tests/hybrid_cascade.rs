//! End-to-end coverage of `engine::query`'s three-tier cascade: an exact
//! lexical (AND) hit must rank ahead of every partial (OR-excluding-AND)
//! hit, which in turn must rank ahead of a document reachable only through
//! the vector-similarity tier.

use std::path::Path;

use pdfidx_coordinator::IndexCoordinator;
use pdfidx_core::types::{DistanceMetric, EntryTarget, Event, EventKind};
use pdfidx_query::{query, QueryItem};
use pdfidx_vector::{DeterministicEmbeddingProvider, EmbeddingProvider};

fn single_page_pdf_with_text(text: &str) -> Vec<u8> {
    use lopdf::content::Content;
    use lopdf::{dictionary, Object, Stream};

    let mut doc = lopdf::Document::with_version("1.5");
    let content = Content { operations: vec![lopdf::content::Operation::new("Tj", vec![Object::string_literal(text)])] };
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
    let font_id = doc.add_object(dictionary! { "Type" => "Font", "Subtype" => "Type1", "BaseFont" => "Helvetica" });
    let resources_id = doc.add_object(dictionary! { "Font" => dictionary! { "F1" => font_id } });
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Contents" => content_id,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
    });
    let pages_id = doc.add_object(dictionary! { "Type" => "Pages", "Kids" => vec![page_id.into()], "Count" => 1 });
    doc.objects.get_mut(&page_id).unwrap().as_dict_mut().unwrap().set("Parent", pages_id);
    let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
    doc.trailer.set("Root", catalog_id);
    let mut buf = Vec::new();
    doc.save_to(&mut buf).unwrap();
    buf
}

fn added_event(relative_path: &str) -> Event {
    Event { id: 1, kind: EventKind::Added, target: EntryTarget::File, scope: "main".into(), relative_path: relative_path.into(), mtime: 1 }
}

fn open_coordinator(dir: &Path) -> IndexCoordinator {
    IndexCoordinator::open(
        &dir.join("coordinator.sqlite3"),
        &dir.join("pages.sqlite3"),
        &dir.join("pages"),
        &dir.join("lexical.sqlite3"),
        &dir.join("vectors"),
        8,
        DistanceMetric::Cosine,
    )
    .unwrap()
}

fn page_item_index(items: &[QueryItem], needle: &str) -> usize {
    items
        .iter()
        .position(|item| matches!(item, QueryItem::Page(page) if page.content.contains(needle)))
        .unwrap_or_else(|| panic!("no page result contains {needle:?}"))
}

/// Five documents: one matches both query tokens, three match exactly one
/// token each, one matches neither — the fixture from the cascade's own
/// description of exact/partial/similarity tiers, adapted to PDFs.
#[test]
fn exact_hit_outranks_partial_hits_which_outrank_a_similarity_only_hit() {
    let dir = tempfile::tempdir().unwrap();
    let docs = [
        ("exact.pdf", "Transference analysis report narrative"),
        ("partial_a.pdf", "Transference notes only here"),
        ("partial_b.pdf", "Quarterly analysis summary document"),
        ("partial_c.pdf", "Another transference memo written"),
        ("unrelated.pdf", "Completely different gardening notes about tomatoes"),
    ];
    for (name, text) in &docs {
        std::fs::write(dir.path().join(name), single_page_pdf_with_text(text)).unwrap();
    }

    let coordinator = open_coordinator(dir.path());
    let embedder_lock = std::sync::Mutex::new(Box::new(DeterministicEmbeddingProvider::new("test-model", 8)) as Box<dyn EmbeddingProvider + Send>);
    for (id, (name, _)) in docs.iter().enumerate() {
        let event = Event { id: id as i64 + 1, ..added_event(name) };
        coordinator.process_event(&event, dir.path(), &embedder_lock, &|| false).unwrap();
    }

    let mut embedder = DeterministicEmbeddingProvider::new("test-model", 8);
    let (items, keywords) = query(&coordinator, &mut embedder, "Transference analysis", 100).unwrap();
    assert_eq!(keywords, vec!["transference", "analysis"]);

    let exact = page_item_index(&items, "Transference analysis report narrative");
    let partial_a = page_item_index(&items, "Transference notes only here");
    let partial_b = page_item_index(&items, "Quarterly analysis summary document");
    let partial_c = page_item_index(&items, "Another transference memo written");
    let unrelated = page_item_index(&items, "Completely different gardening notes about tomatoes");

    for partial in [partial_a, partial_b, partial_c] {
        assert!(exact < partial, "exact-match page must rank ahead of a partial-match page");
        assert!(partial < unrelated, "a partial-match page must rank ahead of the similarity-only page");
    }
}

#[test]
fn limit_zero_returns_nothing_without_touching_either_index() {
    let dir = tempfile::tempdir().unwrap();
    let coordinator = open_coordinator(dir.path());
    let mut embedder = DeterministicEmbeddingProvider::new("test-model", 8);
    let (items, keywords) = query(&coordinator, &mut embedder, "transference analysis", 0).unwrap();
    assert!(items.is_empty());
    assert!(keywords.is_empty());
}
