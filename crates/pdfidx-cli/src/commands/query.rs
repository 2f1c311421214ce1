//! `pdfidx query` — run one hybrid lexical/vector search and print the
//! ranked results as JSON.

use crate::workspace::Workspace;

pub fn run(workspace: &Workspace, text: &str, limit: usize) -> anyhow::Result<()> {
    let coordinator = workspace.open_coordinator()?;
    let mut embedder = workspace.make_embedder();

    let (items, keywords) = pdfidx_query::query(&coordinator, embedder.as_mut(), text, limit)?;

    let output = serde_json::json!({
        "keywords": keywords,
        "results": items,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
