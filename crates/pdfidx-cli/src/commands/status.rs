//! `pdfidx status` — a quick look at what's registered and what's pending.

use crate::workspace::Workspace;

pub fn run(workspace: &Workspace) -> anyhow::Result<()> {
    println!("workspace: {}", workspace.root.display());

    let scanner = workspace.open_scanner()?;
    let scopes = scanner.list_scopes()?;
    if scopes.is_empty() {
        println!("scopes: none committed");
    } else {
        println!("scopes:");
        for (name, path) in &scopes {
            println!("  {name} -> {}", path.display());
        }
    }

    let pending = scanner.next_events(usize::MAX)?;
    println!("pending events: {}", pending.len());

    Ok(())
}
