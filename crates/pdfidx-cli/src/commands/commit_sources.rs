//! `pdfidx commit-sources` — register or retire named scan roots.

use std::collections::HashMap;
use std::path::PathBuf;

use tracing::info;

use crate::workspace::Workspace;

/// `sources` entries look like `name=path`. Any previously-committed scope
/// absent from this set is dropped, emitting `Removed` events for every
/// file it had on record.
pub fn run(workspace: &Workspace, sources: &[String]) -> anyhow::Result<()> {
    let mut parsed = HashMap::with_capacity(sources.len());
    for entry in sources {
        let (name, path) = entry
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("expected NAME=PATH, got {entry:?}"))?;
        if name.is_empty() {
            anyhow::bail!("scope name in {entry:?} is empty");
        }
        parsed.insert(name.to_string(), PathBuf::from(path));
    }

    let scanner = workspace.open_scanner()?;
    scanner.commit_sources(&parsed)?;
    info!(count = parsed.len(), "committed sources");
    for (name, path) in &parsed {
        println!("{name} -> {}", path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workspace::Workspace;

    #[test]
    fn committing_a_source_makes_it_show_up_as_a_scope() {
        let dir = tempfile::tempdir().unwrap();
        let source = tempfile::tempdir().unwrap();
        let workspace = Workspace::discover(Some(dir.path()), None).unwrap();

        run(&workspace, &[format!("papers={}", source.path().display())]).unwrap();

        let scanner = workspace.open_scanner().unwrap();
        let scopes = scanner.list_scopes().unwrap();
        assert_eq!(scopes.len(), 1);
        assert_eq!(scopes[0].0, "papers");
    }

    #[test]
    fn rejects_an_entry_with_no_equals_sign() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = Workspace::discover(Some(dir.path()), None).unwrap();
        assert!(run(&workspace, &["no-separator-here".to_string()]).is_err());
    }

    #[test]
    fn rejects_an_empty_scope_name() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = Workspace::discover(Some(dir.path()), None).unwrap();
        assert!(run(&workspace, &["=relative/path".to_string()]).is_err());
    }
}
