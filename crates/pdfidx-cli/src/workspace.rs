//! Resolves the on-disk workspace layout from config and wires up the
//! library crates against it. Every path a subcommand touches is derived
//! here so the subsystem `open()` calls stay one-liners.

use std::path::{Path, PathBuf};

use pdfidx_core::config::Config;
use pdfidx_core::constants;
use pdfidx_coordinator::IndexCoordinator;
use pdfidx_state::scanner::Scanner;
use pdfidx_vector::{DeterministicEmbeddingProvider, EmbeddingProvider};

pub struct Workspace {
    pub config: Config,
    pub root: PathBuf,
}

impl Workspace {
    /// `workspace_dir` is the explicit `--workspace` flag (if any);
    /// `config_file` is the explicit `--config` flag. An explicit
    /// `--workspace` wins over whatever `workspace.workspace_dir` a config
    /// file says, the same way `--config` outranks the files it overlays.
    pub fn discover(workspace_dir: Option<&Path>, config_file: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = Config::load_with_file(workspace_dir, config_file)?;
        if let Some(dir) = workspace_dir {
            config.workspace.workspace_dir = dir.to_string_lossy().to_string();
        }
        let root = config.workspace_path();
        std::fs::create_dir_all(&root)?;
        Ok(Self { config, root })
    }

    pub fn scanner_db(&self) -> PathBuf {
        self.root.join(constants::SCANNER_DB)
    }

    pub fn page_cache_db(&self) -> PathBuf {
        self.root.join(constants::PAGE_CACHE_DB)
    }

    pub fn page_files_dir(&self) -> PathBuf {
        self.root.join(constants::PAGE_FILES_DIR)
    }

    pub fn lexical_db(&self) -> PathBuf {
        self.root.join(constants::LEXICAL_DB)
    }

    pub fn vector_db_dir(&self) -> PathBuf {
        self.root.join(constants::VECTOR_DB_DIR)
    }

    pub fn coordinator_db(&self) -> PathBuf {
        self.root.join(constants::COORDINATOR_DB)
    }

    pub fn open_scanner(&self) -> anyhow::Result<Scanner> {
        Ok(Scanner::open(&self.scanner_db())?)
    }

    pub fn open_coordinator(&self) -> anyhow::Result<IndexCoordinator> {
        Ok(IndexCoordinator::open(
            &self.coordinator_db(),
            &self.page_cache_db(),
            &self.page_files_dir(),
            &self.lexical_db(),
            &self.vector_db_dir(),
            self.config.embedding.dimensions,
            self.config.embedding.distance_metric_typed(),
        )?)
    }

    /// The always-available default provider. A real model-backed provider
    /// can be substituted here later without touching any call site, per
    /// the `EmbeddingProvider` trait boundary.
    pub fn make_embedder(&self) -> Box<dyn EmbeddingProvider + Send> {
        Box::new(DeterministicEmbeddingProvider::new(
            self.config.embedding.model_id.clone(),
            self.config.embedding.dimensions,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_workspace_dir_wins_over_a_workspace_local_config_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.toml"), "[workspace]\nworkspace_dir = \"/somewhere/else\"\n").unwrap();

        let workspace = Workspace::discover(Some(dir.path()), None).unwrap();
        assert_eq!(workspace.root, dir.path());
    }

    #[test]
    fn derived_paths_nest_under_the_workspace_root() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = Workspace::discover(Some(dir.path()), None).unwrap();
        assert!(workspace.scanner_db().starts_with(dir.path()));
        assert!(workspace.vector_db_dir().starts_with(dir.path()));
    }
}
