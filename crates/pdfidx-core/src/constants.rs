//! Fixed names for the on-disk workspace layout.

pub const DEFAULT_DATA_DIR: &str = ".pdfidx";
pub const GLOBAL_CONFIG_DIR: &str = ".config/pdfidx";
pub const WORKSPACE_CONFIG_FILE: &str = "config.toml";

pub const SCANNER_DB: &str = "scanner.sqlite3";
pub const PAGE_CACHE_DIR: &str = "parser/pdf_cache";
pub const PAGE_CACHE_DB: &str = "parser/pdf_cache/pages.sqlite3";
pub const PAGE_FILES_DIR: &str = "parser/pdf_cache/pages";
pub const LEXICAL_DB: &str = "index_fts5.sqlite3";
pub const VECTOR_DB_DIR: &str = "vector_db";
pub const COORDINATOR_DB: &str = "indexes/index.sqlite3";
pub const TEMP_DIR: &str = "temp";

pub const DEFAULT_WORKER_COUNT: usize = 1;
pub const DEFAULT_QUERY_LIMIT: usize = 20;
pub const VECTOR_DELETE_BATCH_SIZE: usize = 45;
pub const PROGRESS_HEARTBEAT_SECS: u64 = 5;
pub const FORCE_EXIT_WARN_SECS: u64 = 12;

/// The in-document rank decay base from `fts_rank = Σ 0.35^p`.
pub const FTS_RANK_DECAY: f64 = 0.35;
/// Containment shrink applied to character boxes when testing annotation
/// quad-point intersection.
pub const ANNOTATION_CONTAINMENT_SHRINK: f64 = 0.01;
