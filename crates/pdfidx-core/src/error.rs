use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("scanner error: {0}")]
    Scanner(#[from] ScannerError),

    #[error("page store error: {0}")]
    PageStore(#[from] PageStoreError),

    #[error("lexical index error: {0}")]
    Lexical(#[from] LexicalError),

    #[error("vector index error: {0}")]
    Vector(#[from] VectorError),

    #[error("coordinator error: {0}")]
    Coordinator(#[from] CoordinatorError),

    #[error("query error: {0}")]
    Query(#[from] QueryError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    NotFound { path: String },

    #[error("failed to parse config: {0}")]
    ParseError(String),

    #[error("invalid config value: {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ScannerError {
    #[error("sqlite error: {0}")]
    Sqlite(String),

    #[error("empty scope name")]
    EmptyScopeName,

    #[error("scope not found: {name}")]
    ScopeNotFound { name: String },

    #[error("interrupted")]
    Interrupted,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ScannerError {
    pub fn sqlite<E: std::fmt::Display>(e: E) -> Self {
        Self::Sqlite(e.to_string())
    }
}

#[derive(Error, Debug)]
pub enum PageStoreError {
    #[error("sqlite error: {0}")]
    Sqlite(String),

    #[error("pdf parse failed: {path}")]
    PdfParseFailed { path: String },

    #[error("consistency violation: {0}")]
    Consistency(String),

    #[error("interrupted")]
    Interrupted,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl PageStoreError {
    pub fn sqlite<E: std::fmt::Display>(e: E) -> Self {
        Self::Sqlite(e.to_string())
    }
}

#[derive(Error, Debug)]
pub enum LexicalError {
    #[error("sqlite error: {0}")]
    Sqlite(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl LexicalError {
    pub fn sqlite<E: std::fmt::Display>(e: E) -> Self {
        Self::Sqlite(e.to_string())
    }
}

#[derive(Error, Debug)]
pub enum VectorError {
    #[error("sqlite error: {0}")]
    Sqlite(String),

    #[error("external error: {0}")]
    External(String),

    #[error("dimension mismatch: expected {expected} got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl VectorError {
    pub fn sqlite<E: std::fmt::Display>(e: E) -> Self {
        Self::Sqlite(e.to_string())
    }

    pub fn external<E: std::fmt::Display>(e: E) -> Self {
        Self::External(e.to_string())
    }
}

#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error("sqlite error: {0}")]
    Sqlite(String),

    #[error("scanner error: {0}")]
    Scanner(#[from] ScannerError),

    #[error("page store error: {0}")]
    PageStore(#[from] PageStoreError),

    #[error("lexical index error: {0}")]
    Lexical(#[from] LexicalError),

    #[error("vector index error: {0}")]
    Vector(#[from] VectorError),

    #[error("worker pool raised an exception: {0}")]
    RaisedException(String),

    #[error("interrupted")]
    Interrupted,

    #[error("consistency violation: {0}")]
    Consistency(String),
}

impl CoordinatorError {
    pub fn sqlite<E: std::fmt::Display>(e: E) -> Self {
        Self::Sqlite(e.to_string())
    }
}

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("empty query")]
    EmptyQuery,

    #[error("lexical index error: {0}")]
    Lexical(#[from] LexicalError),

    #[error("vector index error: {0}")]
    Vector(#[from] VectorError),

    #[error("page store error: {0}")]
    PageStore(#[from] PageStoreError),

    #[error("coordinator error: {0}")]
    Coordinator(#[from] CoordinatorError),
}

pub type Result<T> = std::result::Result<T, Error>;
