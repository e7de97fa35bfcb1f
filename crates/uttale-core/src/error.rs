use thiserror::Error;

/// Failure taxonomy shared across the workspace.
///
/// Parse and per-file indexing failures are contained in the reindex report;
/// query and extraction failures travel to the caller typed, so the HTTP
/// layer can map them to status codes instead of a generic 500.
#[derive(Debug, Error)]
pub enum Error {
    #[error("malformed transcript block {block}: {detail}")]
    Parse { block: usize, detail: String },

    #[error("index corrupt: {0}")]
    IndexCorrupt(String),

    #[error("index operation failed: {0}")]
    Index(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("range out of bounds: {0}")]
    Range(String),

    #[error("extraction failed: {0}")]
    Extraction(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
