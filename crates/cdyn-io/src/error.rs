//! Error types for cdyn-io

use thiserror::Error;

pub type Result<T> = std::result::Result<T, IoError>;

#[derive(Error, Debug)]
pub enum IoError {
    #[error("Missing restart vector: {0}")]
    MissingVector(String),

    #[error("Restart vector `{name}` has {actual} entries, expected {expected}")]
    VectorLength {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("Unsupported restart schema version {found} (expected {expected})")]
    SchemaVersion { found: u32, expected: u32 },

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
