use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading or analysing a dataset.
///
/// Empty filter or aggregate outputs are never errors; callers receive an
/// empty [`Dataset`](crate::data::model::Dataset) or collection instead.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The source file is missing or cannot be opened.
    #[error("data source not found: {}", .path.display())]
    DataNotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// One or more columns required by the schema are absent.
    #[error("schema '{schema}' mismatch: missing column(s) {}", .missing.join(", "))]
    SchemaMismatch { schema: String, missing: Vec<String> },

    /// A cell could not be interpreted as the schema requires.
    #[error("row {row}, column '{column}': invalid value '{value}'")]
    InvalidValue {
        row: usize,
        column: String,
        value: String,
    },

    #[error("unsupported file extension: .{0}")]
    UnsupportedFormat(String),

    /// Structurally valid file with unexpected content.
    #[error("malformed source: {0}")]
    Malformed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),
}

impl EngineError {
    /// Whether the error means the source itself is absent, as opposed to
    /// present but unusable.
    pub fn is_not_found(&self) -> bool {
        matches!(self, EngineError::DataNotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
