// ABOUTME: Error taxonomy for an export run
// ABOUTME: Every variant aborts the whole run; none leaves a committed artifact

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExportError {
    /// Page query, connection or timeout failure after retries were exhausted
    #[error("Source unavailable while reading table '{table}' at offset {offset}")]
    SourceUnavailable {
        table: String,
        offset: u64,
        #[source]
        cause: anyhow::Error,
    },

    #[error("Cannot encode column '{column}' of table '{table}': {reason}")]
    EncodingFailure {
        table: String,
        column: String,
        reason: String,
    },

    #[error("Failed to write export artifact {}", path.display())]
    SinkFailure {
        path: PathBuf,
        #[source]
        cause: std::io::Error,
    },

    #[error("Resume checkpoint error")]
    Checkpoint(#[source] anyhow::Error),

    #[error("Export cancelled before table '{table}' finished")]
    Cancelled { table: String },
}

impl ExportError {
    pub(crate) fn sink(path: impl Into<PathBuf>, cause: std::io::Error) -> Self {
        ExportError::SinkFailure {
            path: path.into(),
            cause,
        }
    }
}

pub type ExportResult<T> = std::result::Result<T, ExportError>;
