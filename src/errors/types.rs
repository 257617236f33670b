//! Error type definitions for the policyhub application
//!
//! Fatal ingestion errors abort a whole job before any rows are counted and
//! travel back to the caller as the single terminal job message. Row-level
//! failures are not represented here as enum variants: they are caught per
//! row, recorded in the job summary, and never escalate.

use thiserror::Error;

/// Fatal, whole-job ingestion errors
#[derive(Error, Debug)]
pub enum IngestError {
    /// The job could not open its own connection to the store
    #[error("failed to connect to database: {0}")]
    Connection(String),

    /// The declared file type is not one the reader understands
    #[error("unsupported file type: {0}")]
    UnsupportedFormat(String),

    /// The file could not be opened or is structurally corrupt
    #[error("failed to read {path}: {message}")]
    FileRead { path: String, message: String },

    /// The file parsed but contained no data rows
    #[error("no data found in file")]
    EmptyDataset,
}

impl IngestError {
    pub fn file_read<P: Into<String>, M: Into<String>>(path: P, message: M) -> Self {
        Self::FileRead {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// A single row that failed during resolution/upserting.
///
/// Carries the 1-based row index; rendering matches the `rowErrors` entries
/// in the job response.
#[derive(Error, Debug)]
#[error("Row {row}: {message}")]
pub struct RowProcessingError {
    pub row: usize,
    pub message: String,
}

impl RowProcessingError {
    pub fn new<M: Into<String>>(row: usize, message: M) -> Self {
        Self {
            row,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_error_renders_with_one_based_index() {
        let err = RowProcessingError::new(3, "UNIQUE constraint failed");
        assert_eq!(err.to_string(), "Row 3: UNIQUE constraint failed");
    }

    #[test]
    fn fatal_errors_render_like_the_worker_messages() {
        assert_eq!(
            IngestError::EmptyDataset.to_string(),
            "no data found in file"
        );
        assert_eq!(
            IngestError::UnsupportedFormat(".pdf".to_string()).to_string(),
            "unsupported file type: .pdf"
        );
    }
}
