use thiserror::Error;

use crate::session::UploadId;

/// Errors raised while moving an upload through the transform pipeline.
///
/// Every variant is recoverable at the per-file boundary: the session records
/// it against the file that produced it and carries on with the others.
#[derive(Error, Debug)]
pub enum SweeperError {
    #[error("Unsupported file type: {extension}")]
    UnsupportedFormat { extension: String },

    #[error("Failed to parse {name}: {reason}")]
    Parse { name: String, reason: String },

    #[error("Failed to encode {target}: {reason}")]
    Encode { target: String, reason: String },

    #[error("No numeric columns available for visualization.")]
    NoNumericColumns,

    #[error("Please select at least one column for visualization.")]
    NoColumnsSelected,

    #[error("Unknown column: {0}")]
    UnknownColumn(String),

    #[error("Column {0} is not numeric")]
    NotNumeric(String),

    #[error("No upload with id {0}")]
    UnknownUpload(UploadId),

    #[error("Invalid upload id {0}")]
    InvalidUploadId(String),

    #[error("{name} was rejected: {reason}")]
    FileRejected { name: String, reason: String },

    #[error("Cleaning is not enabled for {0}")]
    CleaningDisabled(String),

    #[error("{0} has not been converted yet")]
    NotConverted(String),

    #[error("Failed to render chart: {0}")]
    Render(String),

    #[error("{0}")]
    Io(#[from] std::io::Error),
}

impl SweeperError {
    pub(crate) fn parse(name: &str, reason: impl ToString) -> Self {
        SweeperError::Parse {
            name: name.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn encode(target: &str, reason: impl ToString) -> Self {
        SweeperError::Encode {
            target: target.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Advisory conditions: the step is skipped, nothing went wrong.
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            SweeperError::NoNumericColumns | SweeperError::NoColumnsSelected
        )
    }
}

pub type Result<T> = std::result::Result<T, SweeperError>;
