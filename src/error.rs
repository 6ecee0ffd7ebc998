//! Error taxonomy for the crate (§7).

use thiserror::Error;

/// Result alias used throughout the public API.
pub type Result<T> = std::result::Result<T, VroomError>;

/// The three visible error kinds plus a catch-all escape hatch for
/// collaborator glue, mirroring the teacher's `PolarsError::Other`.
#[derive(Debug, Error)]
pub enum VroomError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error at byte {offset}: {message}")]
    Parse { offset: u64, message: String },

    #[error("invalid option: {0}")]
    Option(String),

    #[error("column not found: {0}")]
    KeyError(String),

    #[error("column index out of range: {0}")]
    IndexError(usize),

    #[error("parsing cancelled")]
    Cancelled,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl VroomError {
    pub(crate) fn parse(offset: u64, message: impl Into<String>) -> Self {
        VroomError::Parse {
            offset,
            message: message.into(),
        }
    }
}

impl From<arrow::error::ArrowError> for VroomError {
    fn from(err: arrow::error::ArrowError) -> Self {
        VroomError::Other(anyhow::anyhow!(err))
    }
}
