//! Error taxonomy for session operations.
//!
//! Every store, retrieval, and search operation returns
//! `Result<T, SessionError>`. Low-level I/O failures are caught once at the
//! operation boundary and wrapped into one of the variants below, keeping the
//! underlying cause as text.
//!
//! | Code | Meaning |
//! |------|---------|
//! | `INVALID_INPUT` | Caller data violates a stated constraint |
//! | `DIRECTORY_CREATION_ERROR` | A partition or topic folder could not be created |
//! | `FILE_WRITE_ERROR` | A document file could not be written or failed path validation |
//! | `FILE_READ_ERROR` | A document file could not be read or failed path validation |
//! | `FILENAME_GENERATION_ERROR` | No collision-free topic folder name was found |
//! | `EXPORT_FILE_NOT_FOUND` | An import source file does not exist |
//! | `EXPORT_PARSE_ERROR` | An import source file could not be decoded |
//! | `UNKNOWN_ERROR` | Anything else |

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{message}: {cause}")]
    DirectoryCreation { message: String, cause: String },

    #[error("{message}")]
    FileWrite {
        message: String,
        cause: Option<String>,
    },

    #[error("{message}")]
    FileRead {
        message: String,
        cause: Option<String>,
    },

    #[error("{message}: {cause}")]
    FilenameGeneration { message: String, cause: String },

    #[error("Export file not found: {path}. Check the path and export the chat again if it was moved.")]
    ExportFileNotFound { path: String },

    #[error("{message}. Re-export the conversation as Markdown (.md) or JSON (.json) and try again.")]
    ExportParse { message: String },

    #[error("{message}: {cause}")]
    Unknown { message: String, cause: String },
}

pub type Result<T> = std::result::Result<T, SessionError>;

impl SessionError {
    /// Machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            SessionError::InvalidInput(_) => "INVALID_INPUT",
            SessionError::DirectoryCreation { .. } => "DIRECTORY_CREATION_ERROR",
            SessionError::FileWrite { .. } => "FILE_WRITE_ERROR",
            SessionError::FileRead { .. } => "FILE_READ_ERROR",
            SessionError::FilenameGeneration { .. } => "FILENAME_GENERATION_ERROR",
            SessionError::ExportFileNotFound { .. } => "EXPORT_FILE_NOT_FOUND",
            SessionError::ExportParse { .. } => "EXPORT_PARSE_ERROR",
            SessionError::Unknown { .. } => "UNKNOWN_ERROR",
        }
    }

    /// Underlying cause text, when the failure wraps a lower-level error.
    pub fn details(&self) -> Option<&str> {
        match self {
            SessionError::DirectoryCreation { cause, .. }
            | SessionError::FilenameGeneration { cause, .. }
            | SessionError::Unknown { cause, .. } => Some(cause),
            SessionError::FileWrite { cause, .. } | SessionError::FileRead { cause, .. } => {
                cause.as_deref()
            }
            _ => None,
        }
    }

    pub(crate) fn directory(message: &str, err: impl std::fmt::Display) -> Self {
        SessionError::DirectoryCreation {
            message: message.to_string(),
            cause: err.to_string(),
        }
    }

    pub(crate) fn write(message: &str, err: impl std::fmt::Display) -> Self {
        SessionError::FileWrite {
            message: message.to_string(),
            cause: Some(err.to_string()),
        }
    }

    pub(crate) fn read(message: &str, err: impl std::fmt::Display) -> Self {
        SessionError::FileRead {
            message: message.to_string(),
            cause: Some(err.to_string()),
        }
    }

    pub(crate) fn unknown(message: &str, err: impl std::fmt::Display) -> Self {
        SessionError::Unknown {
            message: message.to_string(),
            cause: err.to_string(),
        }
    }

    /// Serializable view used by the CLI's `--json` output.
    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            success: false,
            error: self.code().to_string(),
            message: self.to_string(),
            details: self.details().map(str::to_string),
        }
    }
}

/// JSON failure envelope: `{ "success": false, "error": <code>, "message": ..., "details": ... }`.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}
