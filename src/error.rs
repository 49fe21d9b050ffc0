//! Custom error types for the application.
//!
//! This module defines the primary error type, `RecorderError`, for the entire
//! application. Using the `thiserror` crate, it provides a centralized and
//! consistent way to handle the failure kinds that matter to callers, from
//! missing files and malformed JSON to an unreachable lab data share.
//!
//! ## Propagation policy
//!
//! - `InvalidStructure` and `MissingMetadata` are advisory: the caller is
//!   expected to turn them into a yes/no decision (open anyway, create the
//!   file) and retry with the matching [`crate::session::OpenOptions`] flag.
//!   They are never auto-resolved here.
//! - `AccessError` means the lab data root is unreachable. It is checked
//!   proactively before any mutating operation, is fatal to that operation
//!   only, and is never retried automatically: a network mount does not
//!   self-heal within a session.
//! - `CorruptFile` on metadata load is fatal to the open operation; no
//!   partial parse is attempted.
//! - All other I/O errors (permissions, disk full) propagate unmodified via
//!   the `Io` variant.

use std::path::PathBuf;
use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, RecorderError>;

/// Application-level error kinds.
#[derive(Error, Debug)]
pub enum RecorderError {
    /// Configuration loading or parsing failed.
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// A named resource (template, folder, registry entry) does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A create operation targeted a name or path that is already taken.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// A JSON file on disk could not be parsed.
    #[error("Corrupt file {path}: {source}")]
    CorruptFile {
        /// Path of the unparseable file.
        path: PathBuf,
        /// Underlying JSON error.
        source: serde_json::Error,
    },

    /// A folder is missing the subdirectories its experiment type declares.
    /// Recoverable: the caller may confirm opening it anyway.
    #[error("Folder {path} is missing expected subdirectories: {missing:?}")]
    InvalidStructure {
        /// The folder that failed validation.
        path: PathBuf,
        /// Relative subdirectories that were expected but absent.
        missing: Vec<PathBuf>,
    },

    /// A folder has no `metadata.json`. Recoverable: the caller may confirm
    /// creating one.
    #[error("Folder {0} has no metadata.json")]
    MissingMetadata(PathBuf),

    /// The lab data root is unreachable (e.g. network share unmounted).
    #[error("Cannot access data root {0}; check labserver connection")]
    AccessError(PathBuf),

    /// A column label not defined by the active table layout.
    #[error("Unknown column: {0}")]
    UnknownColumn(String),

    /// A structural operation was attempted while no folder is open.
    #[error("No folder is open")]
    NoOpenFolder,

    /// A mutating operation was attempted while a recording worker owns the
    /// open folder.
    #[error("A recording is in progress for the open folder")]
    RecordingActive,

    /// `close()` was called with unsaved edits; the caller must save or
    /// explicitly discard.
    #[error("The open folder has unsaved changes")]
    UnsavedChanges,

    /// The chosen experiment path does not resolve under the lab data root.
    #[error("Path {0} is not under the lab data root")]
    PathOutsideDataRoot(PathBuf),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Acquisition collaborator failure (camera/frame source).
    #[error("Acquisition error: {0}")]
    Acquisition(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RecorderError::NotFound("variables_registry_Standard".to_string());
        assert_eq!(err.to_string(), "Not found: variables_registry_Standard");
    }

    #[test]
    fn test_invalid_structure_lists_missing_dirs() {
        let err = RecorderError::InvalidStructure {
            path: PathBuf::from("/data/exp1"),
            missing: vec![PathBuf::from("arena1/corridor1")],
        };
        assert!(err.to_string().contains("arena1/corridor1"));
    }
}
