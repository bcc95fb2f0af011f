//! Mapping document errors.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading or validating label rules.
#[derive(Debug, Error)]
pub enum MappingError {
    #[error("Failed to read mapping document {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed mapping document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid path pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Blank label for path pattern '{0}'")]
    BlankLabel(String),

    #[error("Blank action route")]
    BlankActionRoute,
}

impl MappingError {
    /// True when the document could not be found on disk.
    ///
    /// A missing file is an expected state (no rules configured yet), so
    /// callers log it at a lower level than a malformed document.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            MappingError::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound
        )
    }
}
