//! Error types for manifest parsing and validation.

use thiserror::Error;

/// Errors raised while parsing or validating a tool manifest document.
#[derive(Error, Debug)]
pub enum ManifestError {
    /// The document was neither valid YAML nor valid JSON.
    #[error("manifest at '{path}' is not valid YAML or JSON: {reason}")]
    Parse {
        /// Path to the manifest file.
        path: String,
        /// Underlying parser message (YAML error, since it is tried first).
        reason: String,
    },

    /// A required field was empty or missing after defaults were applied.
    #[error("manifest field '{field}' must not be empty")]
    MissingField {
        /// Name of the offending field.
        field: String,
    },
}
