//! Error taxonomy for the file store (§4.6).

use std::path::PathBuf;

use thiserror::Error;

/// Failure modes surfaced by [`crate::FileStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// No row exists for the given id.
    #[error("file {id} not found")]
    NotFound {
        /// The id that was looked up.
        id: String,
    },

    /// The underlying SQLite database returned an error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A filesystem operation on a blob or its staging copy failed.
    #[error("blob io error at {path}: {source}")]
    Io {
        /// The path the failing operation targeted.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },
}
