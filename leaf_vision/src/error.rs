// THEORY:
// Errors are split by how far they propagate. `CorpusNotFound` and `Config`
// stop a run before any file is touched. `Decode` and `Write` belong to a
// single file: the orchestrators catch them, record them in the batch
// summary and move on to the next file.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, LeafError>;

#[derive(Debug, Error)]
pub enum LeafError {
    /// The input root does not exist. Nothing has been written.
    #[error("input corpus not found: {0}")]
    CorpusNotFound(PathBuf),

    /// The file could not be opened or decoded as an image.
    #[error("failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// The composite could not be encoded or its directory could not be created.
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("i/o error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration in {path}: {message}")]
    Config { path: PathBuf, message: String },

    /// A pooled worker dropped the job (panicked or shut down) before answering.
    #[error("worker failed on {path}: {message}")]
    Worker { path: PathBuf, message: String },
}

impl LeafError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LeafError::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether a batch can continue past this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            LeafError::Decode { .. } | LeafError::Write { .. } | LeafError::Worker { .. }
        )
    }
}
