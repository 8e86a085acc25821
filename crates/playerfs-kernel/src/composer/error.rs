//! Composer error types.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::vfs::VfsError;

/// Errors from composing, staging and uploading.
#[derive(Debug, Error)]
pub enum ComposeError {
    /// Invalid or overlapping mount setup.
    #[error("invalid mount configuration: {0}")]
    Configuration(#[source] VfsError),

    /// A manifest source does not resolve through any mount.
    #[error("staging source not found: {}", path.display())]
    SourceNotFound {
        path: PathBuf,
        #[source]
        source: VfsError,
    },

    /// A manifest source exists but could not be read.
    #[error("reading staging source {} failed: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: VfsError,
    },

    /// The destination backend rejected a write.
    #[error("write to {} failed: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: VfsError,
    },

    #[error("staging did not finish within {0:?}")]
    StagingTimeout(Duration),

    /// Upload names are leaf names only.
    #[error("invalid upload file name: {0:?}")]
    InvalidFileName(String),
}

impl ComposeError {
    pub fn source_not_found(path: impl Into<PathBuf>, source: VfsError) -> Self {
        Self::SourceNotFound {
            path: path.into(),
            source,
        }
    }

    /// `SourceNotFound` when nothing lives at `path`, `Read` otherwise.
    pub fn read(path: impl Into<PathBuf>, source: VfsError) -> Self {
        let path = path.into();
        if source.is_not_found() {
            Self::SourceNotFound { path, source }
        } else {
            Self::Read { path, source }
        }
    }

    pub fn write(path: impl Into<PathBuf>, source: VfsError) -> Self {
        Self::Write {
            path: path.into(),
            source,
        }
    }
}

pub type ComposeResult<T> = Result<T, ComposeError>;
