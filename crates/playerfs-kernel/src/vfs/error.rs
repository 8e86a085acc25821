//! VFS error types.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// VFS error type.
#[derive(Debug, Error)]
pub enum VfsError {
    /// File or directory not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Path already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Permission denied.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Filesystem is read-only.
    #[error("filesystem is read-only")]
    ReadOnly,

    /// Expected a directory.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// Expected a file.
    #[error("is a directory: {0}")]
    IsADirectory(String),

    /// Directory still has entries.
    #[error("directory not empty: {0}")]
    DirectoryNotEmpty(String),

    /// File is larger than a single read can return.
    #[error("file too large: {0}")]
    TooLarge(String),

    /// Path escapes the backend root.
    #[error("path escapes root: {0}")]
    PathEscapesRoot(String),

    /// Invalid path.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// No mount point covers the path.
    #[error("no mount point for path: {0}")]
    NoMountPoint(String),

    /// Two mount entries claim overlapping mount points.
    #[error("mount point {requested} overlaps {existing}")]
    MountOverlap {
        existing: PathBuf,
        requested: PathBuf,
    },

    /// A remote transport failed.
    #[error("remote fetch failed: {0}")]
    Remote(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl VfsError {
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    pub fn already_exists(path: impl Into<String>) -> Self {
        Self::AlreadyExists(path.into())
    }

    pub fn permission_denied(path: impl Into<String>) -> Self {
        Self::PermissionDenied(path.into())
    }

    pub fn not_a_directory(path: impl Into<String>) -> Self {
        Self::NotADirectory(path.into())
    }

    pub fn is_a_directory(path: impl Into<String>) -> Self {
        Self::IsADirectory(path.into())
    }

    pub fn directory_not_empty(path: impl Into<String>) -> Self {
        Self::DirectoryNotEmpty(path.into())
    }

    pub fn path_escapes_root(path: impl Into<String>) -> Self {
        Self::PathEscapesRoot(path.into())
    }

    pub fn invalid_path(path: impl Into<String>) -> Self {
        Self::InvalidPath(path.into())
    }

    pub fn no_mount_point(path: impl Into<String>) -> Self {
        Self::NoMountPoint(path.into())
    }

    pub fn remote(msg: impl Into<String>) -> Self {
        Self::Remote(msg.into())
    }

    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// True when the error means "nothing lives at this path".
    ///
    /// Covers backend misses, uncovered namespace paths, and I/O errors of
    /// kind `NotFound` coming out of [`LocalBackend`](super::LocalBackend).
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) | Self::NoMountPoint(_) => true,
            Self::Io(e) => e.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

/// VFS result type.
pub type VfsResult<T> = Result<T, VfsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_not_found() {
        assert!(VfsError::not_found("a").is_not_found());
        assert!(VfsError::no_mount_point("/x").is_not_found());
        assert!(VfsError::Io(io::Error::from(io::ErrorKind::NotFound)).is_not_found());
        assert!(!VfsError::ReadOnly.is_not_found());
        assert!(!VfsError::remote("502").is_not_found());
    }

    #[test]
    fn test_overlap_message() {
        let err = VfsError::MountOverlap {
            existing: PathBuf::from("/home/data"),
            requested: PathBuf::from("/home/data"),
        };
        assert_eq!(
            err.to_string(),
            "mount point /home/data overlaps /home/data"
        );
    }
}
