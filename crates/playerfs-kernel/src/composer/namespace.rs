//! The composed namespace handle.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::vfs::{MountInfo, MountTable, VfsOps, VfsResult};

/// A composed namespace.
///
/// Cloning is cheap; every clone routes through the same write-once
/// mount table and the same backends.
#[derive(Debug, Clone)]
pub struct Namespace {
    table: Arc<MountTable>,
}

impl Namespace {
    pub(crate) fn new(table: MountTable) -> Self {
        Self {
            table: Arc::new(table),
        }
    }

    /// Read a whole file.
    pub async fn read(&self, path: impl AsRef<Path>) -> VfsResult<Vec<u8>> {
        self.table.read_all(path.as_ref()).await
    }

    pub async fn exists(&self, path: impl AsRef<Path>) -> bool {
        self.table.exists(path.as_ref()).await
    }

    /// Mounts, sorted by path.
    pub fn mounts(&self) -> Vec<MountInfo> {
        self.table.list_mounts()
    }

    /// Real filesystem path for a namespace path, if a local directory
    /// backs it.
    pub fn real_path(&self, path: impl AsRef<Path>) -> Option<PathBuf> {
        self.table.real_path(path.as_ref())
    }

    /// The full filesystem interface.
    pub fn vfs(&self) -> &MountTable {
        &self.table
    }
}
