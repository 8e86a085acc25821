//! Virtual Filesystem abstraction.
//!
//! Several storage backends are composed into one hierarchical namespace:
//!
//! - [`VfsOps`] - Core trait for filesystem operations
//! - [`MountTable`] - Write-once routing table with longest-prefix matching
//! - [`MemoryBackend`] - In-memory read-write storage (user data, uploads)
//! - [`LocalBackend`] - A real directory, optionally read-only
//! - [`RemoteBackend`] - Read-only, lazily fetched files over a [`Fetch`] transport
//!
//! ```text
//! /home
//! ├── web_user/retroarch/userdata/   # MemoryBackend (rw)
//! ├── web_user/retroarch/bundle/     # RemoteBackend (ro, .index-xhr)
//! └── web_user/content/              # RemoteBackend (ro, fixed file list)
//! ```

pub mod backends;
mod error;
mod mount;
mod ops;
mod types;

use std::path::{Component, Path, PathBuf};

pub use backends::{Fetch, HttpFetch, LocalBackend, MemoryBackend, RemoteBackend, RemoteIndex};
pub use error::{VfsError, VfsResult};
pub use mount::{MountEntry, MountInfo, MountTable, OverlapPolicy};
pub use ops::VfsOps;
pub use types::{DirEntry, FileAttr, FileType};

/// Normalize a backend-relative path: drop the leading `/`, resolve `.`
/// and `..` lexically. `..` at the top is ignored.
pub(crate) fn relative_path(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                result.pop();
            }
            Component::Normal(s) => result.push(s),
            Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
        }
    }
    result
}
