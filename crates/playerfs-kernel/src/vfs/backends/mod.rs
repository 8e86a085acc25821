//! VFS backends.
//!
//! Backends implement [`VfsOps`](super::VfsOps) for different storage types.

mod local;
mod memory;
mod remote;

pub use local::LocalBackend;
pub use memory::MemoryBackend;
pub use remote::{Fetch, HttpFetch, RemoteBackend, RemoteIndex};
