//! In-memory filesystem backend.
//!
//! Holds the user-writable side of the namespace: staged configuration,
//! snapshots and uploads. All data is ephemeral.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::RwLock;
use std::time::SystemTime;

use crate::vfs::error::{VfsError, VfsResult};
use crate::vfs::ops::VfsOps;
use crate::vfs::relative_path;
use crate::vfs::types::{DirEntry, FileAttr, FileType};

#[derive(Debug, Clone)]
enum Entry {
    File { data: Vec<u8>, attr: FileAttr },
    Directory { attr: FileAttr },
}

impl Entry {
    fn attr(&self) -> &FileAttr {
        match self {
            Entry::File { attr, .. } => attr,
            Entry::Directory { attr } => attr,
        }
    }

    fn kind(&self) -> FileType {
        match self {
            Entry::File { .. } => FileType::File,
            Entry::Directory { .. } => FileType::Directory,
        }
    }
}

/// In-memory filesystem backend.
///
/// Thread-safe via internal `RwLock`. All data is lost when dropped.
#[derive(Debug)]
pub struct MemoryBackend {
    entries: RwLock<HashMap<PathBuf, Entry>>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Create a new empty in-memory filesystem.
    pub fn new() -> Self {
        let mut entries = HashMap::new();
        // Root directory always exists
        entries.insert(
            PathBuf::new(),
            Entry::Directory {
                attr: FileAttr::directory(0o755),
            },
        );
        Self {
            entries: RwLock::new(entries),
        }
    }

    /// Create a backend pre-populated with files.
    ///
    /// Parent directories are implied by the paths.
    pub fn with_files<P, D>(files: impl IntoIterator<Item = (P, D)>) -> VfsResult<Self>
    where
        P: AsRef<Path>,
        D: Into<Vec<u8>>,
    {
        let fs = Self::new();
        for (path, data) in files {
            fs.insert_file(path.as_ref(), data.into())?;
        }
        Ok(fs)
    }

    fn normalize(path: &Path) -> PathBuf {
        relative_path(path)
    }

    fn path_str(path: &Path) -> String {
        path.display().to_string()
    }

    fn lock_err() -> VfsError {
        VfsError::other("lock poisoned")
    }

    /// Create every missing ancestor of `path` as a directory.
    fn ensure_parents(entries: &mut HashMap<PathBuf, Entry>, path: &Path) -> VfsResult<()> {
        let mut current = PathBuf::new();
        for component in path.parent().into_iter().flat_map(|p| p.components()) {
            if let Component::Normal(s) = component {
                current.push(s);
                match entries.get(&current) {
                    Some(Entry::Directory { .. }) => {}
                    Some(Entry::File { .. }) => {
                        return Err(VfsError::not_a_directory(Self::path_str(&current)));
                    }
                    None => {
                        entries.insert(
                            current.clone(),
                            Entry::Directory {
                                attr: FileAttr::directory(0o755),
                            },
                        );
                    }
                }
            }
        }
        Ok(())
    }

    fn insert_file(&self, path: &Path, data: Vec<u8>) -> VfsResult<()> {
        let normalized = Self::normalize(path);
        let mut entries = self.entries.write().map_err(|_| Self::lock_err())?;
        Self::ensure_parents(&mut entries, &normalized)?;
        let attr = FileAttr::file(data.len() as u64, 0o644);
        entries.insert(normalized, Entry::File { data, attr });
        Ok(())
    }
}

#[async_trait]
impl VfsOps for MemoryBackend {
    async fn getattr(&self, path: &Path) -> VfsResult<FileAttr> {
        let normalized = Self::normalize(path);
        let entries = self.entries.read().map_err(|_| Self::lock_err())?;
        entries
            .get(&normalized)
            .map(|e| e.attr().clone())
            .ok_or_else(|| VfsError::not_found(Self::path_str(&normalized)))
    }

    async fn readdir(&self, path: &Path) -> VfsResult<Vec<DirEntry>> {
        let normalized = Self::normalize(path);
        let entries = self.entries.read().map_err(|_| Self::lock_err())?;

        match entries.get(&normalized) {
            Some(Entry::Directory { .. }) => {}
            Some(_) => return Err(VfsError::not_a_directory(Self::path_str(&normalized))),
            None => return Err(VfsError::not_found(Self::path_str(&normalized))),
        }

        let mut result: Vec<DirEntry> = entries
            .iter()
            .filter(|(p, _)| p.parent() == Some(normalized.as_path()) && **p != normalized)
            .filter_map(|(p, e)| {
                p.file_name()
                    .map(|name| DirEntry::new(name.to_string_lossy(), e.kind()))
            })
            .collect();

        result.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(result)
    }

    async fn read(&self, path: &Path, offset: u64, size: u32) -> VfsResult<Vec<u8>> {
        let normalized = Self::normalize(path);
        let entries = self.entries.read().map_err(|_| Self::lock_err())?;

        match entries.get(&normalized) {
            Some(Entry::File { data, .. }) => {
                let start = (offset as usize).min(data.len());
                let end = start.saturating_add(size as usize).min(data.len());
                Ok(data[start..end].to_vec())
            }
            Some(Entry::Directory { .. }) => {
                Err(VfsError::is_a_directory(Self::path_str(&normalized)))
            }
            None => Err(VfsError::not_found(Self::path_str(&normalized))),
        }
    }

    async fn write(&self, path: &Path, offset: u64, data: &[u8]) -> VfsResult<u32> {
        let normalized = Self::normalize(path);
        let mut entries = self.entries.write().map_err(|_| Self::lock_err())?;

        match entries.get_mut(&normalized) {
            Some(Entry::File {
                data: file_data,
                attr,
            }) => {
                let offset = offset as usize;
                if offset + data.len() > file_data.len() {
                    file_data.resize(offset + data.len(), 0);
                }
                file_data[offset..offset + data.len()].copy_from_slice(data);
                attr.size = file_data.len() as u64;
                attr.mtime = SystemTime::now();
                Ok(data.len() as u32)
            }
            Some(Entry::Directory { .. }) => {
                Err(VfsError::is_a_directory(Self::path_str(&normalized)))
            }
            None => Err(VfsError::not_found(Self::path_str(&normalized))),
        }
    }

    async fn create(&self, path: &Path, mode: u32) -> VfsResult<FileAttr> {
        let normalized = Self::normalize(path);
        if normalized.as_os_str().is_empty() {
            return Err(VfsError::already_exists("/"));
        }

        let mut entries = self.entries.write().map_err(|_| Self::lock_err())?;
        Self::ensure_parents(&mut entries, &normalized)?;

        if entries.contains_key(&normalized) {
            return Err(VfsError::already_exists(Self::path_str(&normalized)));
        }

        let attr = FileAttr::file(0, mode);
        entries.insert(
            normalized,
            Entry::File {
                data: Vec::new(),
                attr: attr.clone(),
            },
        );
        Ok(attr)
    }

    async fn mkdir(&self, path: &Path, mode: u32) -> VfsResult<FileAttr> {
        let normalized = Self::normalize(path);
        let mut entries = self.entries.write().map_err(|_| Self::lock_err())?;
        Self::ensure_parents(&mut entries, &normalized)?;

        if let Some(existing) = entries.get(&normalized) {
            return match existing {
                Entry::Directory { attr } => Ok(attr.clone()),
                Entry::File { .. } => Err(VfsError::already_exists(Self::path_str(&normalized))),
            };
        }

        let attr = FileAttr::directory(mode);
        entries.insert(normalized, Entry::Directory { attr: attr.clone() });
        Ok(attr)
    }

    async fn unlink(&self, path: &Path) -> VfsResult<()> {
        let normalized = Self::normalize(path);
        let mut entries = self.entries.write().map_err(|_| Self::lock_err())?;

        match entries.get(&normalized) {
            Some(Entry::Directory { .. }) => {
                Err(VfsError::is_a_directory(Self::path_str(&normalized)))
            }
            Some(Entry::File { .. }) => {
                entries.remove(&normalized);
                Ok(())
            }
            None => Err(VfsError::not_found(Self::path_str(&normalized))),
        }
    }

    async fn rmdir(&self, path: &Path) -> VfsResult<()> {
        let normalized = Self::normalize(path);
        if normalized.as_os_str().is_empty() {
            return Err(VfsError::permission_denied("cannot remove root"));
        }

        let mut entries = self.entries.write().map_err(|_| Self::lock_err())?;
        match entries.get(&normalized) {
            Some(Entry::Directory { .. }) => {}
            Some(Entry::File { .. }) => {
                return Err(VfsError::not_a_directory(Self::path_str(&normalized)));
            }
            None => return Err(VfsError::not_found(Self::path_str(&normalized))),
        }

        if entries.keys().any(|k| k.parent() == Some(normalized.as_path())) {
            return Err(VfsError::directory_not_empty(Self::path_str(&normalized)));
        }

        entries.remove(&normalized);
        Ok(())
    }

    async fn truncate(&self, path: &Path, size: u64) -> VfsResult<()> {
        let normalized = Self::normalize(path);
        let mut entries = self.entries.write().map_err(|_| Self::lock_err())?;

        match entries.get_mut(&normalized) {
            Some(Entry::File { data, attr }) => {
                data.resize(size as usize, 0);
                attr.size = size;
                attr.mtime = SystemTime::now();
                Ok(())
            }
            Some(Entry::Directory { .. }) => {
                Err(VfsError::is_a_directory(Self::path_str(&normalized)))
            }
            None => Err(VfsError::not_found(Self::path_str(&normalized))),
        }
    }

    fn read_only(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_and_read() {
        let fs = MemoryBackend::new();
        fs.create(Path::new("test.txt"), 0o644).await.unwrap();
        fs.write(Path::new("test.txt"), 0, b"hello world")
            .await
            .unwrap();

        let data = fs.read(Path::new("test.txt"), 0, 100).await.unwrap();
        assert_eq!(data, b"hello world");

        let data = fs.read(Path::new("test.txt"), 6, 5).await.unwrap();
        assert_eq!(data, b"world");
    }

    #[tokio::test]
    async fn test_with_files_implies_directories() {
        let fs = MemoryBackend::with_files([("a/b/c.cfg", "X=1")]).unwrap();
        assert!(fs.getattr(Path::new("a")).await.unwrap().is_dir());
        assert!(fs.getattr(Path::new("a/b")).await.unwrap().is_dir());
        assert_eq!(fs.read_all(Path::new("a/b/c.cfg")).await.unwrap(), b"X=1");
    }

    #[tokio::test]
    async fn test_mkdir_is_idempotent_and_recursive() {
        let fs = MemoryBackend::new();
        fs.mkdir(Path::new("states/deep"), 0o755).await.unwrap();
        fs.mkdir(Path::new("states/deep"), 0o755).await.unwrap();
        assert!(fs.getattr(Path::new("states")).await.unwrap().is_dir());

        fs.create(Path::new("file"), 0o644).await.unwrap();
        assert!(matches!(
            fs.mkdir(Path::new("file"), 0o755).await,
            Err(VfsError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn test_readdir() {
        let fs = MemoryBackend::new();
        fs.mkdir(Path::new("subdir"), 0o755).await.unwrap();
        fs.create(Path::new("subdir/file.txt"), 0o644).await.unwrap();
        fs.create(Path::new("root.txt"), 0o644).await.unwrap();

        let entries = fs.readdir(Path::new("")).await.unwrap();
        assert_eq!(
            entries,
            vec![DirEntry::file("root.txt"), DirEntry::directory("subdir")]
        );

        let sub = fs.readdir(Path::new("/subdir")).await.unwrap();
        assert_eq!(sub, vec![DirEntry::file("file.txt")]);

        assert!(matches!(
            fs.readdir(Path::new("root.txt")).await,
            Err(VfsError::NotADirectory(_))
        ));
    }

    #[tokio::test]
    async fn test_write_all_overwrites() {
        let fs = MemoryBackend::new();
        fs.write_all(Path::new("foo.nes"), b"longer content").await.unwrap();
        fs.write_all(Path::new("foo.nes"), b"short").await.unwrap();
        assert_eq!(fs.read_all(Path::new("foo.nes")).await.unwrap(), b"short");
    }

    #[tokio::test]
    async fn test_unlink() {
        let fs = MemoryBackend::new();
        fs.create(Path::new("test.txt"), 0o644).await.unwrap();
        fs.unlink(Path::new("test.txt")).await.unwrap();
        assert!(!fs.exists(Path::new("test.txt")).await);
        assert!(fs.unlink(Path::new("test.txt")).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_rmdir() {
        let fs = MemoryBackend::new();
        fs.mkdir(Path::new("states/deep"), 0o755).await.unwrap();

        assert!(matches!(
            fs.rmdir(Path::new("states")).await,
            Err(VfsError::DirectoryNotEmpty(_))
        ));
        fs.rmdir(Path::new("states/deep")).await.unwrap();
        fs.rmdir(Path::new("states")).await.unwrap();
        assert!(!fs.exists(Path::new("states")).await);

        fs.create(Path::new("file"), 0o644).await.unwrap();
        assert!(matches!(
            fs.rmdir(Path::new("file")).await,
            Err(VfsError::NotADirectory(_))
        ));
        assert!(fs.rmdir(Path::new("gone")).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_file_blocks_parent_creation() {
        let fs = MemoryBackend::new();
        fs.create(Path::new("blocker"), 0o644).await.unwrap();
        assert!(matches!(
            fs.create(Path::new("blocker/child"), 0o644).await,
            Err(VfsError::NotADirectory(_))
        ));
    }

    #[tokio::test]
    async fn test_path_normalization() {
        let fs = MemoryBackend::new();
        fs.create(Path::new("/a/b/c.txt"), 0o644).await.unwrap();

        assert!(fs.getattr(Path::new("a/b/c.txt")).await.is_ok());
        assert!(fs.getattr(Path::new("/a/b/c.txt")).await.is_ok());
        assert!(fs.getattr(Path::new("a/./b/c.txt")).await.is_ok());
        assert!(fs.getattr(Path::new("a/b/../b/c.txt")).await.is_ok());
    }
}
