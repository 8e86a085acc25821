//! Local filesystem backend.
//!
//! Maps a subtree of the namespace onto a real directory, with path
//! security to prevent escaping the root.

use async_trait::async_trait;
use std::os::unix::fs::PermissionsExt;
use std::path::{Component, Path, PathBuf};
use tokio::fs;

use crate::vfs::error::{VfsError, VfsResult};
use crate::vfs::ops::VfsOps;
use crate::vfs::types::{DirEntry, FileAttr, FileType};

/// Local filesystem backend.
///
/// All operations are relative to `root`: if `root` is `/srv/player`,
/// then `read("retroarch.cfg")` reads `/srv/player/retroarch.cfg`.
#[derive(Debug, Clone)]
pub struct LocalBackend {
    root: PathBuf,
    read_only: bool,
}

impl LocalBackend {
    /// Create a writable local filesystem rooted at the given path.
    ///
    /// The root is canonicalized when it exists so that symlinked roots
    /// (e.g. macOS `/tmp`) compare correctly during escape checks.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root: PathBuf = root.into();
        let root = root.canonicalize().unwrap_or(root);
        Self {
            root,
            read_only: false,
        }
    }

    /// Create a read-only local filesystem.
    pub fn read_only(root: impl Into<PathBuf>) -> Self {
        Self {
            read_only: true,
            ..Self::new(root)
        }
    }

    /// Get the root path.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Join a backend-relative path onto the root, lexically.
    ///
    /// `..` may not climb above the root.
    fn join(&self, path: &Path) -> VfsResult<PathBuf> {
        let mut relative = PathBuf::new();
        for component in path.components() {
            match component {
                Component::Normal(s) => relative.push(s),
                Component::ParentDir => {
                    if !relative.pop() {
                        return Err(VfsError::path_escapes_root(path.display().to_string()));
                    }
                }
                Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
            }
        }
        Ok(self.root.join(relative))
    }

    /// Resolve to a real path and verify symlinks don't lead outside the root.
    async fn resolve(&self, path: &Path) -> VfsResult<PathBuf> {
        let full = self.join(path)?;

        // Only the deepest existing ancestor can be canonicalized. Stop at
        // the root: a missing root fails later on the actual operation.
        let mut candidate = full.as_path();
        let canonical = loop {
            match fs::canonicalize(candidate).await {
                Ok(c) => break Some(c),
                Err(_) => match candidate.parent() {
                    Some(parent) if parent.starts_with(&self.root) => candidate = parent,
                    _ => break None,
                },
            }
        };

        if let Some(canonical) = canonical {
            if !canonical.starts_with(&self.root) {
                return Err(VfsError::path_escapes_root(format!(
                    "{} is not under {}",
                    canonical.display(),
                    self.root.display()
                )));
            }
        }

        Ok(full)
    }

    fn check_writable(&self) -> VfsResult<()> {
        if self.read_only {
            Err(VfsError::ReadOnly)
        } else {
            Ok(())
        }
    }

    fn metadata_to_attr(meta: &std::fs::Metadata) -> FileAttr {
        FileAttr {
            size: if meta.is_dir() { 0 } else { meta.len() },
            kind: if meta.is_dir() {
                FileType::Directory
            } else {
                FileType::File
            },
            perm: meta.permissions().mode() & 0o7777,
            mtime: meta.modified().unwrap_or(std::time::SystemTime::UNIX_EPOCH),
        }
    }
}

#[async_trait]
impl VfsOps for LocalBackend {
    async fn getattr(&self, path: &Path) -> VfsResult<FileAttr> {
        let full_path = self.resolve(path).await?;
        let meta = fs::metadata(&full_path).await?;
        Ok(Self::metadata_to_attr(&meta))
    }

    async fn readdir(&self, path: &Path) -> VfsResult<Vec<DirEntry>> {
        let full_path = self.resolve(path).await?;
        let mut entries = Vec::new();
        let mut dir = fs::read_dir(&full_path).await?;

        while let Some(entry) = dir.next_entry().await? {
            let kind = if fs::metadata(entry.path()).await?.is_dir() {
                FileType::Directory
            } else {
                FileType::File
            };
            entries.push(DirEntry::new(
                entry.file_name().to_string_lossy(),
                kind,
            ));
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn read(&self, path: &Path, offset: u64, size: u32) -> VfsResult<Vec<u8>> {
        use tokio::io::{AsyncReadExt, AsyncSeekExt};

        let full_path = self.resolve(path).await?;
        let mut file = fs::File::open(&full_path).await?;
        file.seek(std::io::SeekFrom::Start(offset)).await?;

        let mut buffer = Vec::with_capacity(size as usize);
        file.take(u64::from(size)).read_to_end(&mut buffer).await?;
        Ok(buffer)
    }

    async fn write(&self, path: &Path, offset: u64, data: &[u8]) -> VfsResult<u32> {
        use tokio::io::{AsyncSeekExt, AsyncWriteExt};

        self.check_writable()?;
        let full_path = self.resolve(path).await?;

        let mut file = fs::OpenOptions::new().write(true).open(&full_path).await?;
        file.seek(std::io::SeekFrom::Start(offset)).await?;
        file.write_all(data).await?;
        file.flush().await?;

        Ok(data.len() as u32)
    }

    async fn create(&self, path: &Path, mode: u32) -> VfsResult<FileAttr> {
        self.check_writable()?;
        let full_path = self.resolve(path).await?;

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(mode)
            .open(&full_path)
            .await?;

        let meta = file.metadata().await?;
        Ok(Self::metadata_to_attr(&meta))
    }

    async fn mkdir(&self, path: &Path, mode: u32) -> VfsResult<FileAttr> {
        self.check_writable()?;
        let full_path = self.resolve(path).await?;

        fs::DirBuilder::new()
            .recursive(true)
            .mode(mode)
            .create(&full_path)
            .await?;

        let meta = fs::metadata(&full_path).await?;
        Ok(Self::metadata_to_attr(&meta))
    }

    async fn unlink(&self, path: &Path) -> VfsResult<()> {
        self.check_writable()?;
        let full_path = self.resolve(path).await?;
        fs::remove_file(&full_path).await?;
        Ok(())
    }

    async fn rmdir(&self, path: &Path) -> VfsResult<()> {
        self.check_writable()?;
        let full_path = self.resolve(path).await?;
        if full_path == self.root {
            return Err(VfsError::permission_denied("cannot remove root"));
        }
        fs::remove_dir(&full_path).await?;
        Ok(())
    }

    async fn truncate(&self, path: &Path, size: u64) -> VfsResult<()> {
        self.check_writable()?;
        let full_path = self.resolve(path).await?;
        let file = fs::OpenOptions::new().write(true).open(&full_path).await?;
        file.set_len(size).await?;
        Ok(())
    }

    fn read_only(&self) -> bool {
        self.read_only
    }

    fn real_path(&self, path: &Path) -> Option<PathBuf> {
        self.join(path).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_write_and_read() {
        let dir = tempdir().unwrap();
        let fs = LocalBackend::new(dir.path());

        fs.write_all(Path::new("states/game.state1.entry"), b"snapshot")
            .await
            .unwrap();

        assert_eq!(
            fs.read_all(Path::new("states/game.state1.entry")).await.unwrap(),
            b"snapshot"
        );
        assert!(fs.getattr(Path::new("states")).await.unwrap().is_dir());
        assert!(dir.path().join("states/game.state1.entry").exists());
    }

    #[tokio::test]
    async fn test_partial_read() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("rom.nes"), b"NES\x1a header").unwrap();
        let fs = LocalBackend::read_only(dir.path());

        assert_eq!(fs.read(Path::new("rom.nes"), 0, 4).await.unwrap(), b"NES\x1a");
        assert_eq!(fs.read(Path::new("rom.nes"), 5, 100).await.unwrap(), b"header");
    }

    #[tokio::test]
    async fn test_read_only_rejects_writes() {
        let dir = tempdir().unwrap();
        let fs = LocalBackend::read_only(dir.path());

        assert!(matches!(
            fs.write_all(Path::new("x"), b"1").await,
            Err(VfsError::ReadOnly)
        ));
        assert!(matches!(
            fs.mkdir(Path::new("d"), 0o755).await,
            Err(VfsError::ReadOnly)
        ));
        assert!(matches!(
            fs.rmdir(Path::new("d")).await,
            Err(VfsError::ReadOnly)
        ));
        assert!(fs.read_only());
    }

    #[tokio::test]
    async fn test_rmdir_removes_empty_directory() {
        let dir = tempdir().unwrap();
        let fs = LocalBackend::new(dir.path());

        fs.mkdir(Path::new("states"), 0o755).await.unwrap();
        fs.write_all(Path::new("states/a"), b"1").await.unwrap();
        assert!(fs.rmdir(Path::new("states")).await.is_err());

        fs.unlink(Path::new("states/a")).await.unwrap();
        fs.rmdir(Path::new("states")).await.unwrap();
        assert!(!dir.path().join("states").exists());
        assert!(fs.rmdir(Path::new("")).await.is_err());
    }

    #[tokio::test]
    async fn test_parent_dir_cannot_escape() {
        let dir = tempdir().unwrap();
        let fs = LocalBackend::new(dir.path().join("root"));
        assert!(matches!(
            fs.getattr(Path::new("../outside")).await,
            Err(VfsError::PathEscapesRoot(_))
        ));
    }

    #[tokio::test]
    async fn test_symlink_cannot_escape() {
        let outside = tempdir().unwrap();
        std::fs::write(outside.path().join("secret"), b"nope").unwrap();

        let dir = tempdir().unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("link")).unwrap();

        let fs = LocalBackend::new(dir.path());
        assert!(matches!(
            fs.read_all(Path::new("link/secret")).await,
            Err(VfsError::PathEscapesRoot(_))
        ));
    }

    #[tokio::test]
    async fn test_readdir_and_real_path() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("content")).unwrap();
        std::fs::write(dir.path().join("retroarch.cfg"), b"").unwrap();
        let fs = LocalBackend::new(dir.path());

        let entries = fs.readdir(Path::new("")).await.unwrap();
        assert_eq!(
            entries,
            vec![
                DirEntry::directory("content"),
                DirEntry::file("retroarch.cfg")
            ]
        );

        assert_eq!(
            fs.real_path(Path::new("/content/foo.nes")),
            Some(fs.root().join("content/foo.nes"))
        );
    }
}
