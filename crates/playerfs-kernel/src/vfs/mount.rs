//! Write-once mount table with longest-prefix routing.
//!
//! The table is assembled once from an ordered list of [`MountEntry`]
//! values and never changes afterwards. Routing picks the most specific
//! mount point covering a path; ancestors of mount points that no backend
//! covers are presented as synthetic read-only directories.

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use super::error::{VfsError, VfsResult};
use super::ops::VfsOps;
use super::types::{DirEntry, FileAttr};

/// A backend and the namespace path it is mounted at.
#[derive(Clone)]
pub struct MountEntry {
    pub mount_point: PathBuf,
    pub backend: Arc<dyn VfsOps>,
}

impl std::fmt::Debug for MountEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MountEntry")
            .field("mount_point", &self.mount_point)
            .field("read_only", &self.backend.read_only())
            .finish()
    }
}

impl MountEntry {
    pub fn new(mount_point: impl Into<PathBuf>, backend: impl VfsOps + 'static) -> Self {
        Self::from_arc(mount_point, Arc::new(backend))
    }

    pub fn from_arc(mount_point: impl Into<PathBuf>, backend: Arc<dyn VfsOps>) -> Self {
        Self {
            mount_point: mount_point.into(),
            backend,
        }
    }
}

/// Information about a mount point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountInfo {
    /// The mount path (e.g., "/home/web_user/content").
    pub path: PathBuf,
    /// Whether this mount is read-only.
    pub read_only: bool,
}

/// What to do when one mount point lies inside another.
///
/// Two entries claiming the same mount point are rejected under every
/// policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OverlapPolicy {
    /// Nested mount points are a configuration error.
    #[default]
    Reject,
    /// Nested mount points are allowed; the deeper mount shadows the
    /// outer one below its mount point.
    Shadow,
}

/// Routes filesystem operations to mounted backends.
///
/// Mount points are matched by longest prefix, component-wise: with
/// `/mnt` and `/mnt/project` mounted (under [`OverlapPolicy::Shadow`]),
/// `/mnt/project/src/main.rs` routes to `/mnt/project`, while
/// `/mnt/projects` routes to `/mnt`.
pub struct MountTable {
    mounts: BTreeMap<PathBuf, Arc<dyn VfsOps>>,
}

impl std::fmt::Debug for MountTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MountTable")
            .field("mounts", &self.mounts.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl MountTable {
    /// Assemble a table from `entries`, in order.
    ///
    /// Each mount point is normalized to absolute form first. The result
    /// does not depend on entry order when the build succeeds.
    pub fn build(
        entries: impl IntoIterator<Item = MountEntry>,
        policy: OverlapPolicy,
    ) -> VfsResult<Self> {
        let mut mounts: BTreeMap<PathBuf, Arc<dyn VfsOps>> = BTreeMap::new();

        for entry in entries {
            let point = normalize_absolute(&entry.mount_point)?;

            for existing in mounts.keys() {
                let overlaps = match policy {
                    OverlapPolicy::Reject => {
                        existing.starts_with(&point) || point.starts_with(existing)
                    }
                    OverlapPolicy::Shadow => *existing == point,
                };
                if overlaps {
                    return Err(VfsError::MountOverlap {
                        existing: existing.clone(),
                        requested: point,
                    });
                }
            }

            mounts.insert(point, entry.backend);
        }

        Ok(Self { mounts })
    }

    /// List all mounts, sorted by path.
    pub fn list_mounts(&self) -> Vec<MountInfo> {
        self.mounts
            .iter()
            .map(|(path, fs)| MountInfo {
                path: path.clone(),
                read_only: fs.read_only(),
            })
            .collect()
    }

    /// Find the backend for `path` and the path relative to its mount.
    fn find_mount(&self, path: &Path) -> VfsResult<(&Arc<dyn VfsOps>, PathBuf)> {
        let normalized = normalize_absolute(path)?;

        self.mounts
            .iter()
            .filter(|(mount_path, _)| normalized.starts_with(mount_path))
            .max_by_key(|(mount_path, _)| mount_path.components().count())
            .map(|(mount_path, fs)| {
                let relative = normalized
                    .strip_prefix(mount_path)
                    .map(Path::to_path_buf)
                    .unwrap_or_default();
                (fs, relative)
            })
            .ok_or_else(|| VfsError::no_mount_point(normalized.display().to_string()))
    }

    /// Names of the next path component of every mount point strictly
    /// below `dir`.
    ///
    /// Empty when `dir` has no mounts beneath it.
    fn mount_children(&self, dir: &Path) -> BTreeSet<String> {
        self.mounts
            .keys()
            .filter_map(|mount_path| mount_path.strip_prefix(dir).ok())
            .filter_map(|rest| rest.components().next())
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect()
    }

    /// True if `path` is a directory only because mounts live below it.
    fn is_synthetic(&self, path: &Path) -> bool {
        !self.mount_children(path).is_empty() && self.find_mount(path).is_err()
    }
}

/// Normalize a namespace path to absolute form, resolving `.` and `..`.
///
/// `..` above `/` is rejected.
pub(crate) fn normalize_absolute(path: &Path) -> VfsResult<PathBuf> {
    let mut result = PathBuf::from("/");
    for component in path.components() {
        match component {
            Component::Normal(s) => result.push(s),
            Component::ParentDir => {
                if !result.pop() {
                    return Err(VfsError::invalid_path(path.display().to_string()));
                }
            }
            Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
        }
    }
    Ok(result)
}

#[async_trait]
impl VfsOps for MountTable {
    async fn getattr(&self, path: &Path) -> VfsResult<FileAttr> {
        let normalized = normalize_absolute(path)?;
        if self.is_synthetic(&normalized) {
            return Ok(FileAttr::directory(0o555));
        }
        let (fs, relative) = self.find_mount(&normalized)?;
        fs.getattr(&relative).await
    }

    async fn readdir(&self, path: &Path) -> VfsResult<Vec<DirEntry>> {
        let normalized = normalize_absolute(path)?;
        let shadowing = self.mount_children(&normalized);

        let mut entries = match self.find_mount(&normalized) {
            Ok((fs, relative)) => fs.readdir(&relative).await?,
            Err(e) if shadowing.is_empty() => return Err(e),
            Err(_) => Vec::new(),
        };

        // Mount points below this directory hide same-named backend entries.
        entries.retain(|e| !shadowing.contains(&e.name));
        entries.extend(shadowing.into_iter().map(DirEntry::directory));
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn read(&self, path: &Path, offset: u64, size: u32) -> VfsResult<Vec<u8>> {
        let (fs, relative) = self.find_mount(path)?;
        fs.read(&relative, offset, size).await
    }

    async fn write(&self, path: &Path, offset: u64, data: &[u8]) -> VfsResult<u32> {
        let (fs, relative) = self.find_mount(path)?;
        fs.write(&relative, offset, data).await
    }

    async fn create(&self, path: &Path, mode: u32) -> VfsResult<FileAttr> {
        let (fs, relative) = self.find_mount(path)?;
        fs.create(&relative, mode).await
    }

    async fn mkdir(&self, path: &Path, mode: u32) -> VfsResult<FileAttr> {
        let normalized = normalize_absolute(path)?;
        if self.is_synthetic(&normalized) {
            return Ok(FileAttr::directory(0o555));
        }
        let (fs, relative) = self.find_mount(&normalized)?;
        fs.mkdir(&relative, mode).await
    }

    async fn unlink(&self, path: &Path) -> VfsResult<()> {
        let (fs, relative) = self.find_mount(path)?;
        fs.unlink(&relative).await
    }

    async fn rmdir(&self, path: &Path) -> VfsResult<()> {
        let (fs, relative) = self.find_mount(path)?;
        fs.rmdir(&relative).await
    }

    async fn truncate(&self, path: &Path, size: u64) -> VfsResult<()> {
        let (fs, relative) = self.find_mount(path)?;
        fs.truncate(&relative, size).await
    }

    fn read_only(&self) -> bool {
        // Individual mounts may be read-only; the table itself is not.
        false
    }

    fn real_path(&self, path: &Path) -> Option<PathBuf> {
        let (fs, relative) = self.find_mount(path).ok()?;
        fs.real_path(&relative)
    }

    async fn read_all(&self, path: &Path) -> VfsResult<Vec<u8>> {
        let (fs, relative) = self.find_mount(path)?;
        fs.read_all(&relative).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::backends::MemoryBackend;

    fn memory_with(files: &[(&str, &str)]) -> MemoryBackend {
        MemoryBackend::with_files(files.iter().map(|(p, d)| (*p, *d))).unwrap()
    }

    #[tokio::test]
    async fn test_basic_mount() {
        let table = MountTable::build(
            [MountEntry::new("/scratch", memory_with(&[("test.txt", "hello")]))],
            OverlapPolicy::Reject,
        )
        .unwrap();

        let data = table.read_all(Path::new("/scratch/test.txt")).await.unwrap();
        assert_eq!(data, b"hello");
    }

    #[tokio::test]
    async fn test_disjoint_siblings() {
        let table = MountTable::build(
            [
                MountEntry::new("/home/web_user/retroarch/userdata", MemoryBackend::new()),
                MountEntry::new(
                    "/home/web_user/retroarch/bundle",
                    memory_with(&[("a.txt", "bundle")]),
                ),
                MountEntry::new("/home/web_user/content", memory_with(&[("b.txt", "content")])),
            ],
            OverlapPolicy::Reject,
        )
        .unwrap();

        assert_eq!(
            table
                .read_all(Path::new("/home/web_user/retroarch/bundle/a.txt"))
                .await
                .unwrap(),
            b"bundle"
        );
        assert_eq!(
            table
                .read_all(Path::new("/home/web_user/content/b.txt"))
                .await
                .unwrap(),
            b"content"
        );
    }

    #[test]
    fn test_duplicate_mount_point_rejected() {
        for policy in [OverlapPolicy::Reject, OverlapPolicy::Shadow] {
            let result = MountTable::build(
                [
                    MountEntry::new("/home/data", MemoryBackend::new()),
                    MountEntry::new("/home/data/", MemoryBackend::new()),
                ],
                policy,
            );
            assert!(matches!(result, Err(VfsError::MountOverlap { .. })));
        }
    }

    #[test]
    fn test_nested_mount_rejected_by_default() {
        let result = MountTable::build(
            [
                MountEntry::new("/mnt/project", MemoryBackend::new()),
                MountEntry::new("/mnt", MemoryBackend::new()),
            ],
            OverlapPolicy::Reject,
        );
        match result {
            Err(VfsError::MountOverlap { existing, requested }) => {
                assert_eq!(existing, PathBuf::from("/mnt/project"));
                assert_eq!(requested, PathBuf::from("/mnt"));
            }
            other => panic!("expected overlap, got {other:?}"),
        }
    }

    #[test]
    fn test_shared_name_prefix_is_not_overlap() {
        // `/mnt/a` and `/mnt/ab` share characters but not a component.
        assert!(MountTable::build(
            [
                MountEntry::new("/mnt/a", MemoryBackend::new()),
                MountEntry::new("/mnt/ab", MemoryBackend::new()),
            ],
            OverlapPolicy::Reject,
        )
        .is_ok());
    }

    #[tokio::test]
    async fn test_shadow_policy_routes_longest_prefix() {
        let table = MountTable::build(
            [
                MountEntry::new("/mnt", memory_with(&[("outer.txt", "outer")])),
                MountEntry::new("/mnt/project", memory_with(&[("inner.txt", "inner")])),
            ],
            OverlapPolicy::Shadow,
        )
        .unwrap();

        assert_eq!(
            table.read_all(Path::new("/mnt/outer.txt")).await.unwrap(),
            b"outer"
        );
        assert_eq!(
            table
                .read_all(Path::new("/mnt/project/inner.txt"))
                .await
                .unwrap(),
            b"inner"
        );

        let names: Vec<_> = table
            .readdir(Path::new("/mnt"))
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["outer.txt", "project"]);
    }

    #[tokio::test]
    async fn test_synthetic_ancestors() {
        let table = MountTable::build(
            [
                MountEntry::new("/home/web_user/retroarch/userdata", MemoryBackend::new()),
                MountEntry::new("/home/web_user/content", MemoryBackend::new()),
            ],
            OverlapPolicy::Reject,
        )
        .unwrap();

        assert!(table.getattr(Path::new("/")).await.unwrap().is_dir());
        assert!(table.getattr(Path::new("/home/web_user")).await.unwrap().is_dir());

        let entries = table.readdir(Path::new("/home/web_user")).await.unwrap();
        assert_eq!(
            entries,
            vec![DirEntry::directory("content"), DirEntry::directory("retroarch")]
        );

        // Nothing is mounted there, so nothing can be written.
        assert!(table
            .write_all(Path::new("/home/web_user/stray.txt"), b"x")
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_stat_mount_point() {
        let table = MountTable::build(
            [MountEntry::new("/scratch", MemoryBackend::new())],
            OverlapPolicy::Reject,
        )
        .unwrap();
        assert!(table.getattr(Path::new("/scratch")).await.unwrap().is_dir());
        assert!(table.mkdir(Path::new("/scratch"), 0o755).await.is_ok());
    }

    #[tokio::test]
    async fn test_no_mount_error() {
        let table = MountTable::build(Vec::new(), OverlapPolicy::Reject).unwrap();
        let result = table.read(Path::new("/nothing/here.txt"), 0, 100).await;
        assert!(matches!(result, Err(VfsError::NoMountPoint(_))));
    }

    #[tokio::test]
    async fn test_write_through_table() {
        let table = MountTable::build(
            [MountEntry::new("/scratch", MemoryBackend::new())],
            OverlapPolicy::Reject,
        )
        .unwrap();

        table
            .write_all(Path::new("/scratch/dir/new.txt"), b"created")
            .await
            .unwrap();
        assert_eq!(
            table.read_all(Path::new("/scratch/dir/new.txt")).await.unwrap(),
            b"created"
        );
    }

    #[test]
    fn test_list_mounts_is_order_independent() {
        let build = |first: &str, second: &str| {
            MountTable::build(
                [
                    MountEntry::new(first, MemoryBackend::new()),
                    MountEntry::new(second, MemoryBackend::new()),
                ],
                OverlapPolicy::Reject,
            )
            .unwrap()
            .list_mounts()
        };
        assert_eq!(build("/a", "/b"), build("/b", "/a"));
    }

    #[test]
    fn test_normalize_absolute() {
        assert_eq!(
            normalize_absolute(Path::new("home/./data/")).unwrap(),
            PathBuf::from("/home/data")
        );
        assert_eq!(
            normalize_absolute(Path::new("/home/x/../data")).unwrap(),
            PathBuf::from("/home/data")
        );
        assert!(normalize_absolute(Path::new("/..")).is_err());
    }
}
