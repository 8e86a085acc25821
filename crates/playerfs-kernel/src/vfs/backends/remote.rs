//! Read-only backend over a remote fetch transport.
//!
//! Serves bundled assets and initial content. The set of files is known
//! up front from a [`RemoteIndex`]; bytes are fetched lazily on first
//! access and cached for the lifetime of the backend.

use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::StatusCode;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::Instrument;
use url::Url;

use crate::vfs::error::{VfsError, VfsResult};
use crate::vfs::ops::VfsOps;
use crate::vfs::relative_path;
use crate::vfs::types::{DirEntry, FileAttr, FileType};

/// Transport that retrieves a whole file by its backend-relative path.
///
/// Paths are `/`-separated and carry no leading slash.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, path: &str) -> VfsResult<Vec<u8>>;
}

/// HTTP transport: `GET <base_url>/<path>`.
#[derive(Debug, Clone)]
pub struct HttpFetch {
    client: reqwest::Client,
    base: Url,
}

impl HttpFetch {
    /// Create a transport rooted at `base_url`.
    ///
    /// A missing trailing slash is added so that relative joins stay
    /// inside the base directory.
    pub fn new(base_url: &str) -> VfsResult<Self> {
        let mut base = Url::parse(base_url)
            .map_err(|e| VfsError::invalid_path(format!("{base_url}: {e}")))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self {
            client: reqwest::Client::new(),
            base,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }
}

#[async_trait]
impl Fetch for HttpFetch {
    async fn fetch(&self, path: &str) -> VfsResult<Vec<u8>> {
        let url = self
            .base
            .join(path)
            .map_err(|e| VfsError::invalid_path(format!("{path}: {e}")))?;
        let span = tracing::debug_span!("vfs.fetch", url = %url);

        async {
            let resp = self
                .client
                .get(url.clone())
                .send()
                .await
                .map_err(|e| VfsError::remote(e.to_string()))?;

            let status = resp.status();
            if status == StatusCode::NOT_FOUND {
                return Err(VfsError::not_found(url.to_string()));
            }
            if !status.is_success() {
                return Err(VfsError::remote(format!("{url} returned HTTP {status}")));
            }

            let body = resp
                .bytes()
                .await
                .map_err(|e| VfsError::remote(e.to_string()))?;
            tracing::debug!(bytes = body.len(), "fetched");
            Ok(body.to_vec())
        }
        .instrument(span)
        .await
    }
}

/// The file tree a remote backend serves.
///
/// Directories are implied by file paths. The root directory always
/// exists.
#[derive(Debug, Clone)]
pub struct RemoteIndex {
    entries: BTreeMap<PathBuf, FileType>,
}

impl Default for RemoteIndex {
    fn default() -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(PathBuf::new(), FileType::Directory);
        Self { entries }
    }
}

impl RemoteIndex {
    /// Build an index from a flat list of file paths.
    pub fn from_files<I, S>(files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut index = Self::default();
        for file in files {
            index.insert_file(Path::new(file.as_ref()));
        }
        index
    }

    /// Parse a JSON index document.
    ///
    /// Objects are directories and `null` values are files:
    ///
    /// ```json
    /// { "config": { "retroarch.cfg": null }, "readme.txt": null }
    /// ```
    pub fn from_json(data: &[u8]) -> VfsResult<Self> {
        let value: serde_json::Value = serde_json::from_slice(data)
            .map_err(|e| VfsError::other(format!("invalid index document: {e}")))?;
        let mut index = Self::default();
        index.insert_json(PathBuf::new(), &value)?;
        Ok(index)
    }

    fn insert_json(&mut self, at: PathBuf, value: &serde_json::Value) -> VfsResult<()> {
        match value {
            serde_json::Value::Object(map) => {
                self.entries.insert(at.clone(), FileType::Directory);
                for (name, child) in map {
                    self.insert_json(at.join(name), child)?;
                }
                Ok(())
            }
            serde_json::Value::Null => {
                self.insert_file(&at);
                Ok(())
            }
            other => Err(VfsError::other(format!(
                "invalid index entry at {}: {other}",
                at.display()
            ))),
        }
    }

    fn insert_file(&mut self, path: &Path) {
        let path = relative_path(path);
        if path.as_os_str().is_empty() {
            return;
        }
        for ancestor in path.ancestors().skip(1) {
            self.entries
                .entry(ancestor.to_path_buf())
                .or_insert(FileType::Directory);
        }
        self.entries.insert(path, FileType::File);
    }

    /// Kind of the entry at `path`, if indexed.
    pub fn kind(&self, path: &Path) -> Option<FileType> {
        self.entries.get(&relative_path(path)).copied()
    }

    /// Direct children of the directory at `path`, sorted by name.
    pub fn children(&self, path: &Path) -> Vec<DirEntry> {
        let dir = relative_path(path);
        self.entries
            .iter()
            .filter(|(p, _)| p.parent() == Some(dir.as_path()))
            .filter_map(|(p, kind)| {
                p.file_name()
                    .map(|name| DirEntry::new(name.to_string_lossy(), *kind))
            })
            .collect()
    }

    /// Indexed file paths (directories excluded), in sorted order.
    pub fn files(&self) -> impl Iterator<Item = &Path> {
        self.entries
            .iter()
            .filter(|(_, kind)| kind.is_file())
            .map(|(p, _)| p.as_path())
    }
}

/// Read-only, lazily fetching backend.
pub struct RemoteBackend {
    fetch: Arc<dyn Fetch>,
    index: RemoteIndex,
    cache: DashMap<PathBuf, Arc<[u8]>>,
}

impl std::fmt::Debug for RemoteBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteBackend")
            .field("index", &self.index)
            .field("cached", &self.cache.len())
            .finish()
    }
}

impl RemoteBackend {
    /// Create a backend serving the files named by `index`.
    pub fn new(fetch: impl Fetch + 'static, index: RemoteIndex) -> Self {
        Self::from_arc(Arc::new(fetch), index)
    }

    pub fn from_arc(fetch: Arc<dyn Fetch>, index: RemoteIndex) -> Self {
        Self {
            fetch,
            index,
            cache: DashMap::new(),
        }
    }

    /// Fetch `index_file` through the transport and serve what it lists.
    pub async fn with_index_file(fetch: impl Fetch + 'static, index_file: &str) -> VfsResult<Self> {
        let fetch: Arc<dyn Fetch> = Arc::new(fetch);
        let raw = fetch.fetch(index_file).await?;
        let index = RemoteIndex::from_json(&raw)?;
        Ok(Self::from_arc(fetch, index))
    }

    pub fn index(&self) -> &RemoteIndex {
        &self.index
    }

    /// Whole contents of an indexed file, fetched on first use.
    async fn contents(&self, path: &Path) -> VfsResult<Arc<[u8]>> {
        let normalized = relative_path(path);
        match self.index.kind(&normalized) {
            Some(FileType::File) => {}
            Some(FileType::Directory) => {
                return Err(VfsError::is_a_directory(normalized.display().to_string()));
            }
            None => return Err(VfsError::not_found(normalized.display().to_string())),
        }

        if let Some(hit) = self.cache.get(&normalized).map(|r| Arc::clone(r.value())) {
            return Ok(hit);
        }

        let key = normalized
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let data: Arc<[u8]> = self.fetch.fetch(&key).await?.into();
        self.cache.insert(normalized, Arc::clone(&data));
        Ok(data)
    }
}

#[async_trait]
impl VfsOps for RemoteBackend {
    async fn getattr(&self, path: &Path) -> VfsResult<FileAttr> {
        match self.index.kind(path) {
            Some(FileType::Directory) => Ok(FileAttr::directory(0o555)),
            Some(FileType::File) => {
                let data = self.contents(path).await?;
                Ok(FileAttr::file(data.len() as u64, 0o444))
            }
            None => Err(VfsError::not_found(path.display().to_string())),
        }
    }

    async fn readdir(&self, path: &Path) -> VfsResult<Vec<DirEntry>> {
        match self.index.kind(path) {
            Some(FileType::Directory) => Ok(self.index.children(path)),
            Some(FileType::File) => Err(VfsError::not_a_directory(path.display().to_string())),
            None => Err(VfsError::not_found(path.display().to_string())),
        }
    }

    async fn read(&self, path: &Path, offset: u64, size: u32) -> VfsResult<Vec<u8>> {
        let data = self.contents(path).await?;
        let start = (offset as usize).min(data.len());
        let end = start.saturating_add(size as usize).min(data.len());
        Ok(data[start..end].to_vec())
    }

    async fn write(&self, _path: &Path, _offset: u64, _data: &[u8]) -> VfsResult<u32> {
        Err(VfsError::ReadOnly)
    }

    async fn create(&self, _path: &Path, _mode: u32) -> VfsResult<FileAttr> {
        Err(VfsError::ReadOnly)
    }

    async fn mkdir(&self, _path: &Path, _mode: u32) -> VfsResult<FileAttr> {
        Err(VfsError::ReadOnly)
    }

    async fn unlink(&self, _path: &Path) -> VfsResult<()> {
        Err(VfsError::ReadOnly)
    }

    async fn rmdir(&self, _path: &Path) -> VfsResult<()> {
        Err(VfsError::ReadOnly)
    }

    async fn truncate(&self, _path: &Path, _size: u64) -> VfsResult<()> {
        Err(VfsError::ReadOnly)
    }

    fn read_only(&self) -> bool {
        true
    }

    async fn read_all(&self, path: &Path) -> VfsResult<Vec<u8>> {
        Ok(self.contents(path).await?.to_vec())
    }
}
