//! Namespace composition, staging and upload.
//!
//! A [`Composer`] turns an ordered list of mounts into a [`Namespace`],
//! copies the files the runtime needs into place ([`Composer::stage`]),
//! and accepts user files into the upload directory afterwards
//! ([`Composer::upload`], [`Composer::upload_batch`]).

mod error;
mod manifest;
mod namespace;
mod upload;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::constants::DIR_MODE;
use crate::vfs::{FileType, MountEntry, MountTable, OverlapPolicy, VfsError, VfsOps, VfsResult};

pub use error::{ComposeError, ComposeResult};
pub use manifest::{Manifest, StageReport, StagedFile};
pub use namespace::Namespace;
pub use upload::{UploadBatch, UploadOutcome};

use upload::validate_file_name;

/// A file collected by [`Composer::export`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedFile {
    /// Path relative to the export root.
    pub path: PathBuf,
    pub contents: Vec<u8>,
}

/// What one staging run created, in creation order.
#[derive(Debug, Default)]
struct Created {
    files: Vec<PathBuf>,
    dirs: Vec<PathBuf>,
}

/// Builds namespaces and moves files into them.
#[derive(Debug, Clone)]
pub struct Composer {
    upload_dir: PathBuf,
    overlap_policy: OverlapPolicy,
    staging_timeout: Option<Duration>,
}

impl Composer {
    /// Composer that uploads into `upload_dir`, rejects nested mounts and
    /// waits on staging indefinitely.
    pub fn new(upload_dir: impl Into<PathBuf>) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            overlap_policy: OverlapPolicy::default(),
            staging_timeout: None,
        }
    }

    pub fn with_overlap_policy(mut self, policy: OverlapPolicy) -> Self {
        self.overlap_policy = policy;
        self
    }

    pub fn with_staging_timeout(mut self, timeout: Duration) -> Self {
        self.staging_timeout = Some(timeout);
        self
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    /// Build a namespace from `mounts`.
    pub fn compose(
        &self,
        mounts: impl IntoIterator<Item = MountEntry>,
    ) -> ComposeResult<Namespace> {
        let _span = info_span!("compose", policy = ?self.overlap_policy).entered();

        let table =
            MountTable::build(mounts, self.overlap_policy).map_err(ComposeError::Configuration)?;
        let mounts = table.list_mounts();
        for mount in &mounts {
            debug!(path = %mount.path.display(), read_only = mount.read_only, "mounted");
        }
        info!(mounts = mounts.len(), "namespace composed");

        Ok(Namespace::new(table))
    }

    /// Copy every manifest source to its destination, in order.
    ///
    /// Nothing is written unless every source resolves up front. If a
    /// write fails partway or the staging timeout expires, the files and
    /// directories created by this run are removed again.
    pub async fn stage(&self, ns: &Namespace, manifest: &Manifest) -> ComposeResult<StageReport> {
        let span = info_span!("stage", entries = manifest.len());
        async {
            let mut created = Created::default();
            let work = self.stage_entries(ns, manifest, &mut created);

            let result = match self.staging_timeout {
                Some(limit) => tokio::time::timeout(limit, work)
                    .await
                    .unwrap_or_else(|_| Err(ComposeError::StagingTimeout(limit))),
                None => work.await,
            };

            if result.is_err() {
                Self::roll_back(ns, &created).await;
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn stage_entries(
        &self,
        ns: &Namespace,
        manifest: &Manifest,
        created: &mut Created,
    ) -> ComposeResult<StageReport> {
        Self::preflight(ns, manifest).await?;

        let mut report = StageReport::default();
        for entry in manifest {
            let bytes = Self::stage_one(ns, entry, created).await?;
            debug!(
                source = %entry.source.display(),
                destination = %entry.destination.display(),
                bytes,
                "staged"
            );
            report.files.push(entry.destination.clone());
            report.bytes += bytes;
        }

        info!(files = report.files.len(), bytes = report.bytes, "staging complete");
        Ok(report)
    }

    /// Every source must exist in the namespace or be written by an
    /// earlier entry.
    async fn preflight(ns: &Namespace, manifest: &Manifest) -> ComposeResult<()> {
        let mut produced: HashSet<&Path> = HashSet::new();
        for entry in manifest {
            if !produced.contains(entry.source.as_path()) {
                match ns.vfs().getattr(&entry.source).await {
                    Ok(attr) if attr.is_file() => {}
                    Ok(_) => {
                        return Err(ComposeError::source_not_found(
                            &entry.source,
                            VfsError::is_a_directory(entry.source.display().to_string()),
                        ));
                    }
                    Err(e) => return Err(ComposeError::source_not_found(&entry.source, e)),
                }
            }
            produced.insert(entry.destination.as_path());
        }
        Ok(())
    }

    async fn stage_one(
        ns: &Namespace,
        entry: &StagedFile,
        created: &mut Created,
    ) -> ComposeResult<u64> {
        let vfs = ns.vfs();
        let data = vfs
            .read_all(&entry.source)
            .await
            .map_err(|e| ComposeError::read(&entry.source, e))?;

        if let Some(parent) = entry.destination.parent() {
            // Missing ancestors, outermost first.
            let mut missing = Vec::new();
            for dir in parent.ancestors() {
                if vfs.exists(dir).await {
                    break;
                }
                missing.push(dir.to_path_buf());
            }
            created.dirs.extend(missing.into_iter().rev());

            vfs.mkdir(parent, DIR_MODE)
                .await
                .map_err(|e| ComposeError::write(parent, e))?;
        }

        if !vfs.exists(&entry.destination).await {
            created.files.push(entry.destination.clone());
        }
        vfs.write_all(&entry.destination, &data)
            .await
            .map_err(|e| ComposeError::write(&entry.destination, e))?;

        Ok(data.len() as u64)
    }

    /// Remove created files, then created directories, newest first.
    async fn roll_back(ns: &Namespace, created: &Created) {
        let vfs = ns.vfs();
        for path in created.files.iter().rev() {
            match vfs.unlink(path).await {
                Ok(()) => debug!(path = %path.display(), "rolled back"),
                Err(e) if e.is_not_found() => {}
                Err(e) => warn!(path = %path.display(), error = %e, "failed to roll back staged file"),
            }
        }
        for path in created.dirs.iter().rev() {
            match vfs.rmdir(path).await {
                Ok(()) => debug!(path = %path.display(), "rolled back directory"),
                Err(e) if e.is_not_found() => {}
                Err(e) => warn!(path = %path.display(), error = %e, "failed to roll back staged directory"),
            }
        }
    }

    /// Write `content` to `<upload_dir>/<file_name>`, replacing any
    /// existing file.
    pub async fn upload(
        &self,
        ns: &Namespace,
        file_name: &str,
        content: &[u8],
    ) -> ComposeResult<PathBuf> {
        validate_file_name(file_name)?;
        let destination = self.upload_dir.join(file_name);

        async {
            let vfs = ns.vfs();
            vfs.mkdir(&self.upload_dir, DIR_MODE)
                .await
                .map_err(|e| ComposeError::write(&self.upload_dir, e))?;
            vfs.write_all(&destination, content)
                .await
                .map_err(|e| ComposeError::write(&destination, e))?;

            info!(path = %destination.display(), bytes = content.len(), "uploaded");
            Ok::<_, ComposeError>(destination)
        }
        .instrument(info_span!("upload", file = file_name))
        .await
    }

    /// Upload each file in its own task.
    pub fn upload_batch(
        &self,
        ns: &Namespace,
        files: impl IntoIterator<Item = (String, Vec<u8>)>,
    ) -> UploadBatch {
        let mut tasks = JoinSet::new();
        for (file_name, content) in files {
            let composer = self.clone();
            let ns = ns.clone();
            tasks.spawn(async move {
                let result = composer.upload(&ns, &file_name, &content).await;
                if let Err(e) = &result {
                    warn!(file = %file_name, error = %e, "upload failed");
                }
                UploadOutcome { file_name, result }
            });
        }
        UploadBatch::new(tasks)
    }

    /// Collect every file below `root`, sorted by path.
    pub async fn export(
        &self,
        ns: &Namespace,
        root: impl AsRef<Path>,
    ) -> VfsResult<Vec<ExportedFile>> {
        let root = root.as_ref();
        let vfs = ns.vfs();
        let mut files = Vec::new();
        let mut pending = vec![root.to_path_buf()];

        while let Some(dir) = pending.pop() {
            for entry in vfs.readdir(&dir).await? {
                let path = dir.join(&entry.name);
                match entry.kind {
                    FileType::Directory => pending.push(path),
                    FileType::File => {
                        let contents = vfs.read_all(&path).await?;
                        let relative = path.strip_prefix(root).unwrap_or(&path).to_path_buf();
                        files.push(ExportedFile {
                            path: relative,
                            contents,
                        });
                    }
                }
            }
        }

        files.sort_by(|a, b| a.path.cmp(&b.path));
        info!(root = %root.display(), files = files.len(), "exported");
        Ok(files)
    }
}
