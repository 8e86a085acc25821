//! Player configuration.
//!
//! One TOML file describes a player instance: which content to run, where
//! each root comes from, and how the runtime is invoked.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::composer::Composer;
use crate::constants::{
    BUNDLE_INDEX_FILE, DEFAULT_BUNDLE_ROOT, DEFAULT_CONTENT_ROOT, DEFAULT_RUNTIME_PROGRAM,
    DEFAULT_USERDATA_ROOT,
};
use crate::layout::PlayerLayout;
use crate::vfs::{
    HttpFetch, LocalBackend, MemoryBackend, MountEntry, OverlapPolicy, RemoteBackend,
    RemoteIndex, VfsError,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("backend setup failed: {0}")]
    Backend(#[from] VfsError),
}

/// Where a root's files come from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BackendConfig {
    /// Empty in-memory tree.
    #[default]
    Memory,
    /// A real directory. `~` is expanded.
    Local {
        root: String,
        #[serde(default)]
        read_only: bool,
    },
    /// Read-only files fetched over HTTP.
    ///
    /// With `index`, the file list is read from that document under
    /// `base_url`; without it, the file list is derived from the layout.
    Remote {
        base_url: String,
        #[serde(default)]
        index: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub userdata: PathBuf,
    pub bundle: PathBuf,
    pub content: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            userdata: PathBuf::from(DEFAULT_USERDATA_ROOT),
            bundle: PathBuf::from(DEFAULT_BUNDLE_ROOT),
            content: PathBuf::from(DEFAULT_CONTENT_ROOT),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub program: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            program: DEFAULT_RUNTIME_PROGRAM.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PlayerConfig {
    /// Primary content file name.
    pub content: String,
    #[serde(default)]
    pub entry_slot: u32,
    /// Emulator core; informational.
    #[serde(default)]
    pub core: Option<String>,
    #[serde(default)]
    pub staging_timeout_secs: Option<u64>,
    #[serde(default)]
    pub allow_nested_mounts: bool,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub userdata: BackendConfig,
    #[serde(default)]
    pub bundle: Option<BackendConfig>,
    pub content_source: BackendConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

impl PlayerConfig {
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_toml(&text)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.content.is_empty() || self.content.contains('/') {
            return Err(ConfigError::Invalid(format!(
                "content must be a file name, got {:?}",
                self.content
            )));
        }
        if matches!(self.userdata, BackendConfig::Remote { .. }) {
            return Err(ConfigError::Invalid(
                "userdata must be writable (memory or local)".into(),
            ));
        }
        Ok(())
    }

    pub fn layout(&self) -> PlayerLayout {
        PlayerLayout::new(&self.content, self.entry_slot)
            .with_userdata_root(&self.paths.userdata)
            .with_bundle_root(&self.paths.bundle)
            .with_content_root(&self.paths.content)
    }

    pub fn composer(&self) -> Composer {
        let policy = if self.allow_nested_mounts {
            OverlapPolicy::Shadow
        } else {
            OverlapPolicy::Reject
        };
        let composer = Composer::new(self.layout().upload_dir()).with_overlap_policy(policy);
        match self.staging_timeout_secs {
            Some(secs) => composer.with_staging_timeout(Duration::from_secs(secs)),
            None => composer,
        }
    }

    /// A child-process runtime opens staged files by real path, so
    /// userdata and content must both be local directories.
    pub fn require_local_roots(&self) -> Result<(), ConfigError> {
        for (name, backend) in [("userdata", &self.userdata), ("content_source", &self.content_source)] {
            if !matches!(backend, BackendConfig::Local { .. }) {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be a local directory for the runtime to see staged files"
                )));
            }
        }
        Ok(())
    }

    /// Mount entries for userdata, bundle (if configured) and content.
    ///
    /// Remote backends with an index fetch it here.
    pub async fn build_mounts(&self) -> Result<Vec<MountEntry>, ConfigError> {
        let layout = self.layout();
        let mut mounts = vec![
            build_backend(&self.userdata, &layout.userdata_root, None).await?,
        ];
        if let Some(bundle) = &self.bundle {
            mounts.push(build_backend(bundle, &layout.bundle_root, None).await?);
        }
        mounts.push(
            build_backend(
                &self.content_source,
                &layout.content_root,
                Some(layout.content_files()),
            )
            .await?,
        );
        Ok(mounts)
    }
}

async fn build_backend(
    config: &BackendConfig,
    mount_point: &Path,
    files: Option<Vec<String>>,
) -> Result<MountEntry, ConfigError> {
    let entry = match config {
        BackendConfig::Memory => MountEntry::new(mount_point, MemoryBackend::new()),
        BackendConfig::Local { root, read_only } => {
            let root: PathBuf = shellexpand::tilde(root).as_ref().into();
            let backend = if *read_only {
                LocalBackend::read_only(root)
            } else {
                LocalBackend::new(root)
            };
            MountEntry::new(mount_point, backend)
        }
        BackendConfig::Remote { base_url, index } => {
            let fetch = HttpFetch::new(base_url)?;
            let backend = match (index, files) {
                (Some(index_file), _) => RemoteBackend::with_index_file(fetch, index_file).await?,
                (None, Some(files)) => RemoteBackend::new(fetch, RemoteIndex::from_files(files)),
                (None, None) => RemoteBackend::with_index_file(fetch, BUNDLE_INDEX_FILE).await?,
            };
            MountEntry::new(mount_point, backend)
        }
    };
    Ok(entry)
}
