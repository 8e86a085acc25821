//! Persisted state layout.
//!
//! Every path the runtime and earlier sessions agree on is derived here
//! from three roots, the content file name and the snapshot slot.

use std::path::PathBuf;

use crate::composer::Manifest;
use crate::constants::{
    CONFIG_FILE, DEFAULT_BUNDLE_ROOT, DEFAULT_CONTENT_ROOT, DEFAULT_USERDATA_ROOT,
    ENTRY_STATE_FILE, ENTRY_STATE_SUFFIX, MOVIE_FILE, STATES_DIR, UPLOAD_DIR,
};
use crate::runtime::RuntimeArgs;

/// Where a player instance keeps its files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerLayout {
    pub userdata_root: PathBuf,
    pub bundle_root: PathBuf,
    pub content_root: PathBuf,
    /// Primary content file name, e.g. `bfight.nes`.
    pub content: String,
    /// Snapshot slot; zero disables the prior-session snapshot.
    pub entry_slot: u32,
}

impl PlayerLayout {
    /// Layout with the default roots.
    pub fn new(content: impl Into<String>, entry_slot: u32) -> Self {
        Self {
            userdata_root: PathBuf::from(DEFAULT_USERDATA_ROOT),
            bundle_root: PathBuf::from(DEFAULT_BUNDLE_ROOT),
            content_root: PathBuf::from(DEFAULT_CONTENT_ROOT),
            content: content.into(),
            entry_slot,
        }
    }

    pub fn with_userdata_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.userdata_root = root.into();
        self
    }

    pub fn with_bundle_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.bundle_root = root.into();
        self
    }

    pub fn with_content_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.content_root = root.into();
        self
    }

    /// True when a prior-session snapshot is staged.
    pub fn has_entry_state(&self) -> bool {
        self.entry_slot != 0
    }

    /// Content name up to its last `.`.
    ///
    /// A name without a dot is its own base.
    pub fn content_base(&self) -> &str {
        match self.content.rfind('.') {
            Some(idx) => &self.content[..idx],
            None => &self.content,
        }
    }

    pub fn config_source(&self) -> PathBuf {
        self.content_root.join(CONFIG_FILE)
    }

    pub fn config_path(&self) -> PathBuf {
        self.userdata_root.join(CONFIG_FILE)
    }

    pub fn entry_state_source(&self) -> PathBuf {
        self.content_root.join(ENTRY_STATE_FILE)
    }

    /// `<userdata>/states/<base>.state1.entry`
    pub fn entry_state_path(&self) -> PathBuf {
        self.userdata_root
            .join(STATES_DIR)
            .join(format!("{}{}", self.content_base(), ENTRY_STATE_SUFFIX))
    }

    pub fn upload_dir(&self) -> PathBuf {
        self.userdata_root.join(UPLOAD_DIR)
    }

    pub fn movie_path(&self) -> PathBuf {
        self.userdata_root.join(MOVIE_FILE)
    }

    pub fn content_path(&self) -> PathBuf {
        self.content_root.join(&self.content)
    }

    /// Files the content source must provide, relative to the content root.
    pub fn content_files(&self) -> Vec<String> {
        let mut files = vec![CONFIG_FILE.to_string(), self.content.clone()];
        if self.has_entry_state() {
            files.push(ENTRY_STATE_FILE.to_string());
        }
        files
    }

    /// Files that must be in place before the runtime starts.
    ///
    /// The snapshot (when enabled) comes first, then the configuration.
    pub fn manifest(&self) -> Manifest {
        let mut manifest = Manifest::new();
        if self.has_entry_state() {
            manifest.push(self.entry_state_source(), self.entry_state_path());
        }
        manifest.push(self.config_source(), self.config_path());
        manifest
    }

    /// Argument vector for the runtime entry point.
    pub fn runtime_args(&self) -> RuntimeArgs {
        RuntimeArgs::new([
            "-v".to_string(),
            "-R".to_string(),
            self.movie_path().display().to_string(),
            "-e".to_string(),
            self.entry_slot.to_string(),
            self.content_path().display().to_string(),
        ])
    }
}
