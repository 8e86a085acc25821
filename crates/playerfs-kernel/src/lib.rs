//! # playerfs-kernel
//!
//! Virtual filesystem composition for an emulator player.
//!
//! Several storage backends are mounted into one namespace, the files the
//! runtime needs are staged into place before it starts, and user files
//! can be uploaded into the namespace while it runs:
//!
//! - [`vfs`] - backends and the write-once mount table
//! - [`composer`] - `compose`, `stage`, `upload`, `export`
//! - [`layout`] - the fixed on-disk layout shared with the runtime
//! - [`readiness`] - the two-source join gating start
//! - [`runtime`] - the runtime contract and the launcher driving it
//! - [`config`] - TOML configuration for one player instance

pub mod composer;
pub mod config;
pub mod constants;
pub mod layout;
pub mod readiness;
pub mod runtime;
pub mod vfs;

pub use composer::{
    ComposeError, ComposeResult, Composer, ExportedFile, Manifest, Namespace, StageReport,
    StagedFile, UploadBatch, UploadOutcome,
};
pub use config::{BackendConfig, ConfigError, PlayerConfig};
pub use layout::PlayerLayout;
pub use readiness::{Readiness, ReadinessJoin, ReadySource};
pub use runtime::{CommandRuntime, LaunchError, Launcher, Runtime, RuntimeArgs, RuntimeError};
pub use vfs::{
    DirEntry, FileAttr, FileType, MountEntry, MountInfo, MountTable, OverlapPolicy, VfsError,
    VfsOps, VfsResult,
    backends::{LocalBackend, MemoryBackend, RemoteBackend},
};
