//! Runtime contract and launcher.
//!
//! The emulator runtime is an external collaborator. The player talks to
//! it through three points: the runtime's own readiness
//! ([`Runtime::initialized`]), the entry point ([`Runtime::call_main`]),
//! and the main loop ([`Runtime::resume_main_loop`]).

mod command;
mod launcher;

use async_trait::async_trait;
use thiserror::Error;

use crate::composer::{ComposeError, Namespace};
use crate::readiness::Readiness;

pub use command::CommandRuntime;
pub use launcher::Launcher;

/// Positional argument vector for the runtime entry point.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeArgs(Vec<String>);

impl RuntimeArgs {
    pub fn new(args: impl IntoIterator<Item = String>) -> Self {
        Self(args.into_iter().collect())
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.0.clone()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.0.iter()
    }
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("runtime failed to initialize: {0}")]
    Init(String),

    #[error("runtime program not found: {0}")]
    NotFound(String),

    /// A namespace path in the arguments has no real file behind it.
    #[error("{0} is not backed by a local directory")]
    Unmapped(String),

    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("main loop resumed before the entry point was called")]
    NotStarted,

    #[error("runtime exited with status {0}")]
    Exited(i32),

    #[error("runtime terminated by signal")]
    Terminated,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error(transparent)]
    Compose(#[from] ComposeError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error("player is not ready to start ({0:?})")]
    NotReady(Readiness),

    #[error("player has already booted")]
    AlreadyBooted,
}

/// The emulator runtime as seen by the launcher.
#[async_trait]
pub trait Runtime: Send + Sync {
    /// Resolves once the runtime's own initialization is complete.
    async fn initialized(&self) -> Result<(), RuntimeError>;

    /// Invoke the entry point with `args`. Paths in `args` are namespace
    /// paths.
    async fn call_main(&self, ns: &Namespace, args: &RuntimeArgs) -> Result<(), RuntimeError>;

    /// Run the main loop. Called immediately after [`Runtime::call_main`].
    async fn resume_main_loop(&self) -> Result<(), RuntimeError>;
}
