//! External program runtime.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{Runtime, RuntimeArgs, RuntimeError};
use crate::composer::Namespace;

/// Runs the emulator as a child process.
///
/// Namespace paths in the argument vector are rewritten to the real paths
/// of the local directories backing them, so the program can open them.
#[derive(Debug)]
pub struct CommandRuntime {
    program: PathBuf,
    child: Mutex<Option<Child>>,
}

impl CommandRuntime {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            child: Mutex::new(None),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Resolve the program: as given when it contains a separator,
    /// otherwise through `PATH`.
    pub fn locate(&self) -> Result<PathBuf, RuntimeError> {
        which::which(&self.program).map_err(|e| {
            debug!(program = %self.program.display(), error = %e, "runtime lookup failed");
            RuntimeError::NotFound(self.program.display().to_string())
        })
    }

    /// Replace absolute namespace paths with their real paths.
    ///
    /// Arguments that are not absolute, or that lie outside every mount,
    /// pass through unchanged. A path under a mount with no local
    /// directory behind it is `Unmapped`: the program could not open it.
    pub fn rewrite_args(ns: &Namespace, args: &RuntimeArgs) -> Result<Vec<String>, RuntimeError> {
        let mounts = ns.mounts();
        args.iter()
            .map(|arg| {
                let path = Path::new(arg);
                if !path.is_absolute() || !mounts.iter().any(|m| path.starts_with(&m.path)) {
                    return Ok(arg.clone());
                }
                ns.real_path(path)
                    .map(|real| real.display().to_string())
                    .ok_or_else(|| RuntimeError::Unmapped(arg.clone()))
            })
            .collect()
    }
}

#[async_trait]
impl Runtime for CommandRuntime {
    async fn initialized(&self) -> Result<(), RuntimeError> {
        let program = self.locate()?;
        debug!(program = %program.display(), "runtime located");
        Ok(())
    }

    async fn call_main(&self, ns: &Namespace, args: &RuntimeArgs) -> Result<(), RuntimeError> {
        let program = self.locate()?;
        let args = Self::rewrite_args(ns, args)?;

        let child = Command::new(&program)
            .args(&args)
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| RuntimeError::Spawn {
                program: program.display().to_string(),
                source,
            })?;

        info!(program = %program.display(), pid = ?child.id(), "runtime spawned");
        *self.child.lock().await = Some(child);
        Ok(())
    }

    async fn resume_main_loop(&self) -> Result<(), RuntimeError> {
        let mut child = self
            .child
            .lock()
            .await
            .take()
            .ok_or(RuntimeError::NotStarted)?;

        let status = child.wait().await?;
        info!(%status, "runtime exited");
        if status.success() {
            return Ok(());
        }
        match status.code() {
            Some(code) => Err(RuntimeError::Exited(code)),
            None => Err(RuntimeError::Terminated),
        }
    }
}
