//! Independent per-file upload tasks.

use std::path::PathBuf;
use tokio::task::JoinSet;
use tracing::warn;

use super::error::{ComposeError, ComposeResult};

/// Result of one file in an [`UploadBatch`].
#[derive(Debug)]
pub struct UploadOutcome {
    pub file_name: String,
    /// Destination path on success.
    pub result: ComposeResult<PathBuf>,
}

impl UploadOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// A set of running uploads, one task per file.
///
/// Outcomes arrive in completion order. A failed upload does not affect
/// the others.
pub struct UploadBatch {
    tasks: JoinSet<UploadOutcome>,
}

impl UploadBatch {
    pub(crate) fn new(tasks: JoinSet<UploadOutcome>) -> Self {
        Self { tasks }
    }

    /// Number of uploads still running.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Wait for the next upload to complete.
    ///
    /// Returns `None` once every upload has reported. Tasks that panic are
    /// logged and skipped.
    pub async fn next(&mut self) -> Option<UploadOutcome> {
        loop {
            match self.tasks.join_next().await? {
                Ok(outcome) => return Some(outcome),
                Err(e) => warn!(error = %e, "upload task failed to complete"),
            }
        }
    }

    /// Wait for all uploads.
    pub async fn finish(mut self) -> Vec<UploadOutcome> {
        let mut outcomes = Vec::with_capacity(self.tasks.len());
        while let Some(outcome) = self.next().await {
            outcomes.push(outcome);
        }
        outcomes
    }
}

/// Check that `name` is a plain leaf name.
pub(crate) fn validate_file_name(name: &str) -> ComposeResult<()> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0');
    if invalid {
        return Err(ComposeError::InvalidFileName(name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_file_name() {
        assert!(validate_file_name("foo.nes").is_ok());
        assert!(validate_file_name(".hidden").is_ok());
        for bad in ["", ".", "..", "a/b", "..\\x", "/etc/passwd"] {
            assert!(
                matches!(validate_file_name(bad), Err(ComposeError::InvalidFileName(_))),
                "{bad:?} should be rejected"
            );
        }
    }
}
