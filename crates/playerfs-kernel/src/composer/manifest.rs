//! Staging manifest.

use std::path::PathBuf;

/// A file that must exist at `destination` before the runtime starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    pub source: PathBuf,
    pub destination: PathBuf,
}

/// Ordered list of files to stage.
///
/// Entries are applied in order; a later entry may read what an earlier
/// one wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    entries: Vec<StagedFile>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, source: impl Into<PathBuf>, destination: impl Into<PathBuf>) {
        self.entries.push(StagedFile {
            source: source.into(),
            destination: destination.into(),
        });
    }

    pub fn iter(&self) -> std::slice::Iter<'_, StagedFile> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<S, D> FromIterator<(S, D)> for Manifest
where
    S: Into<PathBuf>,
    D: Into<PathBuf>,
{
    fn from_iter<I: IntoIterator<Item = (S, D)>>(iter: I) -> Self {
        let mut manifest = Self::new();
        for (source, destination) in iter {
            manifest.push(source, destination);
        }
        manifest
    }
}

impl<'a> IntoIterator for &'a Manifest {
    type Item = &'a StagedFile;
    type IntoIter = std::slice::Iter<'a, StagedFile>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Summary of a completed staging run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageReport {
    /// Destinations written, in manifest order.
    pub files: Vec<PathBuf>,
    /// Total bytes written.
    pub bytes: u64,
}
