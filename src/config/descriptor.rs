//! Change-detection snapshots of filesystem paths.
//!
//! A file is tracked by its modification time, a directory by the names of
//! its immediate children. Deletion is reported as a change for both: the
//! snapshot flips to "missing" and a later re-creation is reported again.

use std::collections::BTreeSet;
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::warn;

/// Last observed state of a watched path.
#[derive(Debug, Clone, PartialEq, Eq)]
enum PathState {
    File(Option<SystemTime>),
    Directory(Option<BTreeSet<OsString>>),
}

/// Snapshot of one path's change-relevant state.
#[derive(Debug, Clone)]
pub struct Descriptor {
    path: PathBuf,
    state: PathState,
}

impl Descriptor {
    /// Snapshot `path`. Returns `None` if it does not exist or cannot be read.
    pub fn create(path: impl Into<PathBuf>) -> Option<Self> {
        let path = path.into();
        let metadata = std::fs::metadata(&path).ok()?;
        let state = if metadata.is_dir() {
            PathState::Directory(Some(read_entries(&path).ok()?))
        } else {
            PathState::File(Some(metadata.modified().ok()?))
        };
        Some(Self { path, state })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_directory(&self) -> bool {
        matches!(self.state, PathState::Directory(_))
    }

    /// Compare the current disk state to the snapshot.
    ///
    /// Errors other than "not found" are returned so the caller can retry.
    pub fn check(&self) -> io::Result<bool> {
        Ok(self.current_state()? != self.state)
    }

    /// Like [`check`](Self::check), but an I/O error counts as "not updated".
    pub fn is_updated(&self) -> bool {
        match self.check() {
            Ok(updated) => updated,
            Err(e) => {
                warn!("Cannot check {}: {}", self.path.display(), e);
                false
            }
        }
    }

    /// Take the current disk state as the new baseline.
    pub fn update(&mut self) -> io::Result<()> {
        self.state = self.current_state()?;
        Ok(())
    }

    fn current_state(&self) -> io::Result<PathState> {
        match &self.state {
            PathState::File(_) => match std::fs::metadata(&self.path) {
                Ok(metadata) => Ok(PathState::File(Some(metadata.modified()?))),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(PathState::File(None)),
                Err(e) => Err(e),
            },
            PathState::Directory(_) => match read_entries(&self.path) {
                Ok(entries) => Ok(PathState::Directory(Some(entries))),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(PathState::Directory(None)),
                Err(e) => Err(e),
            },
        }
    }
}

fn read_entries(dir: &Path) -> io::Result<BTreeSet<OsString>> {
    std::fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.file_name()))
        .collect()
}
