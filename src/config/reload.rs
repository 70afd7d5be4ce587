//! Hot reload: turns file change events into source swaps.
//!
//! The reloader re-reads a changed file and registers the new content under
//! the same source name and ordinal, which makes the store publish the
//! delta to its observers. New files appearing in the installation
//! directory become new sources and are added to the watcher, and so do
//! declared files that were missing at load time once they show up.

use super::loader::{FileSourceSpec, LoadedSources, installation_index, list_config_files};
use super::source::{Source, SourceBand};
use super::store::ValueStore;
use super::watcher::{FileChangeEvent, FileWatcherService};
use crate::error::ConfigResult;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Applies file changes to a [`ValueStore`].
pub struct SourceReloader {
    store: Arc<ValueStore>,
    loaded: Mutex<LoadedSources>,
    /// Declared files that did not exist at load time.
    waiting: Mutex<BTreeSet<PathBuf>>,
    watcher: Option<Arc<FileWatcherService>>,
}

impl SourceReloader {
    pub fn new(store: Arc<ValueStore>, loaded: LoadedSources) -> Self {
        let waiting = loaded
            .files
            .iter()
            .filter(|f| !f.path.exists())
            .map(|f| f.path.clone())
            .collect();
        Self {
            store,
            loaded: Mutex::new(loaded),
            waiting: Mutex::new(waiting),
            watcher: None,
        }
    }

    /// Register newly discovered files with `watcher`.
    pub fn with_watcher(mut self, watcher: Arc<FileWatcherService>) -> Self {
        self.watcher = Some(watcher);
        self
    }

    /// Snapshot of the tracked file sources.
    pub fn loaded(&self) -> LoadedSources {
        self.lock_loaded().clone()
    }

    /// React to a change of `path`.
    ///
    /// On a read or parse failure the previous source stays registered and
    /// the error is returned.
    pub fn handle_change(&self, path: &Path) -> ConfigResult<()> {
        let (tracked, installation_dir) = {
            let loaded = self.lock_loaded();
            (loaded.file(path).cloned(), loaded.installation_dir.clone())
        };

        if let Some(spec) = tracked {
            return self.reload_file(&spec);
        }

        let appeared = self.load_appeared_files(path);
        if installation_dir.as_deref() == Some(path) {
            return self.scan_installation_dir(path);
        }
        if !appeared {
            debug!("Ignoring change of untracked path {}", path.display());
        }
        Ok(())
    }

    /// Load waiting files inside `dir` that exist now. Returns true if `dir`
    /// is the parent of any waiting file.
    fn load_appeared_files(&self, dir: &Path) -> bool {
        let (appeared, is_parent) = {
            let mut waiting = self.lock_waiting();
            let is_parent = waiting.iter().any(|p| p.parent() == Some(dir));
            let appeared: Vec<PathBuf> = waiting
                .iter()
                .filter(|p| p.parent() == Some(dir) && p.exists())
                .cloned()
                .collect();
            for path in &appeared {
                waiting.remove(path);
            }
            (appeared, is_parent)
        };

        for path in appeared {
            let Some(spec) = self.lock_loaded().file(&path).cloned() else {
                continue;
            };
            info!("Configuration file {} appeared", path.display());
            if let Some(ref watcher) = self.watcher {
                watcher.register([&spec.path]);
            }
            if let Err(e) = self.reload_file(&spec) {
                warn!("Appeared configuration file not loaded yet: {}", e);
            }
        }
        is_parent
    }

    fn reload_file(&self, spec: &FileSourceSpec) -> ConfigResult<()> {
        if !spec.path.exists() {
            info!(
                "Configuration file {} was removed; clearing source '{}'",
                spec.path.display(),
                spec.name
            );
            return self.store.register(Source::new(&spec.name, spec.ordinal));
        }

        match spec.load() {
            Ok(Some(source)) => {
                info!("Reloaded configuration source '{}'", spec.name);
                self.store.register(source)
            }
            Ok(None) => self.store.register(Source::new(&spec.name, spec.ordinal)),
            Err(e) => {
                error!(
                    "Keeping previous content of '{}' after failed reload: {}",
                    spec.name, e
                );
                Err(e)
            }
        }
    }

    fn scan_installation_dir(&self, dir: &Path) -> ConfigResult<()> {
        let candidates = list_config_files(dir)?;
        let mut added = Vec::new();
        {
            let mut loaded = self.lock_loaded();
            for path in candidates {
                if loaded.file(&path).is_some() {
                    continue;
                }
                let index = installation_index(loaded.installation_file_count());
                let spec = FileSourceSpec::new(&path, SourceBand::InstallationFiles, index, false);
                loaded.files.push(spec.clone());
                added.push(spec);
            }
        }

        for spec in &added {
            info!("New configuration file {}", spec.path.display());
            if let Some(ref watcher) = self.watcher {
                watcher.register([&spec.path]);
            }
            if let Err(e) = self.reload_file(spec) {
                warn!("New configuration file not loaded yet: {}", e);
            }
        }
        Ok(())
    }

    /// Apply events from `events` until the channel closes.
    pub fn spawn(self: Arc<Self>, mut events: broadcast::Receiver<FileChangeEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        debug!("File change at {}", event.detected_at.to_rfc3339());
                        // Errors are already logged; the old source stays in place.
                        let _ = self.handle_change(&event.path);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Reloader lagged behind, {} change event(s) dropped", skipped);
                    }
                    Err(RecvError::Closed) => {
                        info!("Change event channel closed, reloader stopping");
                        return;
                    }
                }
            }
        })
    }

    fn lock_loaded(&self) -> std::sync::MutexGuard<'_, LoadedSources> {
        self.loaded
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_waiting(&self) -> std::sync::MutexGuard<'_, BTreeSet<PathBuf>> {
        self.waiting
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
