//! Configuration loader with band-based layering.
//!
//! Builds the standard source stack and registers it with a [`ValueStore`]
//! in a single swap. Each file-backed source is recorded in
//! [`LoadedSources`] so it can be reloaded when the file changes.

use super::formats::FileFormat;
use super::source::{Source, SourceBand};
use super::store::ValueStore;
use crate::error::{ConfigError, ConfigResult};
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable naming the installation configuration directory.
pub const CONFIG_DIR_ENV: &str = "PORTAL_CONFIG_DIR";
/// Environment variable naming one extra configuration file.
pub const CONFIG_PATH_ENV: &str = "PORTAL_CONFIG_PATH";

/// Band index reserved for the explicit file, above every directory file.
pub const EXPLICIT_FILE_INDEX: usize = 49;

/// Band index of the `n`-th installation directory file.
pub fn installation_index(n: usize) -> usize {
    n.min(EXPLICIT_FILE_INDEX - 1)
}

/// Filesystem locations consulted by the loader.
#[derive(Debug, Clone, Default)]
pub struct ConfigPaths {
    /// Directory whose `*.properties` / `*.yml` / `*.yaml` files are loaded
    pub installation_dir: Option<PathBuf>,
    /// Single extra file, loaded above the installation directory files
    pub explicit_file: Option<PathBuf>,
}

impl ConfigPaths {
    /// Discover paths from environment and defaults.
    pub fn discover() -> Self {
        // Installation dir: PORTAL_CONFIG_DIR or ~/.portal/config
        let installation_dir = std::env::var(CONFIG_DIR_ENV)
            .ok()
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .or_else(|| dirs::home_dir().map(|h| h.join(".portal").join("config")));

        let explicit_file = std::env::var(CONFIG_PATH_ENV)
            .ok()
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);

        Self {
            installation_dir,
            explicit_file,
        }
    }

    /// Create paths with an explicit installation directory.
    pub fn with_dirs(installation_dir: Option<PathBuf>) -> Self {
        Self {
            installation_dir,
            explicit_file: None,
        }
    }
}

/// A registered source that is backed by a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSourceSpec {
    pub path: PathBuf,
    pub name: String,
    pub ordinal: i32,
    pub optional: bool,
}

impl FileSourceSpec {
    pub fn new(path: impl Into<PathBuf>, band: SourceBand, index: usize, optional: bool) -> Self {
        let path = path.into();
        Self {
            name: format!("{}:{}", band, path.display()),
            ordinal: band.ordinal(index),
            path,
            optional,
        }
    }

    /// Read and parse the file.
    ///
    /// Returns `Ok(None)` for a missing optional file, and for a malformed
    /// optional file after logging it.
    pub fn load(&self) -> ConfigResult<Option<Source>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if self.optional && e.kind() == io::ErrorKind::NotFound => {
                debug!("Optional configuration file {} not found", self.path.display());
                return Ok(None);
            }
            Err(e) => {
                return Err(ConfigError::UnreadableSource {
                    path: self.path.clone(),
                    source: e,
                });
            }
        };

        let format = FileFormat::from_path(&self.path).ok_or_else(|| {
            ConfigError::UnsupportedFormat {
                path: self.path.clone(),
            }
        })?;

        match format.parse(&content, &self.name) {
            Ok(properties) => Ok(Some(
                Source::new(&self.name, self.ordinal).with_properties(properties),
            )),
            Err(e) if self.optional => {
                warn!("Skipping optional configuration file: {}", e);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

/// What a [`ConfigLoader`] registered.
#[derive(Debug, Clone, Default)]
pub struct LoadedSources {
    /// File-backed sources, including files that were optional and absent.
    pub files: Vec<FileSourceSpec>,
    /// Installation directory, if it existed at load time.
    pub installation_dir: Option<PathBuf>,
}

impl LoadedSources {
    /// The file source backed by `path`, if any.
    pub fn file(&self, path: &Path) -> Option<&FileSourceSpec> {
        self.files.iter().find(|f| f.path == path)
    }

    /// Every path worth watching: backing files, the installation directory,
    /// and the parent directory of each backing file that does not exist yet.
    pub fn watch_paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = Vec::new();
        let missing_parents = self
            .files
            .iter()
            .filter(|f| !f.path.exists())
            .filter_map(|f| f.path.parent().map(Path::to_path_buf));
        let candidates = self
            .files
            .iter()
            .map(|f| f.path.clone())
            .chain(self.installation_dir.clone())
            .chain(missing_parents);
        for path in candidates {
            if !paths.contains(&path) {
                paths.push(path);
            }
        }
        paths
    }

    /// Number of installation directory files loaded so far. The explicit
    /// file is not counted.
    pub fn installation_file_count(&self) -> usize {
        let band = SourceBand::InstallationFiles;
        let explicit = band.ordinal(EXPLICIT_FILE_INDEX);
        self.files
            .iter()
            .filter(|f| f.ordinal >= band.base_ordinal() && f.ordinal < explicit)
            .count()
    }
}

/// Configuration loader that assembles the layered source stack.
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    /// Paths for the installation band
    pub paths: ConfigPaths,
    defaults: Vec<BTreeMap<String, String>>,
    module_files: Vec<(PathBuf, bool)>,
    assembly_files: Vec<(PathBuf, bool)>,
    environment: Option<String>,
    overrides: BTreeMap<String, String>,
}

impl ConfigLoader {
    pub fn new(paths: ConfigPaths) -> Self {
        Self {
            paths,
            ..Self::default()
        }
    }

    /// Add a framework defaults map. Later maps take precedence over earlier ones.
    pub fn with_defaults<K, V>(mut self, defaults: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.defaults.push(
            defaults
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }

    pub fn with_module_file(mut self, path: impl Into<PathBuf>, optional: bool) -> Self {
        self.module_files.push((path.into(), optional));
        self
    }

    pub fn with_assembly_file(mut self, path: impl Into<PathBuf>, optional: bool) -> Self {
        self.assembly_files.push((path.into(), optional));
        self
    }

    /// Include environment variables whose name starts with `prefix`
    /// (an empty prefix includes every variable). Names are used verbatim.
    pub fn with_environment(mut self, prefix: impl Into<String>) -> Self {
        self.environment = Some(prefix.into());
        self
    }

    /// Add a runtime override. An empty value deletes the key.
    pub fn with_override(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.overrides.insert(key.into(), value.into());
        self
    }

    /// Build every source and register them with `store` in one swap.
    ///
    /// Fails on the first unreadable or malformed required source, in which
    /// case nothing is registered.
    pub fn load(&self, store: &ValueStore) -> ConfigResult<LoadedSources> {
        let mut sources = Vec::new();
        let mut loaded = LoadedSources::default();

        for (index, defaults) in self.defaults.iter().enumerate() {
            let band = SourceBand::FrameworkDefaults;
            sources.push(
                Source::new(format!("{}:{}", band, index), band.ordinal(index))
                    .with_properties(defaults.clone()),
            );
        }

        let mut file_specs: Vec<FileSourceSpec> = Vec::new();
        for (index, (path, optional)) in self.module_files.iter().enumerate() {
            file_specs.push(FileSourceSpec::new(path, SourceBand::ModuleDefaults, index, *optional));
        }
        for (index, (path, optional)) in self.assembly_files.iter().enumerate() {
            file_specs.push(FileSourceSpec::new(
                path,
                SourceBand::AssemblyOverrides,
                index,
                *optional,
            ));
        }

        let mut installation_files = Vec::new();
        if let Some(ref dir) = self.paths.installation_dir {
            if dir.is_dir() {
                installation_files = list_config_files(dir)?;
                loaded.installation_dir = Some(dir.clone());
            } else {
                debug!("Installation directory {} does not exist", dir.display());
            }
        }
        for (n, path) in installation_files.into_iter().enumerate() {
            file_specs.push(FileSourceSpec::new(
                path,
                SourceBand::InstallationFiles,
                installation_index(n),
                false,
            ));
        }
        if let Some(ref path) = self.paths.explicit_file {
            file_specs.push(FileSourceSpec::new(
                path,
                SourceBand::InstallationFiles,
                EXPLICIT_FILE_INDEX,
                false,
            ));
        }

        for spec in &file_specs {
            if let Some(source) = spec.load()? {
                sources.push(source);
            }
        }
        loaded.files = file_specs;

        if let Some(ref prefix) = self.environment {
            sources.push(environment_source(std::env::vars(), prefix));
        }

        if !self.overrides.is_empty() {
            let band = SourceBand::RuntimeOverrides;
            sources.push(
                Source::new(band.to_string(), band.base_ordinal())
                    .with_properties(self.overrides.clone()),
            );
        }

        store.register_all(sources)?;
        Ok(loaded)
    }
}

/// Build the environment source from `(name, value)` pairs.
pub fn environment_source(vars: impl IntoIterator<Item = (String, String)>, prefix: &str) -> Source {
    let band = SourceBand::Environment;
    Source::new(band.to_string(), band.base_ordinal())
        .with_properties(vars.into_iter().filter(|(name, _)| name.starts_with(prefix)))
}

/// Supported configuration files directly inside `dir`, sorted by name.
pub fn list_config_files(dir: &Path) -> ConfigResult<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|e| ConfigError::UnreadableSource {
        path: dir.to_path_buf(),
        source: e,
    })?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && FileFormat::from_path(path).is_some())
        .collect();
    files.sort();
    Ok(files)
}
