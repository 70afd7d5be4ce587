//! Configuration sources and their priority bands.

use std::collections::BTreeMap;

/// Conventional priority bands (lowest to highest).
///
/// Each band owns the ordinals from its base up to the next band's base, so
/// several sources can share a band and still be ordered among themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SourceBand {
    /// Values shipped with the framework itself
    FrameworkDefaults,
    /// Defaults contributed by individual modules
    ModuleDefaults,
    /// Overrides bundled with the deployed assembly
    AssemblyOverrides,
    /// Files found in the installation directory
    InstallationFiles,
    /// Process environment variables
    Environment,
    /// Explicit runtime or test overrides (highest priority)
    RuntimeOverrides,
}

impl SourceBand {
    /// Lowest ordinal in this band.
    pub fn base_ordinal(self) -> i32 {
        match self {
            SourceBand::FrameworkDefaults => 100,
            SourceBand::ModuleDefaults => 150,
            SourceBand::AssemblyOverrides => 200,
            SourceBand::InstallationFiles => 250,
            SourceBand::Environment => 300,
            SourceBand::RuntimeOverrides => 400,
        }
    }

    /// Ordinal for the `index`-th source within this band.
    pub fn ordinal(self, index: usize) -> i32 {
        // Bands are 50 wide; clamp so a large index never spills into the next band.
        self.base_ordinal() + (index.min(49) as i32)
    }
}

impl std::fmt::Display for SourceBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceBand::FrameworkDefaults => write!(f, "framework-defaults"),
            SourceBand::ModuleDefaults => write!(f, "module-defaults"),
            SourceBand::AssemblyOverrides => write!(f, "assembly-overrides"),
            SourceBand::InstallationFiles => write!(f, "installation"),
            SourceBand::Environment => write!(f, "environment"),
            SourceBand::RuntimeOverrides => write!(f, "runtime-overrides"),
        }
    }
}

/// A named, prioritized set of configuration properties.
///
/// Sources are immutable once built. Reloading a source means building a new
/// one with the same name and registering it in place of the old one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    name: String,
    ordinal: i32,
    properties: BTreeMap<String, String>,
}

impl Source {
    pub fn new(name: impl Into<String>, ordinal: i32) -> Self {
        Self {
            name: name.into(),
            ordinal,
            properties: BTreeMap::new(),
        }
    }

    /// Add a property. An empty value is a tombstone for the key.
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn with_properties<K, V>(mut self, properties: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.properties
            .extend(properties.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ordinal(&self) -> i32 {
        self.ordinal
    }

    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// A copy of this source carrying different properties.
    pub fn with_replaced_properties(&self, properties: BTreeMap<String, String>) -> Self {
        Self {
            name: self.name.clone(),
            ordinal: self.ordinal,
            properties,
        }
    }
}
