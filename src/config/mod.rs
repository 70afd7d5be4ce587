//! Layered configuration core.
//!
//! Consolidates configuration from prioritized sources with key-by-key
//! layering:
//! 1. **Framework defaults** - maps supplied by the host application
//! 2. **Module defaults** - per-module `.properties` / `.yaml` files
//! 3. **Assembly overrides** - files bundled with the deployment
//! 4. **Installation files** - every config file in the installation directory
//! 5. **Environment** - process environment variables
//! 6. **Runtime overrides** - explicit values set by code or tests
//!
//! ## Merge Strategy
//! - The highest ordinal source defining a key wins
//! - An empty value deletes the key for every lower source
//! - Values may reference other keys as `${key}` or `${key:default}`
//!
//! ## Hot Reload
//! [`FileWatcherService`] polls the backing files, [`SourceReloader`] swaps
//! changed sources into the [`ValueStore`], and the store's
//! [`ChangeNotifier`] tells observers which keys changed.
//!
//! ## Environment Variables
//! - `PORTAL_CONFIG_DIR` - Installation directory (default: `~/.portal/config`)
//! - `PORTAL_CONFIG_PATH` - One extra file loaded above the installation files

mod accessors;
mod derived;
mod descriptor;
mod formats;
mod loader;
mod merge;
mod notifier;
mod placeholder;
mod reload;
mod source;
mod store;
pub mod watcher;

pub use accessors::CacheConfig;
pub use derived::Derived;
pub use descriptor::Descriptor;
pub use formats::{FileFormat, parse_properties, parse_yaml};
pub use loader::{
    CONFIG_DIR_ENV, CONFIG_PATH_ENV, ConfigLoader, ConfigPaths, FileSourceSpec, LoadedSources,
    environment_source,
};
pub use merge::merge_sources;
pub use notifier::{ChangeEvent, ChangeNotifier, SubscriptionId, compute_delta};
pub use placeholder::{MAX_NESTING, Placeholder, PlaceholderResolver, placeholders};
pub use reload::SourceReloader;
pub use source::{Source, SourceBand};
pub use store::ValueStore;
pub use watcher::{FileChangeEvent, FileWatcherService, WatcherConfig};
