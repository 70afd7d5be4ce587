//! Polling file watcher for configuration sources.
//!
//! Registered files and directories are snapshotted as [`Descriptor`]s and
//! re-checked on a fixed interval by a single background task. Every path
//! found changed gets its baseline refreshed and a [`FileChangeEvent`] is
//! broadcast to subscribers.
//!
//! Whether the task runs at all is read from the value store on each
//! [`FileWatcherService::initialize`] call:
//! - `portal.configuration.watcher.enabled` (default `true`)
//! - `portal.configuration.watcher.interval_ms` (default `1000`)

use super::descriptor::Descriptor;
use super::store::ValueStore;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

pub const WATCHER_ENABLED_KEY: &str = "portal.configuration.watcher.enabled";
pub const WATCHER_INTERVAL_KEY: &str = "portal.configuration.watcher.interval_ms";

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);
const EVENT_CAPACITY: usize = 64;

/// Emitted once per changed path per tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChangeEvent {
    pub path: PathBuf,
    pub detected_at: DateTime<Utc>,
}

/// Configuration for the file watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatcherConfig {
    /// Whether the polling task should run.
    pub enabled: bool,
    /// Time between two polling ticks.
    pub poll_interval: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval: Duration::from_millis(1000),
        }
    }
}

impl WatcherConfig {
    /// Read the watcher settings, falling back to defaults for absent or
    /// invalid values.
    pub fn from_store(store: &ValueStore) -> Self {
        let defaults = Self::default();

        let enabled = store.resolve_as_bool(WATCHER_ENABLED_KEY).unwrap_or_else(|e| {
            warn!("{}; file watcher stays enabled", e);
            None
        });
        let interval = store.resolve_as_int(WATCHER_INTERVAL_KEY).unwrap_or_else(|e| {
            warn!("{}; using default poll interval", e);
            None
        });

        Self {
            enabled: enabled.unwrap_or(defaults.enabled),
            poll_interval: interval
                .and_then(|ms| u64::try_from(ms).ok())
                .map(Duration::from_millis)
                .map(|d| d.max(MIN_POLL_INTERVAL))
                .unwrap_or(defaults.poll_interval),
        }
    }
}

struct PollTask {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
    interval: Duration,
}

/// Periodically polls registered paths for changes.
///
/// Lifecycle is Stopped → Running → Stopped. [`initialize`](Self::initialize)
/// and [`destroy`](Self::destroy) are both idempotent. Dropping the service
/// aborts a running task.
pub struct FileWatcherService {
    store: Arc<ValueStore>,
    /// Descriptors in registration order.
    descriptors: Arc<Mutex<Vec<Descriptor>>>,
    events: broadcast::Sender<FileChangeEvent>,
    task: Mutex<Option<PollTask>>,
}

impl FileWatcherService {
    /// Create a stopped watcher that reads its settings from `store`.
    pub fn new(store: Arc<ValueStore>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            store,
            descriptors: Arc::new(Mutex::new(Vec::new())),
            events,
            task: Mutex::new(None),
        }
    }

    /// Receive change events from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<FileChangeEvent> {
        self.events.subscribe()
    }

    /// Start watching paths. Missing paths and duplicates are ignored.
    pub fn register<P: AsRef<Path>>(&self, paths: impl IntoIterator<Item = P>) {
        let mut descriptors = lock(&self.descriptors);
        for path in paths {
            let path = path.as_ref();
            if descriptors.iter().any(|d| d.path() == path) {
                continue;
            }
            match Descriptor::create(path) {
                Some(descriptor) => {
                    debug!("Watching {}", path.display());
                    descriptors.push(descriptor);
                }
                None => debug!("Not watching {}: path does not exist", path.display()),
            }
        }
    }

    /// Stop watching paths. Unknown paths are ignored.
    pub fn unregister<P: AsRef<Path>>(&self, paths: impl IntoIterator<Item = P>) {
        let mut descriptors = lock(&self.descriptors);
        for path in paths {
            descriptors.retain(|d| d.path() != path.as_ref());
        }
    }

    /// Watched paths in registration order.
    pub fn registered_paths(&self) -> Vec<PathBuf> {
        lock(&self.descriptors)
            .iter()
            .map(|d| d.path().to_path_buf())
            .collect()
    }

    /// Apply the current enablement settings.
    ///
    /// Enabled: start the polling task, or keep the running one if its
    /// interval still matches. Disabled: signal a running task to stop.
    /// Must be called from within a Tokio runtime.
    pub fn initialize(&self) {
        let config = WatcherConfig::from_store(&self.store);
        let mut task = lock(&self.task);

        if let Some(running) = task.as_ref() {
            if config.enabled
                && running.interval == config.poll_interval
                && !running.handle.is_finished()
            {
                debug!("File watcher already running");
                return;
            }
        }
        if let Some(previous) = task.take() {
            let _ = previous.shutdown.send(true);
        }

        if !config.enabled {
            info!("File watcher disabled via '{}'", WATCHER_ENABLED_KEY);
            return;
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run_poll_loop(
            Arc::clone(&self.descriptors),
            self.events.clone(),
            config.poll_interval,
            shutdown_rx,
        ));
        info!(
            "File watcher started (interval {} ms, {} path(s))",
            config.poll_interval.as_millis(),
            lock(&self.descriptors).len()
        );
        *task = Some(PollTask {
            shutdown: shutdown_tx,
            handle,
            interval: config.poll_interval,
        });
    }

    /// Stop the polling task and wait for an in-flight tick to finish.
    pub async fn destroy(&self) {
        let task = lock(&self.task).take();
        let Some(task) = task else {
            return;
        };
        let _ = task.shutdown.send(true);
        if let Err(e) = task.handle.await {
            warn!("File watcher task ended abnormally: {}", e);
        }
        info!("File watcher stopped");
    }

    pub fn is_up_and_running(&self) -> bool {
        lock(&self.task)
            .as_ref()
            .is_some_and(|task| !task.handle.is_finished())
    }

    /// Run a single polling tick on the caller's thread.
    ///
    /// Returns the changed paths in registration order; the same events are
    /// broadcast to subscribers.
    pub fn poll_once(&self) -> Vec<PathBuf> {
        poll_descriptors(&self.descriptors, &self.events)
    }
}

impl Drop for FileWatcherService {
    fn drop(&mut self) {
        if let Some(task) = lock(&self.task).take() {
            task.handle.abort();
        }
    }
}

async fn run_poll_loop(
    descriptors: Arc<Mutex<Vec<Descriptor>>>,
    events: broadcast::Sender<FileChangeEvent>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; the baseline was just taken.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                // Metadata and directory reads block, so the tick runs off the async workers.
                let (descriptors, events) = (Arc::clone(&descriptors), events.clone());
                let tick = tokio::task::spawn_blocking(move || {
                    poll_descriptors(&descriptors, &events);
                });
                if let Err(e) = tick.await {
                    warn!("File watcher tick failed: {}", e);
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    debug!("File watcher received shutdown");
                    return;
                }
            }
        }
    }
}

/// Check every descriptor once. I/O errors are logged and retried next tick.
fn poll_descriptors(
    descriptors: &Mutex<Vec<Descriptor>>,
    events: &broadcast::Sender<FileChangeEvent>,
) -> Vec<PathBuf> {
    let changed: Vec<PathBuf> = {
        let mut descriptors = lock(descriptors);
        let mut changed = Vec::new();
        for descriptor in descriptors.iter_mut() {
            match descriptor.check() {
                Ok(false) => {}
                Ok(true) => match descriptor.update() {
                    Ok(()) => changed.push(descriptor.path().to_path_buf()),
                    Err(e) => warn!(
                        "Cannot refresh {} after change, retrying next tick: {}",
                        descriptor.path().display(),
                        e
                    ),
                },
                Err(e) => warn!(
                    "Cannot check {}, retrying next tick: {}",
                    descriptor.path().display(),
                    e
                ),
            }
        }
        changed
    };

    for path in &changed {
        debug!("Change detected: {}", path.display());
        // No receivers is fine; nobody is listening yet.
        let _ = events.send(FileChangeEvent {
            path: path.clone(),
            detected_at: Utc::now(),
        });
    }
    changed
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
