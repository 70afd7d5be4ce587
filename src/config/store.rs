//! The value store: registered sources and their merged view.
//!
//! Readers load the current source list through an `ArcSwap`, so `resolve`
//! never takes a lock and always sees either the list before or after a
//! writer's swap. Writers serialize on a mutex, build a new sorted list,
//! swap it in, and queue the difference between the old and new merged
//! views. Queued deltas are delivered in swap order by whichever writer is
//! not already delivering, outside every lock, so observers may read from or
//! write back into the store.

use super::merge::{lookup, merge_sources, precedence};
use super::notifier::{ChangeNotifier, compute_delta};
use super::source::Source;
use crate::error::{ConfigError, ConfigResult};
use arc_swap::ArcSwap;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

/// Prioritized collection of configuration sources.
pub struct ValueStore {
    /// Sources in precedence order (highest ordinal first).
    sources: ArcSwap<Vec<Arc<Source>>>,
    /// Serializes writers; readers never touch it.
    write_lock: Mutex<()>,
    /// Deltas waiting for delivery, in swap order.
    pending: Mutex<PendingDeltas>,
    notifier: ChangeNotifier,
}

#[derive(Default)]
struct PendingDeltas {
    queue: VecDeque<BTreeMap<String, String>>,
    delivering: bool,
}

impl ValueStore {
    pub fn new() -> Self {
        Self {
            sources: ArcSwap::from_pointee(Vec::new()),
            write_lock: Mutex::new(()),
            pending: Mutex::new(PendingDeltas::default()),
            notifier: ChangeNotifier::new(),
        }
    }

    /// Register a source, replacing any source with the same name.
    pub fn register(&self, source: Source) -> ConfigResult<()> {
        self.register_all(std::iter::once(source))
    }

    /// Register several sources under one swap and one published delta.
    pub fn register_all(&self, sources: impl IntoIterator<Item = Source>) -> ConfigResult<()> {
        let mut incoming: Vec<Source> = Vec::new();
        for source in sources {
            if source.name().trim().is_empty() {
                return Err(ConfigError::invalid_source("source name must not be empty"));
            }
            // Within one batch the last source with a given name wins.
            incoming.retain(|s| s.name() != source.name());
            incoming.push(source);
        }
        if incoming.is_empty() {
            return Ok(());
        }

        self.swap(|current| {
            let names: BTreeSet<&str> = incoming.iter().map(Source::name).collect();
            let mut next: Vec<Arc<Source>> = current
                .iter()
                .filter(|s| !names.contains(s.name()))
                .cloned()
                .collect();
            for source in &incoming {
                if current.iter().any(|s| s.name() == source.name()) {
                    debug!("Replacing configuration source '{}'", source.name());
                } else {
                    info!(
                        "Registered configuration source '{}' (ordinal {}, {} key(s))",
                        source.name(),
                        source.ordinal(),
                        source.len()
                    );
                }
            }
            next.extend(incoming.iter().cloned().map(Arc::new));
            next
        });
        Ok(())
    }

    /// Remove a source by name. Returns `true` if it was registered.
    pub fn unregister(&self, name: &str) -> bool {
        let mut removed = false;
        self.swap(|current| {
            let next: Vec<Arc<Source>> = current
                .iter()
                .filter(|s| s.name() != name)
                .cloned()
                .collect();
            removed = next.len() != current.len();
            next
        });
        if removed {
            info!("Unregistered configuration source '{}'", name);
        }
        removed
    }

    /// Effective raw value for `key`. A tombstoned key is `None`.
    pub fn resolve(&self, key: &str) -> Option<String> {
        self.resolve_raw(key).filter(|v| !v.is_empty())
    }

    /// Effective raw value for `key`, exposing a tombstone as `Some("")`.
    pub fn resolve_raw(&self, key: &str) -> Option<String> {
        let sources = self.sources.load();
        lookup(&sources, key).map(str::to_string)
    }

    /// Returns true if `key` has a non-tombstoned value.
    pub fn contains(&self, key: &str) -> bool {
        self.resolve(key).is_some()
    }

    /// Every key with a non-tombstoned value.
    pub fn all_keys(&self) -> BTreeSet<String> {
        self.snapshot().into_keys().collect()
    }

    /// The merged view with tombstoned keys excluded.
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        merge_sources(&self.sources.load())
    }

    /// Registered sources in precedence order.
    pub fn sources(&self) -> Vec<Arc<Source>> {
        self.sources.load().iter().cloned().collect()
    }

    pub fn source(&self, name: &str) -> Option<Arc<Source>> {
        self.sources
            .load()
            .iter()
            .find(|s| s.name() == name)
            .cloned()
    }

    /// Observers of this store's deltas.
    pub fn notifier(&self) -> &ChangeNotifier {
        &self.notifier
    }

    /// Replace the source list and publish the resulting delta.
    fn swap<F>(&self, build: F)
    where
        F: FnOnce(&[Arc<Source>]) -> Vec<Arc<Source>>,
    {
        {
            let _guard = lock(&self.write_lock);
            let current = self.sources.load_full();
            let mut next = build(&current);
            next.sort_by(|a, b| precedence(a, b));

            let before = merge_sources(&current);
            let after = merge_sources(&next);
            self.sources.store(Arc::new(next));
            let delta = compute_delta(&before, &after);
            // Queued while the write lock is held, so queue order is swap order.
            if !delta.is_empty() {
                lock(&self.pending).queue.push_back(delta);
            }
        }
        self.deliver_pending();
    }

    /// Deliver queued deltas unless another call is already doing so; that
    /// call picks up whatever was queued here.
    fn deliver_pending(&self) {
        {
            let mut pending = lock(&self.pending);
            if pending.delivering {
                return;
            }
            pending.delivering = true;
        }
        let _unwind = DeliveryGuard(&self.pending);
        loop {
            let delta = {
                let mut pending = lock(&self.pending);
                match pending.queue.pop_front() {
                    Some(delta) => delta,
                    None => {
                        // Cleared together with the empty check so no queued delta is left behind.
                        pending.delivering = false;
                        return;
                    }
                }
            };
            self.notifier.publish(delta);
        }
    }
}

/// Releases delivery when an observer panics mid-publish.
struct DeliveryGuard<'a>(&'a Mutex<PendingDeltas>);

impl Drop for DeliveryGuard<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            lock(self.0).delivering = false;
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Default for ValueStore {
    fn default() -> Self {
        Self::new()
    }
}
