//! Values derived from configuration that follow its changes.

use super::notifier::SubscriptionId;
use super::store::ValueStore;
use arc_swap::ArcSwap;
use std::collections::BTreeSet;
use std::sync::{Arc, Weak};
use tracing::debug;

/// A value computed from the store and recomputed whenever a published delta
/// touches one of its keys.
///
/// An empty key set means "recompute on every change". Readers get a cheap
/// `Arc` snapshot; a recomputation swaps the whole value at once. `derive`
/// runs twice during construction.
///
/// # Example
/// ```
/// use std::path::PathBuf;
/// use std::sync::Arc;
/// use portal_config::config::{Derived, Source, ValueStore};
///
/// let store = Arc::new(ValueStore::new());
/// store.register(Source::new("s", 100).with_property("portal.home", "/opt")).unwrap();
///
/// let templates = Derived::new(Arc::clone(&store), ["portal.home"], |store| {
///     let home = store.get("portal.home").ok().flatten().unwrap_or_default();
///     PathBuf::from(home).join("templates")
/// });
/// assert_eq!(*templates.get(), PathBuf::from("/opt/templates"));
///
/// store.register(Source::new("s", 100).with_property("portal.home", "/srv")).unwrap();
/// assert_eq!(*templates.get(), PathBuf::from("/srv/templates"));
/// ```
pub struct Derived<T> {
    value: Arc<ArcSwap<T>>,
    store: Weak<ValueStore>,
    subscription: SubscriptionId,
}

impl<T: Send + Sync + 'static> Derived<T> {
    pub fn new<K, F>(store: Arc<ValueStore>, keys: impl IntoIterator<Item = K>, derive: F) -> Self
    where
        K: Into<String>,
        F: Fn(&ValueStore) -> T + Send + Sync + 'static,
    {
        let keys: BTreeSet<String> = keys.into_iter().map(Into::into).collect();
        let derive = Arc::new(derive);
        let initial = Arc::new(derive(&*store));
        let value = Arc::new(ArcSwap::new(Arc::clone(&initial)));

        // The observer lives inside the store's notifier, so it must not keep
        // the store alive.
        let weak = Arc::downgrade(&store);
        let (target, rederive) = (Arc::clone(&value), Arc::clone(&derive));
        let subscription = store.notifier().subscribe(move |event| {
            if !keys.is_empty() && !event.touches(keys.iter().map(String::as_str)) {
                return;
            }
            if let Some(store) = weak.upgrade() {
                debug!("Re-deriving configuration value");
                target.store(Arc::new(rederive(&*store)));
            }
        });

        // A swap between the first derivation and the subscription is not seen
        // by the observer. Derive again unless the observer already has.
        let _ = value.compare_and_swap(&initial, Arc::new(derive(&*store)));

        Self {
            value,
            store: Arc::downgrade(&store),
            subscription,
        }
    }

    /// The current derived value.
    pub fn get(&self) -> Arc<T> {
        self.value.load_full()
    }
}

impl<T> Drop for Derived<T> {
    fn drop(&mut self) {
        if let Some(store) = self.store.upgrade() {
            store.notifier().unsubscribe(self.subscription);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Source;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_rederives_on_watched_key_only() {
        let store = Arc::new(ValueStore::new());
        store
            .register(
                Source::new("s", 100)
                    .with_property("watched", "1")
                    .with_property("other", "x"),
            )
            .unwrap();

        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        let derived = Derived::new(Arc::clone(&store), ["watched"], move |store| {
            counter.fetch_add(1, Ordering::SeqCst);
            store.resolve("watched").unwrap_or_default()
        });
        assert_eq!(*derived.get(), "1");
        let after_new = runs.load(Ordering::SeqCst);

        store
            .register(Source::new("o", 50).with_property("other", "y"))
            .unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), after_new);

        store
            .register(Source::new("hi", 200).with_property("watched", "2"))
            .unwrap();
        assert_eq!(*derived.get(), "2");
        assert_eq!(runs.load(Ordering::SeqCst), after_new + 1);
    }

    #[test]
    fn test_swap_during_construction_not_missed() {
        let store = Arc::new(ValueStore::new());
        store
            .register(Source::new("s", 100).with_property("k", "old"))
            .unwrap();

        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        let derived = Derived::new(Arc::clone(&store), ["k"], move |store| {
            let value = store.resolve("k").unwrap_or_default();
            // The first derivation races a writer before any observer exists.
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                store
                    .register(Source::new("late", 200).with_property("k", "new"))
                    .unwrap();
            }
            value
        });

        assert_eq!(*derived.get(), "new");
    }

    #[test]
    fn test_drop_unsubscribes() {
        let store = Arc::new(ValueStore::new());
        let derived = Derived::new(Arc::clone(&store), Vec::<String>::new(), |s| s.all_keys().len());
        assert_eq!(store.notifier().observer_count(), 1);
        drop(derived);
        assert_eq!(store.notifier().observer_count(), 0);
    }
}
