//! Change notification for configuration observers.
//!
//! Observers register a callback and receive every non-empty delta published
//! after a source swap. Delivery is synchronous and in subscription order, so
//! an observer sees the new merged view as soon as its callback runs.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Keys whose effective value changed. A removed key maps to `""`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    delta: BTreeMap<String, String>,
}

impl ChangeEvent {
    pub fn delta(&self) -> &BTreeMap<String, String> {
        &self.delta
    }

    /// Returns true if any of the given keys changed.
    pub fn touches<'a>(&self, keys: impl IntoIterator<Item = &'a str>) -> bool {
        keys.into_iter().any(|k| self.delta.contains_key(k))
    }

    /// Keys that were removed (tombstoned or no longer defined).
    pub fn removed_keys(&self) -> impl Iterator<Item = &str> {
        self.delta
            .iter()
            .filter(|(_, v)| v.is_empty())
            .map(|(k, _)| k.as_str())
    }
}

/// Handle identifying one registered observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Observer = Arc<dyn Fn(&ChangeEvent) + Send + Sync>;

/// Callback registry for configuration deltas.
///
/// Thread-safe: uses an internal `Mutex` so it can be shared without requiring
/// `&mut self`. Callbacks are invoked outside the lock, so an observer may
/// subscribe or unsubscribe from within its own callback.
pub struct ChangeNotifier {
    observers: Mutex<Vec<(SubscriptionId, Observer)>>,
    next_id: Mutex<u64>,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self {
            observers: Mutex::new(Vec::new()),
            next_id: Mutex::new(0),
        }
    }

    /// Register an observer.
    pub fn subscribe<F>(&self, observer: F) -> SubscriptionId
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        let id = {
            let mut next = lock(&self.next_id);
            *next += 1;
            SubscriptionId(*next)
        };
        lock(&self.observers).push((id, Arc::new(observer)));
        id
    }

    /// Remove an observer. Returns `true` if it was registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut observers = lock(&self.observers);
        let before = observers.len();
        observers.retain(|(existing, _)| *existing != id);
        observers.len() != before
    }

    pub fn observer_count(&self) -> usize {
        lock(&self.observers).len()
    }

    /// Deliver a delta to every observer. An empty delta is dropped.
    pub fn publish(&self, delta: BTreeMap<String, String>) {
        if delta.is_empty() {
            return;
        }
        let event = ChangeEvent { delta };
        let observers: Vec<Observer> = lock(&self.observers)
            .iter()
            .map(|(_, o)| Arc::clone(o))
            .collect();
        debug!(
            "Publishing configuration delta ({} key(s)) to {} observer(s)",
            event.delta.len(),
            observers.len()
        );
        for observer in observers {
            observer(&event);
        }
    }
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Diff two merged views.
///
/// Added and changed keys map to their new value; keys present only in `old`
/// map to `""`.
pub fn compute_delta(
    old: &BTreeMap<String, String>,
    new: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut delta = BTreeMap::new();
    for (key, value) in new {
        if old.get(key) != Some(value) {
            delta.insert(key.clone(), value.clone());
        }
    }
    for key in old.keys() {
        if !new.contains_key(key) {
            delta.insert(key.clone(), String::new());
        }
    }
    delta
}

// A panicking observer must not wedge the notifier for everyone else.
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_subscribe_unsubscribe() {
        let notifier = ChangeNotifier::new();
        assert_eq!(notifier.observer_count(), 0);

        let id = notifier.subscribe(|_| {});
        assert_eq!(notifier.observer_count(), 1);

        assert!(notifier.unsubscribe(id));
        assert_eq!(notifier.observer_count(), 0);

        // Unsubscribe missing returns false
        assert!(!notifier.unsubscribe(id));
    }

    #[test]
    fn test_publish_reaches_all_observers() {
        let notifier = ChangeNotifier::new();
        let hits = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let hits = Arc::clone(&hits);
            notifier.subscribe(move |event| {
                assert_eq!(event.delta().get("a").map(String::as_str), Some("1"));
                hits.fetch_add(1, Ordering::SeqCst);
            });
        }

        notifier.publish(map(&[("a", "1")]));
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_empty_delta_never_fires() {
        let notifier = ChangeNotifier::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        notifier.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        notifier.publish(BTreeMap::new());
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_compute_delta() {
        let old = map(&[("same", "x"), ("changed", "1"), ("gone", "y")]);
        let new = map(&[("same", "x"), ("changed", "2"), ("added", "z")]);

        let delta = compute_delta(&old, &new);
        assert_eq!(delta, map(&[("changed", "2"), ("added", "z"), ("gone", "")]));
    }

    #[test]
    fn test_removed_keys() {
        let notifier = ChangeNotifier::new();
        let removed = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&removed);
        notifier.subscribe(move |event| {
            sink.lock()
                .unwrap()
                .extend(event.removed_keys().map(str::to_string));
        });

        notifier.publish(map(&[("kept", "v"), ("dropped", "")]));
        assert_eq!(*removed.lock().unwrap(), vec!["dropped".to_string()]);
    }
}
