//! Merged view over prioritized sources.
//!
//! Implements key-by-key layering where higher ordinal values override lower
//! ones. An empty string is a tombstone: it hides every lower value for that
//! key and is itself excluded from the merged result.

use super::source::Source;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Precedence order: descending ordinal, then ascending name.
pub fn precedence(a: &Source, b: &Source) -> Ordering {
    b.ordinal()
        .cmp(&a.ordinal())
        .then_with(|| a.name().cmp(b.name()))
}

/// Find the winning raw value for `key`, tombstones included.
///
/// `sources` must already be in precedence order.
pub fn lookup<'a>(sources: &'a [Arc<Source>], key: &str) -> Option<&'a str> {
    sources.iter().find_map(|source| source.get(key))
}

/// Merge sources into a single map, with earlier (higher precedence) sources
/// winning and tombstoned keys removed.
///
/// `sources` must already be in precedence order.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use portal_config::config::{Source, merge_sources};
///
/// let high = Arc::new(Source::new("high", 200).with_property("a", "2").with_property("b", ""));
/// let low = Arc::new(Source::new("low", 100).with_property("a", "1").with_property("b", "x"));
/// let merged = merge_sources(&[high, low]);
/// assert_eq!(merged.get("a").map(String::as_str), Some("2"));
/// assert!(!merged.contains_key("b"));
/// ```
pub fn merge_sources(sources: &[Arc<Source>]) -> BTreeMap<String, String> {
    let mut decided: BTreeMap<&str, &str> = BTreeMap::new();
    for source in sources {
        for (key, value) in source.properties() {
            decided.entry(key.as_str()).or_insert(value.as_str());
        }
    }
    decided
        .into_iter()
        .filter(|(_, value)| !value.is_empty())
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
