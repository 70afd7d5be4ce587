//! Typed accessors over expanded configuration values.

use super::store::ValueStore;
use crate::error::{ConfigError, ConfigResult};
use std::time::Duration;

/// Settings for an in-memory cache, read from a key prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// Time after which an entry expires.
    pub expiration: Duration,
    /// Maximum number of entries.
    pub size: u64,
    /// Whether hit/miss statistics are recorded.
    pub record_statistics: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            expiration: Duration::from_secs(10 * 60),
            size: 100,
            record_statistics: false,
        }
    }
}

impl ValueStore {
    /// Split the expanded value on `separator`, trimming items and dropping
    /// empty ones. An absent key yields an empty list.
    pub fn resolve_as_list(&self, key: &str, separator: char) -> ConfigResult<Vec<String>> {
        Ok(self
            .get(key)?
            .map(|value| {
                value
                    .split(separator)
                    .map(str::trim)
                    .filter(|item| !item.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default())
    }

    pub fn resolve_as_bool(&self, key: &str) -> ConfigResult<Option<bool>> {
        let Some(value) = self.get(key)? else {
            return Ok(None);
        };
        match value.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Ok(Some(true)),
            "false" | "no" | "off" | "0" => Ok(Some(false)),
            _ => Err(ConfigError::invalid_value(key, &value, "a boolean")),
        }
    }

    pub fn resolve_as_int(&self, key: &str) -> ConfigResult<Option<i64>> {
        let Some(value) = self.get(key)? else {
            return Ok(None);
        };
        value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::invalid_value(key, &value, "an integer"))
    }

    /// Read `<prefix>.expiration`, `<prefix>.expiration.unit`, `<prefix>.size`
    /// and `<prefix>.record_statistics`, falling back to `defaults` per field.
    ///
    /// The unit defaults to minutes when only the amount is given.
    pub fn resolve_as_cache_config(
        &self,
        prefix: &str,
        defaults: &CacheConfig,
    ) -> ConfigResult<CacheConfig> {
        let amount_key = format!("{}.expiration", prefix);
        let unit_key = format!("{}.expiration.unit", prefix);

        let expiration = match self.resolve_as_int(&amount_key)? {
            Some(amount) => {
                let amount = u64::try_from(amount).map_err(|_| {
                    ConfigError::invalid_value(&amount_key, &amount.to_string(), "a non-negative integer")
                })?;
                let unit = self.get(&unit_key)?.unwrap_or_else(|| "minutes".to_string());
                duration_in(amount, &unit)
                    .ok_or_else(|| ConfigError::invalid_value(&unit_key, &unit, "a time unit"))?
            }
            None => defaults.expiration,
        };

        let size_key = format!("{}.size", prefix);
        let size = match self.resolve_as_int(&size_key)? {
            Some(size) => u64::try_from(size).map_err(|_| {
                ConfigError::invalid_value(&size_key, &size.to_string(), "a non-negative integer")
            })?,
            None => defaults.size,
        };

        let record_statistics = self
            .resolve_as_bool(&format!("{}.record_statistics", prefix))?
            .unwrap_or(defaults.record_statistics);

        Ok(CacheConfig {
            expiration,
            size,
            record_statistics,
        })
    }
}

fn duration_in(amount: u64, unit: &str) -> Option<Duration> {
    let seconds_per = match unit.trim().to_ascii_lowercase().as_str() {
        "ms" | "millis" | "milliseconds" => return Some(Duration::from_millis(amount)),
        "s" | "seconds" => 1,
        "m" | "minutes" => 60,
        "h" | "hours" => 60 * 60,
        "d" | "days" => 24 * 60 * 60,
        _ => return None,
    };
    Some(Duration::from_secs(amount.saturating_mul(seconds_per)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Source;

    fn store_with(pairs: &[(&str, &str)]) -> ValueStore {
        let store = ValueStore::new();
        store
            .register(Source::new("test", 100).with_properties(pairs.iter().copied()))
            .unwrap();
        store
    }

    #[test]
    fn test_list() {
        let store = store_with(&[("langs", " de, en ,,fr "), ("sep", "a;${x:b}")]);
        assert_eq!(store.resolve_as_list("langs", ',').unwrap(), vec!["de", "en", "fr"]);
        assert_eq!(store.resolve_as_list("sep", ';').unwrap(), vec!["a", "b"]);
        assert!(store.resolve_as_list("absent", ',').unwrap().is_empty());
    }

    #[test]
    fn test_bool() {
        let store = store_with(&[("a", "YES"), ("b", "off"), ("c", "maybe")]);
        assert_eq!(store.resolve_as_bool("a").unwrap(), Some(true));
        assert_eq!(store.resolve_as_bool("b").unwrap(), Some(false));
        assert_eq!(store.resolve_as_bool("absent").unwrap(), None);
        assert!(matches!(
            store.resolve_as_bool("c"),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_int() {
        let store = store_with(&[("n", " 42 "), ("bad", "4x")]);
        assert_eq!(store.resolve_as_int("n").unwrap(), Some(42));
        assert!(store.resolve_as_int("bad").is_err());
    }

    #[test]
    fn test_cache_config_defaults() {
        let store = store_with(&[]);
        let config = store
            .resolve_as_cache_config("portal.cache.users", &CacheConfig::default())
            .unwrap();
        assert_eq!(config, CacheConfig::default());
    }

    #[test]
    fn test_cache_config_overrides() {
        let store = store_with(&[
            ("portal.cache.users.expiration", "30"),
            ("portal.cache.users.expiration.unit", "seconds"),
            ("portal.cache.users.size", "500"),
            ("portal.cache.users.record_statistics", "true"),
        ]);
        let config = store
            .resolve_as_cache_config("portal.cache.users", &CacheConfig::default())
            .unwrap();
        assert_eq!(config.expiration, Duration::from_secs(30));
        assert_eq!(config.size, 500);
        assert!(config.record_statistics);
    }

    #[test]
    fn test_cache_config_bad_unit() {
        let store = store_with(&[
            ("c.expiration", "3"),
            ("c.expiration.unit", "fortnights"),
        ]);
        assert!(matches!(
            store.resolve_as_cache_config("c", &CacheConfig::default()),
            Err(ConfigError::InvalidValue { .. })
        ));
    }
}
