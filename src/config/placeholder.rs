//! Placeholder expansion for configuration values.
//!
//! A value may reference other keys as `${key}` or `${key:default}`. The
//! default may itself contain placeholders. Expansion recurses into both
//! referenced values and defaults, bounded by [`MAX_NESTING`].
//!
//! Matching rules:
//! - the key is everything after `${` up to the first `:` or `}` and must
//!   not be empty (so `${:x}` and `${}` are literal text);
//! - a default runs to the `}` that closes the placeholder, where every `${`
//!   inside the default must be closed first, so `${k1:${k2}crap}` has the
//!   default `${k2}crap`;
//! - if the default never balances, the first `}` after the `:` closes it;
//! - a `${` with no closing `}` at all stays literal.

use super::store::ValueStore;
use crate::error::{ConfigError, ConfigResult};
use regex_lite::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;
use tracing::warn;

/// Deepest allowed recursive expansion below the top-level value.
pub const MAX_NESTING: usize = 5;

static PLACEHOLDER_HINT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{[^}:][^}]*\}").expect("placeholder pattern is valid")
});

/// Returns true if `raw` contains at least one well-formed placeholder.
pub fn contains_placeholder(raw: &str) -> bool {
    PLACEHOLDER_HINT.is_match(raw)
}

/// One placeholder occurrence inside a raw value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placeholder<'a> {
    pub key: &'a str,
    pub default: Option<&'a str>,
    /// Byte range of the whole `${...}` text.
    pub start: usize,
    pub end: usize,
}

/// Find all top-level placeholders in `raw`, left to right, non-overlapping.
pub fn placeholders(raw: &str) -> Vec<Placeholder<'_>> {
    let bytes = raw.as_bytes();
    let mut found = Vec::new();
    let mut i = 0;
    while i + 1 < bytes.len() {
        if bytes[i] == b'$' && bytes[i + 1] == b'{' {
            if let Some(placeholder) = parse_at(raw, i) {
                i = placeholder.end;
                found.push(placeholder);
                continue;
            }
        }
        i += 1;
    }
    found
}

/// Parse a placeholder whose `${` starts at `start`.
fn parse_at(raw: &str, start: usize) -> Option<Placeholder<'_>> {
    let bytes = raw.as_bytes();
    let key_start = start + 2;
    let key_end = key_start + bytes[key_start..].iter().position(|b| *b == b'}' || *b == b':')?;
    if key_end == key_start {
        return None;
    }
    let key = &raw[key_start..key_end];

    if bytes[key_end] == b'}' {
        return Some(Placeholder {
            key,
            default: None,
            start,
            end: key_end + 1,
        });
    }

    let default_start = key_end + 1;
    let close = balanced_close(bytes, default_start)
        .or_else(|| bytes[default_start..].iter().position(|b| *b == b'}').map(|p| default_start + p))?;
    Some(Placeholder {
        key,
        default: Some(&raw[default_start..close]),
        start,
        end: close + 1,
    })
}

/// Index of the `}` closing a default that starts at `from`, honoring nested `${`.
fn balanced_close(bytes: &[u8], from: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut k = from;
    while k < bytes.len() {
        if bytes[k] == b'$' && bytes.get(k + 1) == Some(&b'{') {
            depth += 1;
            k += 2;
            continue;
        }
        if bytes[k] == b'}' {
            if depth == 0 {
                return Some(k);
            }
            depth -= 1;
        }
        k += 1;
    }
    None
}

/// Expands placeholders against a [`ValueStore`].
#[derive(Clone, Copy)]
pub struct PlaceholderResolver<'a> {
    store: &'a ValueStore,
}

impl<'a> PlaceholderResolver<'a> {
    pub fn new(store: &'a ValueStore) -> Self {
        Self { store }
    }

    /// Expand every placeholder in `raw`.
    ///
    /// Unresolvable placeholders without a default are kept as literal text
    /// and logged. With `throw_on_missing` they instead produce
    /// [`ConfigError::MissingKey`].
    pub fn expand(&self, raw: &str, throw_on_missing: bool) -> ConfigResult<String> {
        if raw.is_empty() || !contains_placeholder(raw) {
            return Ok(raw.to_string());
        }

        let mut missing = BTreeSet::new();
        let expanded = self.expand_at(raw, 0, &mut missing)?;

        if !missing.is_empty() {
            let keys: Vec<String> = missing.into_iter().collect();
            warn!(
                "Unresolved configuration placeholder(s) in '{}': {}",
                raw,
                keys.join(", ")
            );
            if throw_on_missing {
                return Err(ConfigError::MissingKey { keys });
            }
        }
        Ok(expanded)
    }

    fn expand_at(
        &self,
        raw: &str,
        depth: usize,
        missing: &mut BTreeSet<String>,
    ) -> ConfigResult<String> {
        let mut out = String::with_capacity(raw.len());
        let mut cursor = 0;

        for placeholder in placeholders(raw) {
            out.push_str(&raw[cursor..placeholder.start]);
            let replacement = match (self.store.resolve(placeholder.key), placeholder.default) {
                (Some(value), _) => self.descend(placeholder.key, &value, depth, missing)?,
                (None, Some(default)) => self.descend(placeholder.key, default, depth, missing)?,
                (None, None) => {
                    missing.insert(placeholder.key.to_string());
                    raw[placeholder.start..placeholder.end].to_string()
                }
            };
            out.push_str(&replacement);
            cursor = placeholder.end;
        }

        out.push_str(&raw[cursor..]);
        Ok(out)
    }

    fn descend(
        &self,
        key: &str,
        text: &str,
        depth: usize,
        missing: &mut BTreeSet<String>,
    ) -> ConfigResult<String> {
        if depth + 1 > MAX_NESTING {
            return Err(ConfigError::NestingTooDeep {
                key: key.to_string(),
                limit: MAX_NESTING,
            });
        }
        self.expand_at(text, depth + 1, missing)
    }
}

impl ValueStore {
    pub fn resolver(&self) -> PlaceholderResolver<'_> {
        PlaceholderResolver::new(self)
    }

    /// Resolve `key` and expand its placeholders.
    ///
    /// An absent key is `Ok(None)` unless `strict`, in which case it is a
    /// [`ConfigError::MissingKey`] like any unresolved placeholder.
    pub fn resolve_expanded(&self, key: &str, strict: bool) -> ConfigResult<Option<String>> {
        match self.resolve(key) {
            Some(raw) => self.resolver().expand(&raw, strict).map(Some),
            None if strict => Err(ConfigError::missing([key])),
            None => Ok(None),
        }
    }

    /// Lenient lookup: expanded value, unresolved placeholders kept literal.
    pub fn get(&self, key: &str) -> ConfigResult<Option<String>> {
        self.resolve_expanded(key, false)
    }

    /// Strict lookup: the key and every placeholder it references must resolve.
    pub fn get_required(&self, key: &str) -> ConfigResult<String> {
        self.resolve_expanded(key, true)
            .map(|value| value.unwrap_or_default())
    }
}
