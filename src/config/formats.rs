//! Parsers for file-backed sources.
//!
//! Both formats produce a flat `key -> value` map:
//! - `.properties`: classic `key=value` lines
//! - `.yml` / `.yaml`: nested mappings flattened to dotted keys, sequences
//!   to indexed keys (`servers[0].host`)

use crate::error::{ConfigError, ConfigResult};
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::path::Path;

/// Supported file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Properties,
    Yaml,
}

impl FileFormat {
    /// Detect the format from a file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("properties") => Some(FileFormat::Properties),
            Some("yml") | Some("yaml") => Some(FileFormat::Yaml),
            _ => None,
        }
    }

    /// Parse `content`. `source_name` is attached to any parse error.
    pub fn parse(self, content: &str, source_name: &str) -> ConfigResult<BTreeMap<String, String>> {
        match self {
            FileFormat::Properties => parse_properties(content, source_name),
            FileFormat::Yaml => parse_yaml(content, source_name),
        }
    }
}

/// Parse `.properties` content.
pub fn parse_properties(content: &str, source_name: &str) -> ConfigResult<BTreeMap<String, String>> {
    let mut properties = BTreeMap::new();
    let mut lines = content.lines().enumerate();

    while let Some((index, line)) = lines.next() {
        let trimmed = line.trim_start();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('!') {
            continue;
        }

        // Join continuation lines (odd number of trailing backslashes).
        let mut logical = trimmed.to_string();
        while ends_with_continuation(&logical) {
            logical.pop();
            match lines.next() {
                Some((_, next)) => logical.push_str(next.trim_start()),
                None => break,
            }
        }

        let (raw_key, raw_value) = split_key_value(&logical);
        let key = unescape(raw_key).map_err(|message| {
            ConfigError::malformed(source_name, format!("line {}: {}", index + 1, message))
        })?;
        let value = unescape(raw_value).map_err(|message| {
            ConfigError::malformed(source_name, format!("line {}: {}", index + 1, message))
        })?;
        properties.insert(key, value);
    }

    Ok(properties)
}

fn ends_with_continuation(line: &str) -> bool {
    line.chars().rev().take_while(|c| *c == '\\').count() % 2 == 1
}

/// Split at the first unescaped `=`, `:` or whitespace.
fn split_key_value(line: &str) -> (&str, &str) {
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '=' | ':' => return (&line[..i], line[i + 1..].trim_start()),
            c if c.is_whitespace() => {
                let rest = line[i..].trim_start();
                let rest = rest
                    .strip_prefix('=')
                    .or_else(|| rest.strip_prefix(':'))
                    .unwrap_or(rest);
                return (&line[..i], rest.trim_start());
            }
            _ => {}
        }
    }
    (line, "")
}

fn unescape(raw: &str) -> Result<String, String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('f') => out.push('\u{c}'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                let code = u32::from_str_radix(&hex, 16)
                    .ok()
                    .filter(|_| hex.len() == 4)
                    .and_then(char::from_u32)
                    .ok_or_else(|| format!("invalid unicode escape '\\u{}'", hex))?;
                out.push(code);
            }
            Some(other) => out.push(other),
            None => {}
        }
    }
    Ok(out)
}

/// Parse YAML content into flattened properties.
pub fn parse_yaml(content: &str, source_name: &str) -> ConfigResult<BTreeMap<String, String>> {
    let mut properties = BTreeMap::new();
    if content.trim().is_empty() {
        return Ok(properties);
    }

    let document: Value =
        serde_yaml::from_str(content).map_err(|e| ConfigError::malformed(source_name, e))?;
    match document {
        Value::Null => {}
        Value::Mapping(_) => flatten(&document, String::new(), &mut properties),
        _ => {
            return Err(ConfigError::malformed(
                source_name,
                "top-level YAML value must be a mapping",
            ));
        }
    }
    Ok(properties)
}

fn flatten(value: &Value, prefix: String, out: &mut BTreeMap<String, String>) {
    match value {
        Value::Mapping(map) => {
            for (key, child) in map {
                let key = scalar_to_string(key).unwrap_or_default();
                let path = if prefix.is_empty() {
                    key
                } else {
                    format!("{}.{}", prefix, key)
                };
                flatten(child, path, out);
            }
        }
        Value::Sequence(items) => {
            for (index, child) in items.iter().enumerate() {
                flatten(child, format!("{}[{}]", prefix, index), out);
            }
        }
        Value::Tagged(tagged) => flatten(&tagged.value, prefix, out),
        scalar => {
            out.insert(prefix, scalar_to_string(scalar).unwrap_or_default());
        }
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => Some(String::new()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        Value::Tagged(tagged) => scalar_to_string(&tagged.value),
        Value::Sequence(_) | Value::Mapping(_) => None,
    }
}
