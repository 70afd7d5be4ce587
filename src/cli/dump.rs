//! Dump subcommand for portal-config CLI
//!
//! Renders the merged view of all sources.

use clap::Args;
use std::collections::BTreeMap;

/// Arguments for the dump subcommand
#[derive(Args, Debug)]
pub struct DumpArgs {
    /// Output format: properties (default), json, or yaml
    #[arg(short, long, default_value = "properties", value_name = "FORMAT")]
    pub format: DumpFormat,

    /// Expand placeholders before printing
    #[arg(long)]
    pub expand: bool,

    /// Only show keys starting with this prefix
    #[arg(long, value_name = "PREFIX")]
    pub prefix: Option<String>,
}

/// Output format for dump results
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DumpFormat {
    #[default]
    Properties,
    Json,
    Yaml,
}

impl std::str::FromStr for DumpFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "properties" => Ok(DumpFormat::Properties),
            "json" => Ok(DumpFormat::Json),
            "yaml" | "yml" => Ok(DumpFormat::Yaml),
            _ => Err(format!(
                "Invalid format '{}'. Valid options: properties, json, yaml",
                s
            )),
        }
    }
}

/// Render a flat map in the requested format.
pub fn render(values: &BTreeMap<String, String>, format: DumpFormat) -> anyhow::Result<String> {
    Ok(match format {
        DumpFormat::Properties => values
            .iter()
            .map(|(k, v)| format!("{}={}\n", k, escape_property(v)))
            .collect(),
        DumpFormat::Json => serde_json::to_string_pretty(values)? + "\n",
        DumpFormat::Yaml => serde_yaml::to_string(values)?,
    })
}

fn escape_property(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
        .replace('\t', "\\t")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> BTreeMap<String, String> {
        [("a.b", "1"), ("multi", "x\ny")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("JSON".parse::<DumpFormat>().unwrap(), DumpFormat::Json);
        assert_eq!("yml".parse::<DumpFormat>().unwrap(), DumpFormat::Yaml);
        assert!("xml".parse::<DumpFormat>().is_err());
    }

    #[test]
    fn test_render_properties_round_trips_through_parser() {
        let out = render(&sample(), DumpFormat::Properties).unwrap();
        assert_eq!(out, "a.b=1\nmulti=x\\ny\n");
        let parsed = crate::config::parse_properties(&out, "dump").unwrap();
        assert_eq!(parsed, sample());
    }

    #[test]
    fn test_render_json() {
        let out = render(&sample(), DumpFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["a.b"], "1");
    }
}
