//! CLI command definitions for portal-config
//!
//! This module defines the CLI structure using clap's derive macros.
//! The main entry point is the `Cli` struct which contains subcommands.

pub mod dump;

use clap::{Args, Parser, Subcommand};
use dump::DumpArgs;
use std::path::PathBuf;

/// Portal configuration inspector and hot-reload runner
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Installation directory (overrides PORTAL_CONFIG_DIR)
    #[arg(short, long, global = true, value_name = "DIR")]
    pub config_dir: Option<PathBuf>,

    /// Extra configuration file loaded as an assembly override (repeatable)
    #[arg(short, long = "file", global = true, value_name = "FILE")]
    pub files: Vec<PathBuf>,

    /// Runtime override as KEY=VALUE; an empty VALUE deletes the key (repeatable)
    #[arg(short = 's', long = "set", global = true, value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub overrides: Vec<(String, String)>,

    /// Only include environment variables starting with this prefix
    #[arg(long, global = true, default_value = "")]
    pub env_prefix: String,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Logging output: 0/off, 1/stdout, 2/stderr (default), or filename
    #[arg(short, long, default_value = "2", global = true)]
    pub log: String,

    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the expanded value of one key
    Get(GetArgs),

    /// Print the merged view of every key
    Dump(DumpArgs),

    /// Watch configuration files and print every change as JSON
    Watch,
}

/// Arguments for the get subcommand
#[derive(Args, Debug)]
pub struct GetArgs {
    /// Configuration key
    #[arg(value_name = "KEY")]
    pub key: String,

    /// Fail if the key or any placeholder it references cannot be resolved
    #[arg(long)]
    pub strict: bool,

    /// Print the raw value without placeholder expansion
    #[arg(long, conflicts_with = "strict")]
    pub raw: bool,
}

/// Parse a `KEY=VALUE` pair. The value may be empty.
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("Invalid override '{}'. Expected KEY=VALUE", s)),
    }
}
