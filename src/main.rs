//! Portal configuration CLI
//!
//! Loads the layered configuration the same way a portal application does
//! and lets you inspect it or follow its hot reloads.

use anyhow::{Result, bail};
use clap::Parser;
use portal_config::cli::dump::{DumpArgs, render};
use portal_config::cli::{Cli, Command, GetArgs};
use portal_config::config::watcher::{WATCHER_ENABLED_KEY, WATCHER_INTERVAL_KEY};
use portal_config::config::{
    ConfigLoader, ConfigPaths, FileWatcherService, LoadedSources, SourceReloader, ValueStore,
};
use serde_json::json;
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::sync::Arc;
use tracing::{Level, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on --log option
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    match cli.log.as_str() {
        "0" | "off" => {
            // No logging
        }
        "1" | "stdout" => {
            let subscriber = FmtSubscriber::builder()
                .with_max_level(level)
                .with_writer(std::io::stdout)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
        "2" | "stderr" => {
            let subscriber = FmtSubscriber::builder()
                .with_max_level(level)
                .with_writer(std::io::stderr)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
        filename => {
            // Log to file (append mode)
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(filename)?;
            let subscriber = FmtSubscriber::builder()
                .with_max_level(level)
                .with_writer(file)
                .with_ansi(false)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
    }

    let store = Arc::new(ValueStore::new());
    let loaded = load_sources(&cli, &store)?;

    match cli.command {
        Command::Get(args) => run_get(&store, &args),
        Command::Dump(args) => run_dump(&store, &args),
        Command::Watch => run_watch(store, loaded).await,
    }
}

/// Build the source stack from the command line and environment.
fn load_sources(cli: &Cli, store: &ValueStore) -> Result<LoadedSources> {
    let mut paths = ConfigPaths::discover();
    if let Some(ref dir) = cli.config_dir {
        paths.installation_dir = Some(dir.clone());
    }

    let mut loader = ConfigLoader::new(paths)
        .with_defaults([(WATCHER_ENABLED_KEY, "true"), (WATCHER_INTERVAL_KEY, "1000")])
        .with_environment(cli.env_prefix.clone());
    for file in &cli.files {
        loader = loader.with_assembly_file(file, false);
    }
    for (key, value) in &cli.overrides {
        loader = loader.with_override(key, value);
    }

    let loaded = loader.load(store)?;
    info!(
        "Loaded {} source(s), {} key(s)",
        store.sources().len(),
        store.all_keys().len()
    );
    Ok(loaded)
}

fn run_get(store: &ValueStore, args: &GetArgs) -> Result<()> {
    let value = if args.raw {
        store.resolve_raw(&args.key)
    } else if args.strict {
        Some(store.get_required(&args.key)?)
    } else {
        store.get(&args.key)?
    };

    match value {
        Some(value) if !value.is_empty() => {
            println!("{}", value);
            Ok(())
        }
        Some(_) => bail!("Key '{}' is deleted by an empty value", args.key),
        None => bail!("Key '{}' is not set", args.key),
    }
}

fn run_dump(store: &ValueStore, args: &DumpArgs) -> Result<()> {
    let prefix = args.prefix.as_deref().unwrap_or("");
    let mut values = BTreeMap::new();
    for (key, raw) in store.snapshot() {
        if !key.starts_with(prefix) {
            continue;
        }
        let value = if args.expand {
            store.resolver().expand(&raw, false)?
        } else {
            raw
        };
        values.insert(key, value);
    }
    print!("{}", render(&values, args.format)?);
    Ok(())
}

/// Run the hot-reload loop until interrupted, printing each delta as JSON.
async fn run_watch(store: Arc<ValueStore>, loaded: LoadedSources) -> Result<()> {
    let watcher = Arc::new(FileWatcherService::new(Arc::clone(&store)));
    watcher.register(loaded.watch_paths());

    let reloader = Arc::new(
        SourceReloader::new(Arc::clone(&store), loaded).with_watcher(Arc::clone(&watcher)),
    );
    let reload_task = reloader.spawn(watcher.subscribe());

    store.notifier().subscribe(|event| {
        println!("{}", json!({ "changed": event.delta() }));
    });

    watcher.initialize();
    if !watcher.is_up_and_running() {
        warn!(
            "File watcher is disabled ('{}'); nothing to watch",
            WATCHER_ENABLED_KEY
        );
        return Ok(());
    }
    info!(
        "Watching {} path(s); press Ctrl-C to stop",
        watcher.registered_paths().len()
    );

    tokio::signal::ctrl_c().await?;
    watcher.destroy().await;
    reload_task.abort();
    Ok(())
}
