//! Integration tests for polling-based hot reload.
//!
//! Wires watcher, reloader and store together the way an application does
//! and checks that on-disk edits reach observers as deltas.

use portal_config::config::watcher::WATCHER_INTERVAL_KEY;
use portal_config::config::{
    ChangeEvent, ConfigLoader, ConfigPaths, Derived, Descriptor, FileWatcherService,
    SourceReloader, ValueStore,
};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;

fn bump_mtime(path: &Path) {
    let file = File::options().write(true).open(path).unwrap();
    let current = file.metadata().unwrap().modified().unwrap();
    file.set_modified(current + Duration::from_secs(5)).unwrap();
}

/// Replace `path` in one rename so a polling tick never sees a half-written file.
fn replace_file(path: &Path, content: &str) {
    let staging = path.with_extension("staging");
    std::fs::write(&staging, content).unwrap();
    bump_mtime(&staging);
    std::fs::rename(&staging, path).unwrap();
}

#[test]
fn test_file_descriptor_cycle() {
    let temp = TempDir::new().unwrap();
    let file = temp.path().join("app.properties");
    std::fs::write(&file, "a=1").unwrap();

    let mut descriptor = Descriptor::create(&file).unwrap();
    assert!(!descriptor.is_updated());
    bump_mtime(&file);
    assert!(descriptor.is_updated());
    descriptor.update().unwrap();
    assert!(!descriptor.is_updated());
}

#[test]
fn test_directory_descriptor_sees_new_file() {
    let temp = TempDir::new().unwrap();
    let descriptor = Descriptor::create(temp.path()).unwrap();
    std::fs::write(temp.path().join("late.yaml"), "a: 1").unwrap();
    assert!(descriptor.is_updated());
}

#[test]
fn test_same_path_registered_once() {
    let temp = TempDir::new().unwrap();
    let watcher = FileWatcherService::new(Arc::new(ValueStore::new()));
    watcher.register([temp.path()]);
    watcher.register([temp.path().to_path_buf()]);
    assert_eq!(watcher.registered_paths(), vec![temp.path().to_path_buf()]);
}

#[tokio::test]
async fn test_edit_reaches_observers() {
    let temp = TempDir::new().unwrap();
    let file = temp.path().join("portal.properties");
    std::fs::write(&file, "portal.home=/opt\nportal.title=Demo\n").unwrap();

    let store = Arc::new(ValueStore::new());
    let loaded = ConfigLoader::new(ConfigPaths::default())
        .with_defaults([(WATCHER_INTERVAL_KEY, "20")])
        .with_module_file(&file, false)
        .load(&store)
        .unwrap();

    // Subscribed first, so it is re-derived before the channel observer runs.
    let templates: Derived<PathBuf> = Derived::new(Arc::clone(&store), ["portal.home"], |store| {
        PathBuf::from(store.get("portal.home").ok().flatten().unwrap_or_default()).join("templates")
    });
    assert_eq!(*templates.get(), PathBuf::from("/opt/templates"));

    let (tx, mut rx) = mpsc::unbounded_channel::<ChangeEvent>();
    store.notifier().subscribe(move |event| {
        let _ = tx.send(event.clone());
    });

    let watcher = Arc::new(FileWatcherService::new(Arc::clone(&store)));
    watcher.register(loaded.watch_paths());
    let reloader = Arc::new(SourceReloader::new(Arc::clone(&store), loaded));
    let reload_task = reloader.spawn(watcher.subscribe());
    watcher.initialize();
    assert!(watcher.is_up_and_running());

    replace_file(&file, "portal.home=/srv\n");

    let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("no delta within timeout")
        .unwrap();
    assert_eq!(event.delta()["portal.home"], "/srv");
    assert_eq!(event.delta()["portal.title"], "");
    assert_eq!(*templates.get(), PathBuf::from("/srv/templates"));

    watcher.destroy().await;
    assert!(!watcher.is_up_and_running());
    reload_task.abort();
}

#[tokio::test]
async fn test_new_installation_file_loaded_by_watcher() {
    let temp = TempDir::new().unwrap();
    let install = temp.path().join("install");
    std::fs::create_dir_all(&install).unwrap();

    let store = Arc::new(ValueStore::new());
    let loaded = ConfigLoader::new(ConfigPaths::with_dirs(Some(install.clone())))
        .with_defaults([(WATCHER_INTERVAL_KEY, "20"), ("feature.enabled", "false")])
        .load(&store)
        .unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel::<ChangeEvent>();
    store.notifier().subscribe(move |event| {
        let _ = tx.send(event.clone());
    });

    let watcher = Arc::new(FileWatcherService::new(Arc::clone(&store)));
    watcher.register(loaded.watch_paths());
    let reloader = Arc::new(
        SourceReloader::new(Arc::clone(&store), loaded).with_watcher(Arc::clone(&watcher)),
    );
    let reload_task = reloader.spawn(watcher.subscribe());
    watcher.initialize();

    let added = install.join("feature.properties");
    replace_file(&added, "feature.enabled=true\n");

    let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("no delta within timeout")
        .unwrap();
    assert_eq!(event.delta()["feature.enabled"], "true");
    assert_eq!(store.resolve_as_bool("feature.enabled").unwrap(), Some(true));
    assert!(watcher.registered_paths().contains(&added));

    watcher.destroy().await;
    reload_task.abort();
}
