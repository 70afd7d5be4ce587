//! Integration tests for layered resolution and placeholder expansion.
//!
//! Covers the merged-view guarantees end to end:
//! - single-source keys, ordinal precedence, tombstones
//! - placeholder expansion across sources, including nested defaults
//! - nesting limits on reference chains

use portal_config::config::{ConfigLoader, ConfigPaths, Source, SourceBand, ValueStore};
use portal_config::error::{ConfigError, ErrorCode};
use tempfile::TempDir;

/// Helper to build a source from literal pairs.
fn source(name: &str, ordinal: i32, pairs: &[(&str, &str)]) -> Source {
    Source::new(name, ordinal).with_properties(pairs.iter().copied())
}

/// Helper to create a store holding the given sources.
fn store_from(sources: Vec<Source>) -> ValueStore {
    let store = ValueStore::new();
    for source in sources {
        store.register(source).expect("Failed to register source");
    }
    store
}

#[test]
fn test_key_in_one_source_ignores_others() {
    let store = store_from(vec![
        source("a", 10, &[("unique", "from-a"), ("shared", "a")]),
        source("b", 20, &[("shared", "b"), ("unique.other", "")]),
        source("c", 30, &[("shared", "")]),
    ]);
    assert_eq!(store.resolve("unique").as_deref(), Some("from-a"));
}

#[test]
fn test_higher_ordinal_value_returned() {
    let store = store_from(vec![
        source("o1", 10, &[("k", "low")]),
        source("o2", 20, &[("k", "high")]),
    ]);
    assert_eq!(store.resolve("k").as_deref(), Some("high"));
    assert_eq!(store.get("k").unwrap().as_deref(), Some("high"));
}

#[test]
fn test_tombstone_masks_lower_value() {
    let store = store_from(vec![
        source("low", 10, &[("k", "v")]),
        source("high", 20, &[("k", "")]),
    ]);
    assert_eq!(store.resolve("k"), None);
    assert_eq!(store.get("k").unwrap(), None);
    assert!(store.snapshot().is_empty());

    // Removing the tombstoning source exposes the lower value again.
    assert!(store.unregister("high"));
    assert_eq!(store.resolve("k").as_deref(), Some("v"));
}

#[test]
fn test_placeholder_across_sources() {
    let store = store_from(vec![
        source("a", 10, &[("app.home", "/opt")]),
        source("b", 50, &[("app.home", "${ENV_HOME:/default}"), ("ENV_HOME", "/custom")]),
    ]);
    assert_eq!(store.get("app.home").unwrap().as_deref(), Some("/custom"));
}

#[test]
fn test_placeholder_default_used_when_reference_deleted() {
    let store = store_from(vec![
        source("a", 10, &[("ENV_HOME", "/lower")]),
        source("b", 50, &[("app.home", "${ENV_HOME:/default}"), ("ENV_HOME", "")]),
    ]);
    assert_eq!(store.get("app.home").unwrap().as_deref(), Some("/default"));
}

#[test]
fn test_expand_is_idempotent_once_resolved() {
    let store = store_from(vec![source(
        "s",
        10,
        &[
            ("scheme", "https"),
            ("host", "portal"),
            ("url", "${scheme}://${host:localhost}/${path:app}"),
        ],
    )]);
    let once = store.get("url").unwrap().unwrap();
    let twice = store.resolver().expand(&once, true).unwrap();
    assert_eq!(once, "https://portal/app");
    assert_eq!(once, twice);
}

#[test]
fn test_chain_limits() {
    fn chain_store(links: usize) -> ValueStore {
        let pairs: Vec<(String, String)> = (0..links)
            .map(|i| (format!("k{}", i), format!("${{k{}:x}}", i + 1)))
            .collect();
        let store = ValueStore::new();
        // One source per link, as a chain spread across sources.
        for (i, (key, value)) in pairs.into_iter().enumerate() {
            store
                .register(Source::new(format!("link{}", i), 100 + i as i32).with_property(key, value))
                .unwrap();
        }
        store
    }

    assert_eq!(chain_store(5).get("k0").unwrap().as_deref(), Some("x"));

    let err = chain_store(6).get("k0").unwrap_err();
    assert_eq!(err.code(), ErrorCode::NestingTooDeep);
}

#[test]
fn test_strict_lookup_reports_missing_keys() {
    let store = store_from(vec![source("s", 10, &[("greeting", "hello ${user.name}")])]);

    // Lenient keeps the literal text.
    assert_eq!(
        store.get("greeting").unwrap().as_deref(),
        Some("hello ${user.name}")
    );

    match store.get_required("greeting") {
        Err(ConfigError::MissingKey { keys }) => assert_eq!(keys, vec!["user.name"]),
        other => panic!("expected MissingKey, got {:?}", other),
    }
}

#[test]
fn test_loader_stack_with_placeholders() {
    let temp = TempDir::new().unwrap();
    let install = temp.path().join("install");
    std::fs::create_dir_all(&install).unwrap();
    std::fs::write(
        install.join("portal.yaml"),
        r#"
portal:
  home: /srv/portal
  templates: ${portal.home}/templates
  languages: [de, en]
"#,
    )
    .unwrap();

    let store = ValueStore::new();
    ConfigLoader::new(ConfigPaths::with_dirs(Some(install)))
        .with_defaults([("portal.home", "/opt/portal"), ("portal.cache.size", "10")])
        .with_override("portal.cache.size", "")
        .load(&store)
        .unwrap();

    assert_eq!(
        store.get("portal.templates").unwrap().as_deref(),
        Some("/srv/portal/templates")
    );
    assert_eq!(store.resolve("portal.languages[1]").as_deref(), Some("en"));
    assert_eq!(store.resolve("portal.cache.size"), None);

    let sources = store.sources();
    assert_eq!(
        sources.first().map(|s| s.ordinal()),
        Some(SourceBand::RuntimeOverrides.base_ordinal())
    );
}
