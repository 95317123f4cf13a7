//! Tests for `config` module

use super::config::*;
use serial_test::serial;

#[test]
fn test_defaults_validate() {
    let config = EngineConfig::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.storage.page_size, 4096);
    assert!(config.search.cache_enabled);
    assert!(config.io.use_mmap);
}

#[test]
fn test_from_toml_overrides() {
    let config = EngineConfig::from_toml(
        r#"
        [storage]
        page_size = 8192

        [search]
        max_workers = 8
        cache_size = 50

        [embedding]
        batch_size = 64
        fallback_batch_size = 16
    "#,
    )
    .unwrap();

    assert_eq!(config.storage.page_size, 8192);
    assert_eq!(config.search.max_workers, 8);
    assert_eq!(config.search.cache_size, 50);
    assert_eq!(config.embedding.batch_size, 64);
    // Untouched sections keep defaults.
    assert_eq!(config.io.async_queue_size, 1024);
}

#[test]
fn test_invalid_page_size_rejected() {
    let result = EngineConfig::from_toml("[storage]\npage_size = 5000");
    assert!(result.is_err());
    let result = EngineConfig::from_toml("[storage]\npage_size = 131072");
    assert!(result.is_err());
}

#[test]
fn test_fallback_batch_larger_than_primary_rejected() {
    let result = EngineConfig::from_toml(
        "[embedding]\nbatch_size = 8\nfallback_batch_size = 32",
    );
    assert!(result.is_err());
}

#[test]
fn test_invalid_log_level_rejected() {
    let result = EngineConfig::from_toml("[logging]\nlevel = \"verbose\"");
    assert!(result.is_err());
}

#[test]
fn test_effective_workers_auto() {
    let config = SearchConfig::default();
    assert!(config.effective_workers() >= 1);

    let fixed = SearchConfig {
        max_workers: 3,
        ..SearchConfig::default()
    };
    assert_eq!(fixed.effective_workers(), 3);
}

#[test]
fn test_toml_round_trip() {
    let config = EngineConfig::default();
    let toml = config.to_toml().unwrap();
    let back = EngineConfig::from_toml(&toml).unwrap();
    assert_eq!(back.storage.page_size, config.storage.page_size);
    assert_eq!(back.search.cache_ttl_secs, config.search.cache_ttl_secs);
    assert_eq!(back.embedding.max_retries, config.embedding.max_retries);
}

#[test]
#[serial]
fn test_env_override() {
    std::env::set_var("QUIVERDB_SEARCH__BATCH_SIZE", "512");
    let config = EngineConfig::load_from_path("/nonexistent/quiverdb.toml").unwrap();
    assert_eq!(config.search.batch_size, 512);
    std::env::remove_var("QUIVERDB_SEARCH__BATCH_SIZE");
}
