//! Configuration loading from TOML files.

use std::io::Write;
use std::time::Duration;

use tempfile::NamedTempFile;
use ticketreg_cache::{FailureMode, HashAlgorithm, LocatorType, NodeBackend};
use ticketreg_codec::KeyMaterial;
use ticketreg_core::ConfigError;
use ticketreg_registry::config::loader::load_config;
use ticketreg_registry::{CacheTicketRegistry, RegistryError};

fn toml_file(contents: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn loads_full_configuration() {
    let key = KeyMaterial::generate("2024-06").unwrap();
    let file = toml_file(&format!(
        r#"
namespace = "sso"
compression_threshold = 4096

[cache]
servers = "cache1:6379, cache2:6379"
locator = "CONSISTENT"
hash_algorithm = "KETAMA_HASH"
failure_mode = "Retry"
operation_timeout = "250ms"
pool_size = 4
max_retries = 1

[crypto]
enabled = true
key = "{}"
key_id = "2024-06"

[cleaner]
enabled = false
interval = "5m"

[logging]
level = "debug"
"#,
        key.to_base64()
    ));

    let config = load_config(Some(file.path())).unwrap();
    assert_eq!(config.namespace, "sso");
    assert_eq!(config.compression(), Some(4096));
    assert_eq!(config.cache.servers, vec!["cache1:6379", "cache2:6379"]);
    assert_eq!(config.cache.locator, LocatorType::Consistent);
    assert_eq!(config.cache.hash_algorithm, HashAlgorithm::Ketama);
    assert_eq!(config.cache.failure_mode, FailureMode::Retry);
    assert_eq!(config.cache.operation_timeout, Duration::from_millis(250));
    assert_eq!(config.cache.pool_size, 4);
    assert_eq!(config.cache.max_retries, 1);
    assert!(config.crypto.enabled);
    assert_eq!(config.crypto.key_id, "2024-06");
    assert!(!config.cleaner.enabled);
    assert_eq!(config.cleaner.interval, Duration::from_secs(300));
    assert_eq!(config.logging.level, "debug");
}

#[test]
fn missing_sections_use_defaults() {
    let file = toml_file("[cache]\nservers = [\"cache1:6379\"]\n");
    let config = load_config(Some(file.path())).unwrap();
    assert_eq!(config.namespace, "cas");
    assert_eq!(config.cache.servers, vec!["cache1:6379"]);
    assert_eq!(config.cache.locator, LocatorType::ArrayMod);
    assert_eq!(config.cache.hash_algorithm, HashAlgorithm::Fnv1_64);
    assert_eq!(config.cache.failure_mode, FailureMode::Redistribute);
    assert!(!config.crypto.enabled);
    assert!(config.cleaner.enabled);
}

#[test]
fn unknown_locator_is_rejected() {
    let file = toml_file("[cache]\nlocator = \"ROUND_ROBIN\"\n");
    let err = load_config(Some(file.path())).unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
    assert!(err.to_string().contains("ROUND_ROBIN"));
}

#[test]
fn encryption_without_key_is_fatal() {
    let file = toml_file("[crypto]\nenabled = true\n");
    let err = load_config(Some(file.path())).unwrap_err();
    assert!(matches!(err, ConfigError::Missing(_)));
}

#[test]
fn missing_file_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_config(Some(&dir.path().join("absent.toml"))).unwrap_err();
    assert!(matches!(err, ConfigError::Missing(_)));
}

#[tokio::test]
async fn registry_from_loaded_configuration() {
    let file = toml_file(
        "[cache]\nservers = \"mem1:1,mem2:2\"\nbackend = \"memory\"\nlocator = \"consistent\"\n",
    );
    let config = load_config(Some(file.path())).unwrap();
    assert_eq!(config.cache.backend, NodeBackend::Memory);

    let registry = CacheTicketRegistry::from_config(&config).unwrap();
    assert!(registry.cache_key("ST-1-abc-node1").starts_with("cas:"));
}

#[test]
fn registry_from_invalid_configuration_fails() {
    let mut config = ticketreg_registry::RegistryConfig::default();
    config.crypto.enabled = true;
    let err = CacheTicketRegistry::from_config(&config).unwrap_err();
    assert!(matches!(err, RegistryError::Configuration(ConfigError::Missing(_))));
}
