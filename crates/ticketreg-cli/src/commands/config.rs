use anyhow::Result;
use serde::Serialize;
use ticketreg_codec::KeyMaterial;
use ticketreg_registry::RegistryConfig;

use crate::cli::{GenerateKeyArgs, OutputFormat};
use crate::output::{print_field, print_json, print_success};

/// Configuration summary without key material.
#[derive(Serialize)]
struct ConfigSummary<'a> {
    namespace: &'a str,
    servers: &'a [String],
    backend: String,
    locator: String,
    hash_algorithm: String,
    failure_mode: String,
    operation_timeout_ms: u128,
    encrypted: bool,
    key_id: Option<&'a str>,
    retired_keys: Vec<&'a str>,
    compression_threshold: Option<usize>,
    cleaner_enabled: bool,
    log_level: &'a str,
}

pub fn check_config(config: &RegistryConfig, format: OutputFormat) -> Result<()> {
    // Resolving keys catches an unset key_env variable
    config.crypto.resolve_keys()?;

    let summary = ConfigSummary {
        namespace: &config.namespace,
        servers: &config.cache.servers,
        backend: format!("{:?}", config.cache.backend).to_lowercase(),
        locator: config.cache.locator.to_string(),
        hash_algorithm: config.cache.hash_algorithm.to_string(),
        failure_mode: config.cache.failure_mode.to_string(),
        operation_timeout_ms: config.cache.operation_timeout.as_millis(),
        encrypted: config.crypto.enabled,
        key_id: config.crypto.enabled.then_some(config.crypto.key_id.as_str()),
        retired_keys: config
            .crypto
            .retired_keys
            .iter()
            .map(|k| k.key_id.as_str())
            .collect(),
        compression_threshold: config.compression(),
        cleaner_enabled: config.cleaner.enabled,
        log_level: &config.logging.level,
    };

    match format {
        OutputFormat::Json => print_json(&summary)?,
        OutputFormat::Text => {
            print_success("Configuration is valid");
            print_field("Namespace", summary.namespace);
            print_field("Servers", summary.servers.join(", "));
            print_field("Backend", &summary.backend);
            print_field("Locator", &summary.locator);
            print_field("Hash", &summary.hash_algorithm);
            print_field("Failure mode", &summary.failure_mode);
            print_field("Timeout", format!("{}ms", summary.operation_timeout_ms));
            match summary.key_id {
                Some(key_id) => print_field("Encryption", format!("enabled (key {key_id})")),
                None => print_field("Encryption", "disabled"),
            }
            if !summary.retired_keys.is_empty() {
                print_field("Retired keys", summary.retired_keys.join(", "));
            }
            match summary.compression_threshold {
                Some(threshold) => print_field("Compression", format!("above {threshold} bytes")),
                None => print_field("Compression", "disabled"),
            }
            print_field("Log level", summary.log_level);
        }
    }
    Ok(())
}

pub fn generate_key(args: &GenerateKeyArgs, format: OutputFormat) -> Result<()> {
    let key = KeyMaterial::generate(args.key_id.clone())?;

    match format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "key_id": key.key_id(),
            "key": key.to_base64(),
        }))?,
        OutputFormat::Text => {
            println!("[crypto]");
            println!("enabled = true");
            println!("key_id = \"{}\"", key.key_id());
            println!("key = \"{}\"", key.to_base64());
        }
    }
    Ok(())
}
