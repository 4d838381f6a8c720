use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

impl Config {
    /// Parses and validates a configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        validate(&config)?;
        Ok(config)
    }
}

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Parsed and validated configuration
/// * `Err(ConfigError)` - The file could not be read, parsed, or failed validation
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use sumi_crawldb::config::load_config;
///
/// let config = load_config(Path::new("crawldb.toml")).unwrap();
/// println!("Partitions: {}", config.partitions.count);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    Config::from_toml_str(&content)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Used to tell whether a restarted crawl runs with the configuration that wrote
/// its durable state.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    Ok(hash_content(&content))
}

/// Loads a configuration and returns both the config and its hash
///
/// The file is read once, so the hash always describes the text that was parsed.
///
/// # Returns
///
/// * `Ok((Config, String))` - The configuration and the hex SHA-256 of the file
/// * `Err(ConfigError)` - As for [`load_config`]
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config = Config::from_toml_str(&content)?;
    Ok((config, hash_content(&content)))
}

fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}
