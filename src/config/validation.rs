use crate::config::types::{
    Config, FetchConfig, MergeConfig, PolitenessConfig, StorageConfig, UserAgentConfig,
};
use crate::url::HostPattern;
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.partitions.count < 1 {
        return Err(ConfigError::Validation(format!(
            "partitions.count must be >= 1, got {}",
            config.partitions.count
        )));
    }

    if config.queue.capacity < 1 {
        return Err(ConfigError::Validation(format!(
            "queue.capacity must be >= 1, got {}",
            config.queue.capacity
        )));
    }

    validate_politeness_config(&config.politeness)?;
    validate_merge_config(&config.merge)?;
    validate_fetch_config(&config.fetch)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_storage_config(&config.storage)?;
    Ok(())
}

fn validate_politeness_config(config: &PolitenessConfig) -> Result<(), ConfigError> {
    if config.max_concurrent_per_host < 1 {
        return Err(ConfigError::Validation(format!(
            "max-concurrent-per-host must be >= 1, got {}",
            config.max_concurrent_per_host
        )));
    }
    Ok(())
}

fn validate_merge_config(config: &MergeConfig) -> Result<(), ConfigError> {
    if config.interval_ms < 1 {
        return Err(ConfigError::Validation(
            "merge interval-ms must be >= 1".to_string(),
        ));
    }

    if config.buffer_threshold < 1 {
        return Err(ConfigError::Validation(format!(
            "buffer-threshold must be >= 1, got {}",
            config.buffer_threshold
        )));
    }

    if config.max_attempts < 1 {
        return Err(ConfigError::Validation(format!(
            "max-attempts must be >= 1, got {}",
            config.max_attempts
        )));
    }

    if !config.default_score.is_finite() {
        return Err(ConfigError::Validation(format!(
            "default-score must be a finite number, got {}",
            config.default_score
        )));
    }

    Ok(())
}

fn validate_fetch_config(config: &FetchConfig) -> Result<(), ConfigError> {
    if config.workers_per_partition < 1 {
        return Err(ConfigError::Validation(
            "workers-per-partition must be >= 1".to_string(),
        ));
    }

    if config.timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "fetch timeout-secs must be >= 1".to_string(),
        ));
    }

    for pattern in &config.exclude_domains {
        HostPattern::parse(pattern)?;
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    // Crawler name: non-empty, alphanumeric + hyphens only
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

fn validate_storage_config(config: &StorageConfig) -> Result<(), ConfigError> {
    if config.database_path.as_deref() == Some("") {
        return Err(ConfigError::Validation(
            "database-path cannot be empty; omit it for in-memory state".to_string(),
        ));
    }

    if config.channel_capacity < 1 {
        return Err(ConfigError::Validation(
            "channel-capacity must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    let invalid = || ConfigError::Validation(format!("Invalid email format: '{}'", email));

    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return Err(invalid());
    }

    if !domain.contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}
