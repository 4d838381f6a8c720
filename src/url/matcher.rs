use crate::ConfigError;
use std::fmt;

/// A host pattern used to exclude hosts from the crawl
///
/// Two forms are supported:
/// 1. Exact: `example.com` matches only `example.com`
/// 2. Wildcard: `*.example.com` matches `example.com` itself and any subdomain,
///    such as `blog.example.com` or `api.v2.example.com`
///
/// Patterns are lowercased when parsed; hosts handed to [`HostPattern::matches`] are
/// expected to be normalized already.
///
/// # Examples
///
/// ```
/// use sumi_crawldb::url::HostPattern;
///
/// let pattern = HostPattern::parse("*.example.com").unwrap();
/// assert!(pattern.matches("example.com"));
/// assert!(pattern.matches("api.v2.example.com"));
/// assert!(!pattern.matches("example.org"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostPattern {
    Exact(String),
    Subdomains(String),
}

impl HostPattern {
    /// Parses and validates a pattern
    pub fn parse(pattern: &str) -> Result<Self, ConfigError> {
        let pattern = pattern.trim().to_lowercase();
        if pattern.is_empty() {
            return Err(ConfigError::InvalidPattern(
                "Host pattern cannot be empty".to_string(),
            ));
        }

        match pattern.strip_prefix("*.") {
            Some(base) => {
                validate_host(base)?;
                Ok(Self::Subdomains(base.to_string()))
            }
            None => {
                validate_host(&pattern)?;
                Ok(Self::Exact(pattern))
            }
        }
    }

    /// Checks whether a host falls under this pattern
    pub fn matches(&self, host: &str) -> bool {
        match self {
            Self::Exact(exact) => host == exact,
            Self::Subdomains(base) => {
                host == base
                    || host
                        .strip_suffix(base.as_str())
                        .is_some_and(|prefix| prefix.ends_with('.'))
            }
        }
    }
}

impl fmt::Display for HostPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(host) => write!(f, "{}", host),
            Self::Subdomains(base) => write!(f, "*.{}", base),
        }
    }
}

/// Validates a host string (without wildcard prefix)
fn validate_host(host: &str) -> Result<(), ConfigError> {
    if host.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Host cannot be empty".to_string(),
        ));
    }

    if !host
        .chars()
        .all(|c| c.is_alphanumeric() || c == '.' || c == '-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Host '{}' contains invalid characters",
            host
        )));
    }

    if host.starts_with('.') || host.ends_with('.') || host.starts_with('-') || host.ends_with('-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Host '{}' cannot start or end with '.' or '-'",
            host
        )));
    }

    if host.contains("..") {
        return Err(ConfigError::InvalidPattern(format!(
            "Host '{}' cannot contain consecutive dots",
            host
        )));
    }

    Ok(())
}
