//! Robots.txt rules
//!
//! Matching is delegated to the robotstxt crate.

use robotstxt::DefaultMatcher;

/// Parsed robots.txt data
///
/// Holds the raw file and evaluates it on demand; the robotstxt matcher works
/// directly from the text.
#[derive(Debug, Clone)]
pub struct ParsedRobots {
    /// Raw robots.txt content (empty string means allow all)
    content: String,
}

impl ParsedRobots {
    /// Creates a new ParsedRobots from raw robots.txt content
    ///
    /// # Arguments
    ///
    /// * `content` - The raw robots.txt file content
    pub fn from_content(content: &str) -> Self {
        Self {
            content: content.to_string(),
        }
    }

    /// Creates a permissive ParsedRobots that allows everything
    ///
    /// Used when robots.txt is missing or cannot be fetched.
    pub fn allow_all() -> Self {
        Self {
            content: String::new(),
        }
    }

    pub fn is_allow_all(&self) -> bool {
        self.content.trim().is_empty()
    }

    /// Checks if a URL is allowed for the given user agent
    ///
    /// # Arguments
    ///
    /// * `url` - A full URL or a path such as `/page.html`
    /// * `user_agent` - The crawler's product token
    ///
    /// # Returns
    ///
    /// * `true` - If the URL is allowed
    /// * `false` - If the URL is disallowed
    pub fn is_allowed(&self, url: &str, user_agent: &str) -> bool {
        if self.is_allow_all() {
            return true;
        }

        let mut matcher = DefaultMatcher::default();
        matcher.one_agent_allowed_by_robots(&self.content, user_agent, url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allow_all() {
        let robots = ParsedRobots::allow_all();
        assert!(robots.is_allow_all());
        assert!(robots.is_allowed("https://example.com/private", "TestBot"));
    }

    #[test]
    fn test_disallow_path() {
        let robots = ParsedRobots::from_content("User-agent: *\nDisallow: /private\n");
        assert!(!robots.is_allowed("https://example.com/private/page", "TestBot"));
        assert!(robots.is_allowed("https://example.com/public", "TestBot"));
    }

    #[test]
    fn test_agent_specific_group() {
        let robots = ParsedRobots::from_content(
            "User-agent: TestBot\nDisallow: /\n\nUser-agent: *\nAllow: /\n",
        );
        assert!(!robots.is_allowed("https://example.com/page", "TestBot"));
        assert!(robots.is_allowed("https://example.com/page", "OtherBot"));
    }

    #[test]
    fn test_allow_overrides_longer_match() {
        let robots = ParsedRobots::from_content(
            "User-agent: *\nDisallow: /docs\nAllow: /docs/public\n",
        );
        assert!(robots.is_allowed("https://example.com/docs/public/a", "TestBot"));
        assert!(!robots.is_allowed("https://example.com/docs/secret", "TestBot"));
    }

    #[test]
    fn test_whitespace_only_allows_all() {
        let robots = ParsedRobots::from_content("   \n\n");
        assert!(robots.is_allow_all());
    }
}
