//! Robots.txt rules
//!
//! This module wraps the robotstxt crate's matcher behind a small type that
//! holds the raw file body.

use robotstxt::DefaultMatcher;

/// Parsed robots.txt data
///
/// An empty body means everything is allowed, which is also what a 404 or
/// 410 for robots.txt means.
#[derive(Debug, Clone, Default)]
pub struct RobotsRules {
    content: String,
}

impl RobotsRules {
    /// Creates rules from raw robots.txt content
    pub fn from_content(content: &str) -> Self {
        Self {
            content: content.to_string(),
        }
    }

    /// Creates permissive rules that allow everything
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Returns the raw robots.txt content
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Checks if a URL is allowed for the given user agent
    ///
    /// # Arguments
    ///
    /// * `url` - The full URL to check (e.g., "http://example.com/page")
    /// * `user_agent` - The agent token, usually the crawler name
    pub fn is_allowed(&self, url: &str, user_agent: &str) -> bool {
        if self.content.trim().is_empty() {
            return true;
        }

        let mut matcher = DefaultMatcher::default();
        matcher.one_agent_allowed_by_robots(&self.content, user_agent, url)
    }
}
