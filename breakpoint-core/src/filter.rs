use crate::config::ScopeConfig;
use wildmatch::WildMatch;

/// Host based scope filtering for intercepted traffic
#[derive(Debug, Clone, Default)]
pub struct ScopeMatcher {
    include: Vec<WildMatch>,
    exclude: Vec<WildMatch>,
}

impl ScopeMatcher {
    /// Create a new ScopeMatcher
    pub fn new(include: Vec<String>, exclude: Vec<String>) -> Self {
        Self {
            include: include.iter().map(|p| WildMatch::new(p)).collect(),
            exclude: exclude.iter().map(|p| WildMatch::new(p)).collect(),
        }
    }

    pub fn from_config(config: &ScopeConfig) -> Self {
        Self::new(config.include.clone(), config.exclude.clone())
    }

    /// Check if a host is in scope
    ///
    /// Logic:
    /// 1. If exclude matches, return false (explicit deny).
    /// 2. If include is empty, return true (everything in scope).
    /// 3. Otherwise return true only if an include pattern matches.
    pub fn is_allowed(&self, host: &str) -> bool {
        if self.exclude.iter().any(|p| p.matches(host)) {
            return false;
        }

        if self.include.is_empty() {
            return true;
        }

        self.include.iter().any(|p| p.matches(host))
    }
}
