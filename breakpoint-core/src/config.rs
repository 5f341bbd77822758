//! Configuration types and utilities

use crate::predicate::BreakpointDefinition;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Interception settings
/// Everything here can also be changed at runtime through the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterceptConfig {
    /// Only break on traffic inside `scope`
    pub scope_only: bool,
    /// Hold every request
    pub break_on_all_requests: bool,
    /// Hold every response
    pub break_on_all_responses: bool,
    /// Name of the thread display calls are marshalled onto
    pub ui_thread_name: String,
    /// Target definition used to flag messages as in scope
    pub scope: ScopeConfig,
    /// Breakpoints installed at startup
    pub breakpoints: Vec<BreakpointDefinition>,
    /// Limits on buffering bodies so they can be matched and edited
    pub body_capture: BodyCaptureConfig,
}

impl Default for InterceptConfig {
    fn default() -> Self {
        Self {
            scope_only: false,
            break_on_all_requests: false,
            break_on_all_responses: false,
            ui_thread_name: "breakpoint-ui".to_string(),
            scope: ScopeConfig::default(),
            breakpoints: Vec::new(),
            body_capture: BodyCaptureConfig::default(),
        }
    }
}

/// Body buffering limits for the proxy adapter.
///
/// A body that is larger, or slower to arrive, than these limits is streamed
/// through without interception.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BodyCaptureConfig {
    /// Maximum body size buffered, in bytes
    pub max_body_size: usize,
    /// Time allowed to read a whole body
    pub response_timeout_ms: u64,
    /// Time allowed between two chunks
    pub stream_read_timeout_ms: u64,
}

impl Default for BodyCaptureConfig {
    fn default() -> Self {
        Self {
            max_body_size: 10 * 1024 * 1024,
            response_timeout_ms: 30_000,
            stream_read_timeout_ms: 5_000,
        }
    }
}

impl BodyCaptureConfig {
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    pub fn stream_read_timeout(&self) -> Duration {
        Duration::from_millis(self.stream_read_timeout_ms)
    }
}

/// Scope Configuration (Target Definition)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScopeConfig {
    /// Hosts in scope, wildcards allowed. Empty means every host.
    /// Examples: ["*.google.com", "api.target.com"]
    pub include: Vec<String>,

    /// Hosts never in scope (takes priority)
    /// Examples: ["*.google-analytics.com", "*.facebook.com"]
    pub exclude: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predicate::{MatchLocation, MatchType};

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: InterceptConfig = serde_json::from_str(
            r#"{
                "scope_only": true,
                "scope": { "include": ["*.target.com"] },
                "breakpoints": [
                    { "name": "admin", "location": "Url", "match_type": "Contains", "pattern": "/admin" }
                ]
            }"#,
        )
        .unwrap();

        assert!(config.scope_only);
        assert!(!config.break_on_all_requests);
        assert_eq!(config.ui_thread_name, "breakpoint-ui");
        assert!(config.scope.exclude.is_empty());
        let bp = &config.breakpoints[0];
        assert!(bp.enabled);
        assert_eq!(bp.location, MatchLocation::Url);
        assert_eq!(bp.match_type, MatchType::Contains);
        assert!(!bp.inverse);
        assert_eq!(config.body_capture, BodyCaptureConfig::default());
    }

    #[test]
    fn test_body_capture_timeouts() {
        let config: BodyCaptureConfig =
            serde_json::from_str(r#"{ "max_body_size": 1024, "stream_read_timeout_ms": 250 }"#).unwrap();
        assert_eq!(config.max_body_size, 1024);
        assert_eq!(config.stream_read_timeout(), Duration::from_millis(250));
        assert_eq!(config.response_timeout(), Duration::from_secs(30));
    }
}
