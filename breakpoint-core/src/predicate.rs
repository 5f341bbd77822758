//! Breakpoint predicates
//!
//! A predicate decides whether an intercepted message should be held. The
//! coordinator only ever calls [`BreakpointPredicate::matches`]; how a
//! predicate decides is up to the implementation. Two are provided here:
//! [`HttpBreakpoint`] (one pattern against one location of the message) and
//! [`RulePredicate`] (a set of conditions that must all hold).

use crate::error::BreakpointError;
use crate::message::HttpMessage;
use crate::Result;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

/// Matching strategy installed in the registry
pub trait BreakpointPredicate: Send + Sync {
    /// Human readable name used in logs
    fn name(&self) -> &str;

    /// Check the message. Must not mutate shared state.
    ///
    /// `scope_only` is passed through so a predicate can apply its own scope
    /// rules; the coordinator has already rejected out-of-scope messages.
    fn matches(&self, message: &HttpMessage, scope_only: bool) -> Result<bool>;
}

/// Part of the message a pattern is applied to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchLocation {
    Url,
    RequestHeader,
    RequestBody,
    ResponseHeader,
    ResponseBody,
}

/// How the pattern is compared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchType {
    Contains,
    Regex,
}

/// Operator facing breakpoint definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakpointDefinition {
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub location: MatchLocation,
    pub match_type: MatchType,
    pub pattern: String,
    /// Hold messages that do NOT match
    #[serde(default)]
    pub inverse: bool,
    #[serde(default)]
    pub ignore_case: bool,
}

fn default_enabled() -> bool {
    true
}

impl BreakpointDefinition {
    /// Shorthand for a case sensitive "URL contains" breakpoint
    pub fn url_contains(name: &str, pattern: &str) -> Self {
        Self {
            name: name.to_string(),
            enabled: true,
            location: MatchLocation::Url,
            match_type: MatchType::Contains,
            pattern: pattern.to_string(),
            inverse: false,
            ignore_case: false,
        }
    }
}

#[derive(Debug)]
enum CompiledPattern {
    Contains(String),
    Regex(Regex),
}

/// A single pattern applied to one location of the message
#[derive(Debug)]
pub struct HttpBreakpoint {
    name: String,
    location: MatchLocation,
    pattern: CompiledPattern,
    inverse: bool,
    ignore_case: bool,
}

impl HttpBreakpoint {
    /// Compile a definition. Invalid regular expressions are rejected here so
    /// that a broken rule never reaches the registry.
    pub fn new(definition: &BreakpointDefinition) -> Result<Self> {
        let pattern = match definition.match_type {
            MatchType::Contains => CompiledPattern::Contains(if definition.ignore_case {
                definition.pattern.to_lowercase()
            } else {
                definition.pattern.clone()
            }),
            MatchType::Regex => {
                let regex = RegexBuilder::new(&definition.pattern)
                    .case_insensitive(definition.ignore_case)
                    .build()
                    .map_err(|e| BreakpointError::invalid_pattern(&definition.pattern, e))?;
                CompiledPattern::Regex(regex)
            }
        };

        Ok(Self {
            name: definition.name.clone(),
            location: definition.location,
            pattern,
            inverse: definition.inverse,
            ignore_case: definition.ignore_case,
        })
    }

    fn location_text(&self, message: &HttpMessage) -> Option<String> {
        match self.location {
            MatchLocation::Url => Some(message.request.url.clone()),
            MatchLocation::RequestHeader => Some(message.request_header_text()),
            MatchLocation::RequestBody => {
                Some(String::from_utf8_lossy(&message.request.body).into_owned())
            }
            MatchLocation::ResponseHeader => message.response_header_text(),
            MatchLocation::ResponseBody => message
                .response
                .as_ref()
                .map(|res| String::from_utf8_lossy(&res.body).into_owned()),
        }
    }
}

impl BreakpointPredicate for HttpBreakpoint {
    fn name(&self) -> &str {
        &self.name
    }

    fn matches(&self, message: &HttpMessage, scope_only: bool) -> Result<bool> {
        if scope_only && !message.is_in_scope() {
            return Ok(false);
        }

        // Response locations never match before the server answered,
        // not even for inverse breakpoints
        let Some(text) = self.location_text(message) else {
            return Ok(false);
        };

        let found = match &self.pattern {
            CompiledPattern::Contains(needle) if self.ignore_case => {
                text.to_lowercase().contains(needle.as_str())
            }
            CompiledPattern::Contains(needle) => text.contains(needle.as_str()),
            CompiledPattern::Regex(re) => re.is_match(&text),
        };

        Ok(found != self.inverse)
    }
}

/// Rule Condition - What to check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleCondition {
    /// URL contains string (e.g., "/admin")
    UrlContains(String),

    /// URL matches regex
    UrlRegex(String),

    /// HTTP Method matches (e.g., "POST")
    Method(String),

    /// Check if a request header exists (e.g., "X-Custom-Token")
    HasHeader(String),

    /// Request header value matches regex
    HeaderValueMatch { key: String, regex: String },

    /// Request body matches regex
    BodyRegex(String),

    /// Port matches
    Port(u16),
}

impl RuleCondition {
    /// Regex source for the conditions that carry one
    pub fn pattern(&self) -> Option<&str> {
        match self {
            RuleCondition::UrlRegex(pattern)
            | RuleCondition::BodyRegex(pattern)
            | RuleCondition::HeaderValueMatch { regex: pattern, .. } => Some(pattern),
            _ => None,
        }
    }

    /// `regex` is the compiled form of [`RuleCondition::pattern`]
    fn matches(&self, message: &HttpMessage, regex: Option<&Regex>) -> bool {
        let req = &message.request;
        let is_match = |text: &str| regex.map_or(false, |re| re.is_match(text));
        match self {
            RuleCondition::UrlContains(s) => req.url.contains(s.as_str()),
            RuleCondition::UrlRegex(_) => is_match(&req.url),
            RuleCondition::Method(m) => req.method.eq_ignore_ascii_case(m),
            RuleCondition::HasHeader(key) => message.request_header(key).is_some(),
            RuleCondition::HeaderValueMatch { key, .. } => {
                message.request_header(key).map_or(false, is_match)
            }
            RuleCondition::BodyRegex(_) => is_match(&String::from_utf8_lossy(&req.body)),
            RuleCondition::Port(p) => message.port() == Some(*p),
        }
    }
}

/// Conditions combined with AND logic. Patterns are compiled once, when the
/// predicate is built.
#[derive(Debug, Clone)]
pub struct RulePredicate {
    name: String,
    conditions: Vec<(RuleCondition, Option<Regex>)>,
}

impl RulePredicate {
    pub fn new(name: impl Into<String>, conditions: Vec<RuleCondition>) -> Result<Self> {
        let conditions = conditions
            .into_iter()
            .map(|condition| {
                let regex = match condition.pattern() {
                    Some(pattern) => Some(
                        Regex::new(pattern)
                            .map_err(|e| BreakpointError::invalid_pattern(pattern, e))?,
                    ),
                    None => None,
                };
                Ok((condition, regex))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            name: name.into(),
            conditions,
        })
    }

    pub fn conditions(&self) -> impl Iterator<Item = &RuleCondition> {
        self.conditions.iter().map(|(condition, _)| condition)
    }
}

impl BreakpointPredicate for RulePredicate {
    fn name(&self) -> &str {
        &self.name
    }

    fn matches(&self, message: &HttpMessage, scope_only: bool) -> Result<bool> {
        if scope_only && !message.is_in_scope() {
            return Ok(false);
        }
        Ok(self
            .conditions
            .iter()
            .all(|(condition, regex)| condition.matches(message, regex.as_ref())))
    }
}
