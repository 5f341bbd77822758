//! Enabled breakpoint registry
//!
//! The list is replaced as a whole. Readers take an `Arc` snapshot and
//! iterate it without holding any lock, so a concurrent swap is observed
//! either entirely or not at all.

use crate::error::{panic_message, BreakpointError};
use crate::message::HttpMessage;
use crate::predicate::{BreakpointDefinition, BreakpointPredicate, HttpBreakpoint};
use crate::Result;
use arc_swap::ArcSwap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub type PredicateList = Vec<Arc<dyn BreakpointPredicate>>;

/// Outcome of evaluating the registry against one message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchOutcome {
    /// Name of the first predicate that matched
    pub matched: Option<String>,
    /// Predicates that errored or panicked and were treated as non-matching
    pub failures: u64,
}

pub struct BreakpointRegistry {
    enabled: ArcSwap<PredicateList>,
}

impl Default for BreakpointRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BreakpointRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self
            .snapshot()
            .iter()
            .map(|p| p.name().to_string())
            .collect();
        f.debug_struct("BreakpointRegistry")
            .field("enabled", &names)
            .finish()
    }
}

impl BreakpointRegistry {
    pub fn new() -> Self {
        Self {
            enabled: ArcSwap::from_pointee(Vec::new()),
        }
    }

    /// Compile definitions into a predicate list, skipping disabled ones.
    pub fn compile(definitions: &[BreakpointDefinition]) -> Result<PredicateList> {
        let mut list: PredicateList = Vec::with_capacity(definitions.len());
        for definition in definitions.iter().filter(|d| d.enabled) {
            let breakpoint = HttpBreakpoint::new(definition).map_err(|e| {
                BreakpointError::configuration(&format!("breakpoint '{}'", definition.name), e)
            })?;
            list.push(Arc::new(breakpoint));
        }
        Ok(list)
    }

    pub fn from_definitions(definitions: &[BreakpointDefinition]) -> Result<Self> {
        let registry = Self::new();
        registry.set_enabled_breakpoints(Self::compile(definitions)?);
        Ok(registry)
    }

    /// Replace the active set atomically
    pub fn set_enabled_breakpoints(&self, predicates: PredicateList) {
        info!("Installing {} enabled breakpoint(s)", predicates.len());
        self.enabled.store(Arc::new(predicates));
    }

    /// Stable view of the current list
    pub fn snapshot(&self) -> Arc<PredicateList> {
        self.enabled.load_full()
    }

    pub fn len(&self) -> usize {
        self.enabled.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.enabled.load().is_empty()
    }

    /// Evaluate predicates in order, stopping at the first match.
    ///
    /// A predicate that returns an error or panics is logged and counted as
    /// not matching; evaluation continues with the next one.
    pub fn first_match(&self, message: &HttpMessage, scope_only: bool) -> MatchOutcome {
        let snapshot = self.enabled.load();
        let mut outcome = MatchOutcome::default();

        for predicate in snapshot.iter() {
            let result = catch_unwind(AssertUnwindSafe(|| predicate.matches(message, scope_only)));
            match result {
                Ok(Ok(true)) => {
                    debug!("Breakpoint '{}' matched {}", predicate.name(), message.request.url);
                    outcome.matched = Some(predicate.name().to_string());
                    return outcome;
                }
                Ok(Ok(false)) => {}
                Ok(Err(e)) => {
                    outcome.failures += 1;
                    warn!("Treating breakpoint as non-matching: {}", e);
                }
                Err(payload) => {
                    outcome.failures += 1;
                    warn!(
                        "Breakpoint '{}' panicked, treating as non-matching: {}",
                        predicate.name(),
                        panic_message(payload.as_ref())
                    );
                }
            }
        }

        outcome
    }
}
