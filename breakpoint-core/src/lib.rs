//! Breakpoint Core Library
//!
//! Holds intercepted proxy traffic at operator-defined breakpoints. A message
//! that matches is suspended on its own proxy task, shown to the operator,
//! and forwarded, edited, or dropped once the operator decides. Other traffic
//! keeps flowing.

pub mod controller;
pub mod coordinator;
pub mod filter;
pub mod handlers;
pub mod hold;
pub mod message;
pub mod modes;
pub mod predicate;
pub mod registry;
pub mod sink;
pub mod stats;
pub mod ui;

/// Configuration types and utilities
pub mod config;

/// Error types for breakpoint operations
pub mod error;

/// Tracing subscriber setup
pub mod logging;

pub use config::{BodyCaptureConfig, InterceptConfig, ScopeConfig};
pub use controller::BreakController;
pub use coordinator::BreakpointCoordinator;
pub use error::BreakpointError;
pub use filter::ScopeMatcher;
pub use handlers::BreakpointHandler;
pub use hold::{Disposition, HoldPhase, HoldState, HoldStatus};
pub use logging::{init_logging, LoggingConfig};
pub use message::{Direction, HttpMessage, RequestData, ResponseData};
pub use modes::{BreakModes, BreakModesSnapshot};
pub use predicate::{
    BreakpointDefinition, BreakpointPredicate, HttpBreakpoint, MatchLocation, MatchType,
    RuleCondition, RulePredicate,
};
pub use registry::{BreakpointRegistry, MatchOutcome, PredicateList};
pub use sink::{BreakEvent, ChannelSink, DisplaySink};
pub use stats::{BreakpointStats, StatsSnapshot};
pub use ui::UiContext;

/// Result type alias for breakpoint operations
pub type Result<T> = std::result::Result<T, BreakpointError>;
