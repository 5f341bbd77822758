//! Interception coordinator
//!
//! Proxy tasks call [`BreakpointCoordinator::intercept`] (or the
//! direction-specific wrappers) for every message. Messages that match a
//! breakpoint queue at a single gate shared by both directions; the one
//! holding the gate is displayed to the operator and its task stays suspended
//! until the operator releases it. Everything else passes straight through.

use crate::config::InterceptConfig;
use crate::controller::BreakController;
use crate::error::{panic_message, BreakpointError};
use crate::hold::{Disposition, HoldState};
use crate::message::{Direction, HttpMessage};
use crate::modes::BreakModes;
use crate::registry::{BreakpointRegistry, PredicateList};
use crate::sink::DisplaySink;
use crate::stats::{BreakpointStats, StatsSnapshot};
use crate::ui::UiContext;
use crate::Result;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub struct BreakpointCoordinator {
    registry: BreakpointRegistry,
    modes: Arc<BreakModes>,
    hold: Arc<HoldState>,
    /// Serialises display across requests and responses. tokio's mutex is
    /// fair, so waiters are displayed in arrival order.
    gate: Mutex<()>,
    sink: Arc<dyn DisplaySink>,
    ui: UiContext,
    stats: BreakpointStats,
}

impl BreakpointCoordinator {
    pub fn new(sink: Arc<dyn DisplaySink>, ui: UiContext) -> Self {
        Self {
            registry: BreakpointRegistry::new(),
            modes: Arc::new(BreakModes::default()),
            hold: Arc::new(HoldState::new()),
            gate: Mutex::new(()),
            sink,
            ui,
            stats: BreakpointStats::default(),
        }
    }

    /// Build a coordinator with its own UI thread, global modes and
    /// breakpoints taken from `config`.
    pub fn from_config(config: &InterceptConfig, sink: Arc<dyn DisplaySink>) -> Result<Self> {
        let ui = UiContext::spawn(&config.ui_thread_name)?;
        let coordinator = Self::new(sink, ui);
        coordinator
            .registry
            .set_enabled_breakpoints(BreakpointRegistry::compile(&config.breakpoints)?);
        coordinator
            .modes
            .set_break_on_all_requests(config.break_on_all_requests);
        coordinator
            .modes
            .set_break_on_all_responses(config.break_on_all_responses);
        Ok(coordinator)
    }

    pub fn controller(&self) -> BreakController {
        BreakController::new(self.hold.clone(), self.modes.clone())
    }

    pub fn registry(&self) -> &BreakpointRegistry {
        &self.registry
    }

    pub fn set_enabled_breakpoints(&self, predicates: PredicateList) {
        self.registry.set_enabled_breakpoints(predicates);
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Release anything held and stop holding new matches. Matching messages
    /// keep flowing (forwarded unedited).
    pub fn shutdown(&self) {
        info!("Breakpoint coordinator shutting down");
        self.hold.force_release();
    }

    /// Decide whether `message` should be held.
    ///
    /// Scope is checked first and overrides everything else. Global modes are
    /// then consulted, and finally the registry in order.
    pub fn is_breakpoint(&self, message: &HttpMessage, direction: Direction, scope_only: bool) -> bool {
        BreakpointStats::incr(&self.stats.evaluated);

        if scope_only && !message.is_in_scope() {
            return false;
        }

        if self.modes.forces_break(direction) {
            debug!("Global break mode active for {} {}", direction, message.id);
            return true;
        }

        if self.registry.is_empty() {
            return false;
        }

        let outcome = self.registry.first_match(message, scope_only);
        if outcome.failures > 0 {
            self.stats
                .predicate_failures
                .fetch_add(outcome.failures, Ordering::Relaxed);
        }
        outcome.matched.is_some()
    }

    /// Whether any breakpoint could fire for `direction`, judged before the
    /// message body has been read. False means the message can be forwarded
    /// untouched.
    pub fn may_break(&self, message: &HttpMessage, direction: Direction, scope_only: bool) -> bool {
        if scope_only && !message.is_in_scope() {
            return false;
        }
        self.modes.forces_break(direction) || !self.registry.is_empty()
    }

    pub async fn handle_request(&self, message: &mut HttpMessage, scope_only: bool) -> bool {
        self.intercept(message, Direction::Request, scope_only).await
    }

    pub async fn handle_response(&self, message: &mut HttpMessage, scope_only: bool) -> bool {
        self.intercept(message, Direction::Response, scope_only).await
    }

    /// Returns true to forward the (possibly edited) message, false to drop it.
    pub async fn intercept(&self, message: &mut HttpMessage, direction: Direction, scope_only: bool) -> bool {
        if !self.is_breakpoint(message, direction, scope_only) {
            return true;
        }
        BreakpointStats::incr(&self.stats.matched);

        // Signalled before queueing at the gate: the operator surface resets
        // for this hit rather than for ones already waiting.
        self.hold.breakpoint_hit();
        self.notify_hit();

        let disposition = {
            let _gate = self.gate.lock().await;
            if self.hold.is_hold_requested() {
                self.hold_message(message, direction).await
            } else {
                Disposition::Continue
            }
        };

        self.clear_and_disable(direction).await;

        let forward = disposition.forwards();
        if forward {
            BreakpointStats::incr(&self.stats.forwarded);
        } else {
            info!("Dropping {} {} {}", direction, message.request.method, message.request.url);
            BreakpointStats::incr(&self.stats.dropped);
        }
        forward
    }

    /// Display the message and suspend until the operator releases it.
    /// Must be called with the gate held.
    async fn hold_message(&self, message: &mut HttpMessage, direction: Direction) -> Disposition {
        let mut episode = self.hold.begin_display();
        BreakpointStats::incr(&self.stats.held);
        info!(
            "Holding {} {} {} (episode {})",
            direction,
            message.request.method,
            message.request.url,
            episode.id()
        );

        if !self.display(message, direction).await {
            // Nobody can see it, so nobody can release it
            return Disposition::Continue;
        }

        let disposition = episode.wait_released().await;
        self.save_edits(message, direction).await;
        disposition
    }

    fn notify_hit(&self) {
        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| self.sink.breakpoint_hit())) {
            self.ui_failure(
                "breakpoint hit",
                BreakpointError::UiPanicked {
                    details: panic_message(payload.as_ref()),
                },
            );
        }
    }

    async fn display(&self, message: &HttpMessage, direction: Direction) -> bool {
        let sink = self.sink.clone();
        let snapshot = message.clone();
        let displayed = self
            .ui
            .invoke_and_wait(move || sink.display_message(&snapshot, direction))
            .await
            .and_then(|shown| shown);
        if let Err(e) = displayed {
            self.ui_failure("display", e);
            return false;
        }

        let sink = self.sink.clone();
        if let Err(e) = self.ui.invoke_and_wait(move || sink.bring_to_front()).await {
            self.ui_failure("bring to front", e);
        }
        true
    }

    async fn save_edits(&self, message: &mut HttpMessage, direction: Direction) {
        let sink = self.sink.clone();
        let mut copy = message.clone();
        let saved = self
            .ui
            .invoke_and_wait(move || {
                sink.save_edits(&mut copy, direction);
                copy
            })
            .await;

        match saved {
            Ok(edited) => {
                if edited != *message {
                    debug!("Applying operator edits to {} {}", direction, message.id);
                }
                *message = edited;
            }
            Err(e) => self.ui_failure("save edits", e),
        }
    }

    async fn clear_and_disable(&self, direction: Direction) {
        let sink = self.sink.clone();
        if let Err(e) = self
            .ui
            .run_or_invoke(move || sink.clear_and_disable(direction))
            .await
        {
            self.ui_failure("clear and disable", e);
        }
    }

    fn ui_failure(&self, action: &str, error: BreakpointError) {
        BreakpointStats::incr(&self.stats.ui_failures);
        warn!("UI {} failed, proceeding: {}", action, error);
    }
}

impl std::fmt::Debug for BreakpointCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BreakpointCoordinator")
            .field("registry", &self.registry)
            .field("modes", &self.modes.snapshot())
            .field("hold", &self.hold.status())
            .finish()
    }
}
