use crate::hold::{Disposition, HoldState, HoldStatus};
use crate::modes::{BreakModes, BreakModesSnapshot};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

/// Operator side of the breakpoint coordinator.
///
/// Cheap to clone; hand one to whatever drives the operator UI.
#[derive(Debug, Clone)]
pub struct BreakController {
    hold: Arc<HoldState>,
    modes: Arc<BreakModes>,
}

impl BreakController {
    pub(crate) fn new(hold: Arc<HoldState>, modes: Arc<BreakModes>) -> Self {
        Self { hold, modes }
    }

    /// Forward the displayed message and leave stepping mode.
    /// Returns false when no message was displayed.
    pub fn resume(&self) -> bool {
        self.modes.set_stepping(false);
        self.release(Disposition::Continue)
    }

    /// Forward the displayed message and hold the next one, whatever it is.
    pub fn step(&self) -> bool {
        self.modes.set_stepping(true);
        self.release(Disposition::Step)
    }

    /// Discard the displayed message
    pub fn drop_message(&self) -> bool {
        self.release(Disposition::Drop)
    }

    fn release(&self, disposition: Disposition) -> bool {
        match self.hold.release(disposition) {
            Some(episode) => {
                info!("Operator released episode {} ({:?})", episode, disposition);
                true
            }
            None => {
                debug!("{:?} requested but no message is held", disposition);
                false
            }
        }
    }

    pub fn is_holding(&self) -> bool {
        self.hold.is_displayed()
    }

    pub fn status(&self) -> HoldStatus {
        self.hold.status()
    }

    /// Watch hold state changes (e.g. to enable the continue button)
    pub fn subscribe(&self) -> watch::Receiver<HoldStatus> {
        self.hold.subscribe()
    }

    pub fn set_break_on_all_requests(&self, enabled: bool) {
        info!("Break on all requests: {}", enabled);
        self.modes.set_break_on_all_requests(enabled);
    }

    pub fn set_break_on_all_responses(&self, enabled: bool) {
        info!("Break on all responses: {}", enabled);
        self.modes.set_break_on_all_responses(enabled);
    }

    pub fn set_stepping(&self, enabled: bool) {
        self.modes.set_stepping(enabled);
    }

    pub fn modes(&self) -> BreakModesSnapshot {
        self.modes.snapshot()
    }
}
