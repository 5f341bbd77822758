//! Hold state machine
//!
//! `Idle -> Displayed -> Idle`, one episode per held message. The state lives
//! in a `tokio::sync::watch` channel so a waiting proxy task wakes as soon as
//! the operator releases its episode, and an operator surface can subscribe
//! to phase changes.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// The operator's decision for a held message
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Disposition {
    /// Not decided yet
    #[default]
    None,
    /// Forward the message
    Continue,
    /// Discard the message
    Drop,
    /// Forward the message and hold the next one regardless of rules
    Step,
}

impl Disposition {
    /// Whether the message is forwarded to its destination
    pub fn forwards(self) -> bool {
        !matches!(self, Disposition::Drop)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HoldPhase {
    Idle,
    Displayed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoldStatus {
    pub phase: HoldPhase,
    /// Episode currently displayed, or the last one displayed when idle
    pub episode: u64,
    /// Disposition recorded when `episode` was released
    pub disposition: Disposition,
    /// Breakpoint hits signalled so far
    pub hits: u64,
    /// Once set, new hits are no longer held
    pub shut_down: bool,
}

impl Default for HoldStatus {
    fn default() -> Self {
        Self {
            phase: HoldPhase::Idle,
            episode: 0,
            disposition: Disposition::None,
            hits: 0,
            shut_down: false,
        }
    }
}

#[derive(Debug)]
pub struct HoldState {
    tx: watch::Sender<HoldStatus>,
}

impl Default for HoldState {
    fn default() -> Self {
        Self::new()
    }
}

impl HoldState {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(HoldStatus::default());
        Self { tx }
    }

    pub fn status(&self) -> HoldStatus {
        *self.tx.borrow()
    }

    /// Receiver notified on every state change
    pub fn subscribe(&self) -> watch::Receiver<HoldStatus> {
        self.tx.subscribe()
    }

    /// A message matched and is about to queue for display.
    ///
    /// Only counts the hit. The disposition of an episode that was already
    /// released is left alone so its owner still reads its own outcome.
    pub fn breakpoint_hit(&self) {
        self.tx.send_modify(|s| s.hits += 1);
    }

    pub fn is_hold_requested(&self) -> bool {
        !self.tx.borrow().shut_down
    }

    pub fn is_displayed(&self) -> bool {
        self.tx.borrow().phase == HoldPhase::Displayed
    }

    /// Move to `Displayed` with a fresh episode.
    ///
    /// Callers serialise through the coordinator gate, so at most one episode
    /// is displayed at a time.
    pub(crate) fn begin_display(self: &Arc<Self>) -> DisplayedEpisode {
        // Subscribe before the transition so the release can't be missed
        let rx = self.tx.subscribe();
        let mut episode = 0;
        self.tx.send_modify(|s| {
            s.episode += 1;
            s.phase = HoldPhase::Displayed;
            s.disposition = Disposition::None;
            episode = s.episode;
        });
        debug!("Hold episode {} displayed", episode);
        DisplayedEpisode {
            hold: Arc::clone(self),
            episode,
            rx,
        }
    }

    /// Release the displayed episode. Returns its id, or `None` when nothing
    /// was displayed.
    pub fn release(&self, disposition: Disposition) -> Option<u64> {
        let disposition = match disposition {
            Disposition::None => Disposition::Continue,
            other => other,
        };
        let mut released = None;
        self.tx.send_if_modified(|s| {
            if s.phase != HoldPhase::Displayed {
                return false;
            }
            s.phase = HoldPhase::Idle;
            s.disposition = disposition;
            released = Some(s.episode);
            true
        });
        if let Some(episode) = released {
            info!("Hold episode {} released with {:?}", episode, disposition);
        }
        released
    }

    /// Release whatever is displayed with `Continue` and stop holding new hits.
    pub fn force_release(&self) {
        self.tx.send_modify(|s| {
            s.shut_down = true;
            if s.phase == HoldPhase::Displayed {
                s.phase = HoldPhase::Idle;
                s.disposition = Disposition::Continue;
            }
        });
        info!("Hold state shut down, held traffic released");
    }

    /// Accept holds again after `force_release`
    pub fn reopen(&self) {
        self.tx.send_modify(|s| s.shut_down = false);
    }

    fn abandon(&self, episode: u64) {
        let abandoned = self.tx.send_if_modified(|s| {
            if s.phase == HoldPhase::Displayed && s.episode == episode {
                s.phase = HoldPhase::Idle;
                s.disposition = Disposition::Continue;
                true
            } else {
                false
            }
        });
        if abandoned {
            warn!("Hold episode {} abandoned by its proxy task", episode);
        }
    }
}

/// Guard for the episode a proxy task is waiting on.
///
/// Dropping it before release (the proxy task was cancelled) returns the hold
/// to `Idle`.
#[derive(Debug)]
pub(crate) struct DisplayedEpisode {
    hold: Arc<HoldState>,
    episode: u64,
    rx: watch::Receiver<HoldStatus>,
}

impl DisplayedEpisode {
    pub(crate) fn id(&self) -> u64 {
        self.episode
    }

    /// Suspend until this episode leaves `Displayed`.
    pub(crate) async fn wait_released(&mut self) -> Disposition {
        let episode = self.episode;
        let released = self
            .rx
            .wait_for(|s| s.episode != episode || s.phase == HoldPhase::Idle)
            .await
            .map(|status| *status);

        match released {
            Ok(status) if status.episode == episode => status.disposition,
            Ok(status) => {
                warn!(
                    "Hold episode {} superseded by episode {}, forwarding",
                    episode, status.episode
                );
                Disposition::Continue
            }
            Err(e) => {
                warn!("Hold wait for episode {} interrupted: {}, forwarding", episode, e);
                Disposition::Continue
            }
        }
    }
}

impl Drop for DisplayedEpisode {
    fn drop(&mut self) {
        self.hold.abandon(self.episode);
    }
}
