//! Display sink: where held messages are shown to the operator
//!
//! Every method except `breakpoint_hit` is called on the [`UiContext`]
//! thread.
//!
//! [`UiContext`]: crate::ui::UiContext

use crate::error::BreakpointError;
use crate::message::{Direction, HttpMessage};
use crate::Result;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

pub trait DisplaySink: Send + Sync + 'static {
    /// A new hold episode is about to queue. Called on the proxy task.
    fn breakpoint_hit(&self) {}

    /// Show the held message. An error means the operator cannot see it, so
    /// the coordinator forwards the message instead of holding it.
    fn display_message(&self, message: &HttpMessage, direction: Direction) -> Result<()>;

    /// The message is displayed; raise the UI
    fn bring_to_front(&self) {}

    /// Write operator edits for `direction` back into `message`
    fn save_edits(&self, message: &mut HttpMessage, direction: Direction);

    fn clear_and_disable(&self, direction: Direction);
}

/// Notification published by [`ChannelSink`]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BreakEvent {
    Hit,
    Displayed {
        message: HttpMessage,
        direction: Direction,
    },
    BroughtToFront,
    Cleared {
        direction: Direction,
    },
}

/// Sink for operator front-ends that live elsewhere (another process, a web
/// UI). Display calls become [`BreakEvent`]s on a channel; edits come back
/// through [`ChannelSink::submit_edit`].
#[derive(Debug)]
pub struct ChannelSink {
    events: mpsc::Sender<BreakEvent>,
    edits: DashMap<Direction, HttpMessage>,
}

impl ChannelSink {
    pub fn new(events: mpsc::Sender<BreakEvent>) -> Self {
        Self {
            events,
            edits: DashMap::new(),
        }
    }

    /// Create a sink together with the receiving end of its events
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<BreakEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }

    /// Stage an edited copy of the displayed message. Applied on release if
    /// it still refers to the message being held.
    pub fn submit_edit(&self, direction: Direction, edited: HttpMessage) {
        debug!("Edit staged for {} {}", direction, edited.id);
        self.edits.insert(direction, edited);
    }

    fn try_publish(&self, event: BreakEvent) -> Result<()> {
        self.events
            .try_send(event)
            .map_err(|e| BreakpointError::UiUnavailable {
                reason: format!("event channel rejected event: {}", e),
            })
    }

    fn publish(&self, event: BreakEvent) {
        if let Err(e) = self.try_publish(event) {
            warn!("Failed to publish break event: {}", e);
        }
    }
}

impl DisplaySink for ChannelSink {
    fn breakpoint_hit(&self) {
        self.publish(BreakEvent::Hit);
    }

    fn display_message(&self, message: &HttpMessage, direction: Direction) -> Result<()> {
        // Anything staged earlier belongs to a message that is gone
        self.edits.remove(&direction);
        self.try_publish(BreakEvent::Displayed {
            message: message.clone(),
            direction,
        })
    }

    fn bring_to_front(&self) {
        self.publish(BreakEvent::BroughtToFront);
    }

    fn save_edits(&self, message: &mut HttpMessage, direction: Direction) {
        let Some((_, edited)) = self.edits.remove(&direction) else {
            return;
        };
        if edited.id != message.id {
            warn!(
                "Discarding stale {} edit for {} (held message is {})",
                direction, edited.id, message.id
            );
            return;
        }
        *message = edited;
    }

    fn clear_and_disable(&self, direction: Direction) {
        self.publish(BreakEvent::Cleared { direction });
    }
}
