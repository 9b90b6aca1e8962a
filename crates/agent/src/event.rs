//! Events a running loop reports to its caller.

use proto::LoopError;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::broker::{FunctionCallHandle, SafetyConfirmation};

/// Outbound event from a conversation loop.
///
/// Events arrive in order. After an [`Event::Error`] the channel closes.
#[derive(Debug)]
pub enum Event {
    /// The model answered. `calls` is empty on the final turn.
    Progress {
        /// Every text part of the model turn, thoughts included.
        text: String,
        /// One handle per tool call, in the order the model issued them.
        calls: Vec<FunctionCallHandle>,
    },
    /// A built-in call waits for human sign-off before it runs.
    SafetyConfirmation {
        tool: String,
        explanation: String,
        confirmation: SafetyConfirmation,
    },
    /// The loop failed and stopped.
    Error(LoopError),
}

/// Discriminant of [`Event`], handy for logging and assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Progress,
    SafetyConfirmation,
    Error,
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Progress { .. } => EventKind::Progress,
            Event::SafetyConfirmation { .. } => EventKind::SafetyConfirmation,
            Event::Error(_) => EventKind::Error,
        }
    }

    /// Whether this is the last event of a loop.
    pub fn is_terminal(&self) -> bool {
        match self {
            Event::Progress { calls, .. } => calls.is_empty(),
            Event::SafetyConfirmation { .. } => false,
            Event::Error(_) => true,
        }
    }
}

/// Sends `event`, giving up when the loop is cancelled or the receiver is gone.
pub(crate) async fn emit(
    events: &mpsc::Sender<Event>,
    cancel: &CancellationToken,
    event: Event,
) -> Result<(), LoopError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(LoopError::Cancelled),
        sent = events.send(event) => sent.map_err(|_| LoopError::EventChannelClosed),
    }
}
