//! One-shot settlement of tool calls that wait on the caller.
//!
//! [`register`] pairs a caller-facing [`FunctionCallHandle`] with the
//! [`PendingCall`] the dispatcher awaits. Clones of a handle share a single
//! slot, so exactly one `respond`/`reject` ever takes effect.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use proto::{LoopError, Payload, SettleError, ToolCall, ToolResult};
use serde_json::Value;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// What the caller settled a custom call with.
type Resolution = Result<Payload, String>;

/// Sending half of a one-shot slot, shared by every clone of a handle.
#[derive(Debug)]
struct SettleSlot<T> {
    sender: Arc<Mutex<Option<oneshot::Sender<T>>>>,
}

impl<T> Clone for SettleSlot<T> {
    fn clone(&self) -> Self {
        Self {
            sender: Arc::clone(&self.sender),
        }
    }
}

impl<T> SettleSlot<T> {
    fn channel() -> (Self, oneshot::Receiver<T>) {
        let (sender, receiver) = oneshot::channel();
        let slot = Self {
            sender: Arc::new(Mutex::new(Some(sender))),
        };
        (slot, receiver)
    }

    fn settle(&self, value: T) -> Result<(), SettleError> {
        let mut guard = self.sender.lock();
        match guard.take() {
            None => Err(SettleError::AlreadySettled),
            Some(sender) if sender.is_closed() => {
                // Keep the sender so later attempts report the same thing.
                *guard = Some(sender);
                Err(SettleError::Abandoned)
            }
            Some(sender) => sender.send(value).map_err(|_| SettleError::Abandoned),
        }
    }

    fn is_settled(&self) -> bool {
        self.sender.lock().is_none()
    }
}

/// Caller-facing view of one tool call from a model turn.
///
/// Built-in calls are informational. Custom calls (`needs_action() == true`)
/// must be answered with [`respond`](Self::respond) or
/// [`reject`](Self::reject) before the loop can continue.
#[derive(Debug, Clone)]
pub struct FunctionCallHandle {
    name: String,
    args: Payload,
    slot: Option<SettleSlot<Resolution>>,
}

impl FunctionCallHandle {
    /// Handle for a call the loop executes itself.
    pub fn builtin(call: &ToolCall) -> Self {
        Self {
            name: call.name.clone(),
            args: call.args.clone(),
            slot: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn args(&self) -> &Payload {
        &self.args
    }

    /// Whether the caller has to settle this call.
    pub fn needs_action(&self) -> bool {
        self.slot.is_some()
    }

    /// Whether a response or rejection was already delivered.
    pub fn is_settled(&self) -> bool {
        self.slot.as_ref().is_some_and(SettleSlot::is_settled)
    }

    /// Answers the call. A non-object payload is sent as `{"output": payload}`.
    pub fn respond(&self, payload: Value) -> Result<(), SettleError> {
        let payload = match payload {
            Value::Object(map) => map,
            other => {
                let mut map = Payload::new();
                map.insert("output".to_string(), other);
                map
            }
        };
        self.settle(Ok(payload))
    }

    /// Fails the call, which ends the loop with `CustomRejected`.
    pub fn reject(&self, cause: impl Into<String>) -> Result<(), SettleError> {
        self.settle(Err(cause.into()))
    }

    fn settle(&self, resolution: Resolution) -> Result<(), SettleError> {
        let slot = self.slot.as_ref().ok_or(SettleError::NotActionable)?;
        slot.settle(resolution)?;
        debug!(name = %self.name, "Function call settled");
        Ok(())
    }
}

/// Dispatcher side of a custom call.
#[derive(Debug)]
pub struct PendingCall {
    name: String,
    receiver: oneshot::Receiver<Resolution>,
}

impl PendingCall {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Waits until the caller settles the call.
    ///
    /// Cancellation wins over a settlement arriving at the same time. Dropping
    /// the returned future abandons the call, after which the handle reports
    /// [`SettleError::Abandoned`].
    pub async fn wait(
        self,
        cancel: &CancellationToken,
        timeout: Option<Duration>,
    ) -> Result<ToolResult, LoopError> {
        let Self { name, receiver } = self;
        let received = async move {
            match timeout {
                Some(limit) => tokio::time::timeout(limit, receiver).await.ok(),
                None => Some(receiver.await),
            }
        };

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(LoopError::Cancelled),
            outcome = received => outcome,
        };

        match outcome {
            Some(Ok(Ok(payload))) => Ok(ToolResult::new(name, payload)),
            Some(Ok(Err(cause))) => Err(LoopError::CustomRejected { name, cause }),
            Some(Err(_)) => Err(LoopError::HandleDropped { name }),
            None => Err(LoopError::CustomTimedOut {
                name,
                timeout: timeout.unwrap_or_default(),
            }),
        }
    }
}

/// Creates the settlement slot for a custom call.
pub fn register(call: &ToolCall) -> (FunctionCallHandle, PendingCall) {
    let (slot, receiver) = SettleSlot::channel();
    let handle = FunctionCallHandle {
        name: call.name.clone(),
        args: call.args.clone(),
        slot: Some(slot),
    };
    let pending = PendingCall {
        name: call.name.clone(),
        receiver,
    };
    (handle, pending)
}

/// Caller's answer to a call the model flagged for human confirmation.
#[derive(Debug, Clone)]
pub struct SafetyConfirmation {
    slot: SettleSlot<bool>,
}

impl SafetyConfirmation {
    /// Lets the flagged call run.
    pub fn approve(&self) -> Result<(), SettleError> {
        self.slot.settle(true)
    }

    /// Refuses the flagged call, which ends the loop with `SafetyDenied`.
    pub fn deny(&self) -> Result<(), SettleError> {
        self.slot.settle(false)
    }
}

/// Dispatcher side of a [`SafetyConfirmation`].
#[derive(Debug)]
pub struct PendingConfirmation {
    name: String,
    receiver: oneshot::Receiver<bool>,
}

impl PendingConfirmation {
    /// Waits for approval. Denial and a dropped confirmation both fail.
    pub async fn wait(self, cancel: &CancellationToken) -> Result<(), LoopError> {
        let Self { name, receiver } = self;
        let decision = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(LoopError::Cancelled),
            decision = receiver => decision,
        };
        match decision {
            Ok(true) => Ok(()),
            Ok(false) => Err(LoopError::SafetyDenied { name }),
            Err(_) => Err(LoopError::HandleDropped { name }),
        }
    }
}

/// Creates the confirmation slot for a flagged built-in call.
pub fn request_confirmation(call: &ToolCall) -> (SafetyConfirmation, PendingConfirmation) {
    let (slot, receiver) = SettleSlot::channel();
    let pending = PendingConfirmation {
        name: call.name.clone(),
        receiver,
    };
    (SafetyConfirmation { slot }, pending)
}
