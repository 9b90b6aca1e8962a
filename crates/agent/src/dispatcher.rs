//! Executes the tool calls of one model turn.

use std::time::Duration;

use proto::{LoopError, Payload, ToolCall, ToolResult};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tools::{BrowserSession, ComputerUseTool, execute_builtin};
use tracing::{debug, info};

use crate::broker::{self, FunctionCallHandle, PendingCall};
use crate::event::{Event, emit};
use crate::tool_registry::ToolRegistry;

const SAFETY_ACKNOWLEDGEMENT: &str = "safety_acknowledgement";
const REQUIRE_CONFIRMATION: &str = "require_confirmation";

/// How one call of the turn gets its result.
enum Step<'c> {
    Builtin(ComputerUseTool, &'c ToolCall),
    Custom(PendingCall),
}

/// Turns the tool calls of a model turn into the results for the next request.
pub struct Dispatcher<'a> {
    pub registry: &'a ToolRegistry,
    pub session: &'a dyn BrowserSession,
    pub events: &'a mpsc::Sender<Event>,
    pub cancel: &'a CancellationToken,
    pub custom_call_timeout: Option<Duration>,
}

impl Dispatcher<'_> {
    /// Reports the turn as one `Progress` event, then resolves every call in order.
    ///
    /// Returns one result per call, `results[i]` answering `calls[i]`. The first
    /// failure aborts the turn and partial results are discarded.
    pub async fn dispatch(
        &self,
        text: String,
        calls: &[ToolCall],
    ) -> Result<Vec<ToolResult>, LoopError> {
        let mut handles = Vec::with_capacity(calls.len());
        let mut steps = Vec::with_capacity(calls.len());
        for call in calls {
            match self.registry.get(&call.name) {
                Some(tool) => {
                    handles.push(FunctionCallHandle::builtin(call));
                    steps.push(Step::Builtin(tool, call));
                }
                None => {
                    let (handle, pending) = broker::register(call);
                    handles.push(handle);
                    steps.push(Step::Custom(pending));
                }
            }
        }

        let custom = handles.iter().filter(|h| h.needs_action()).count();
        debug!(calls = calls.len(), custom, "Dispatching tool calls");
        emit(
            self.events,
            self.cancel,
            Event::Progress {
                text,
                calls: handles,
            },
        )
        .await?;

        let mut results = Vec::with_capacity(steps.len());
        for step in steps {
            let result = match step {
                Step::Builtin(tool, call) => {
                    let extra_fields = self.confirm_if_required(call).await?;
                    execute_builtin(self.session, tool, &call.args, extra_fields).await?
                }
                Step::Custom(pending) => {
                    debug!(name = pending.name(), "Waiting for function call response");
                    pending.wait(self.cancel, self.custom_call_timeout).await?
                }
            };
            results.push(result);
        }
        Ok(results)
    }

    /// Asks the caller to sign off on a call the model flagged, if it did.
    async fn confirm_if_required(&self, call: &ToolCall) -> Result<Payload, LoopError> {
        let mut extra_fields = Payload::new();
        let Some(explanation) = confirmation_request(call) else {
            return Ok(extra_fields);
        };

        info!(tool = %call.name, "Safety confirmation requested");
        let (confirmation, pending) = broker::request_confirmation(call);
        emit(
            self.events,
            self.cancel,
            Event::SafetyConfirmation {
                tool: call.name.clone(),
                explanation,
                confirmation,
            },
        )
        .await?;
        pending.wait(self.cancel).await?;

        extra_fields.insert(
            SAFETY_ACKNOWLEDGEMENT.to_string(),
            Value::String("true".to_string()),
        );
        Ok(extra_fields)
    }
}

/// Explanation of a `require_confirmation` safety decision attached to `call`.
fn confirmation_request(call: &ToolCall) -> Option<String> {
    let decision = call.args.get("safety_decision")?.as_object()?;
    if decision.get("decision").and_then(Value::as_str) != Some(REQUIRE_CONFIRMATION) {
        return None;
    }
    let explanation = decision
        .get("explanation")
        .and_then(Value::as_str)
        .unwrap_or_default();
    Some(explanation.to_string())
}
