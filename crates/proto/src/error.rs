use std::time::Duration;

use thiserror::Error;

/// Terminal failure of a conversation loop.
///
/// Every variant ends the loop; the caller observes it as the single
/// `Error` event before the event channel closes.
#[derive(Debug, Error)]
pub enum LoopError {
    /// The model client call failed.
    #[error("Request failed: {0}")]
    RequestFailed(#[from] LlmError),

    /// A built-in tool call failed.
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    /// The caller rejected a custom tool call.
    #[error("Function call {name} rejected: {cause}")]
    CustomRejected { name: String, cause: String },

    /// No response arrived for a custom tool call within the configured timeout.
    #[error("Function call {name} timed out after {timeout:?}")]
    CustomTimedOut { name: String, timeout: Duration },

    /// Every handle for a custom tool call was dropped without settling it.
    #[error("Function call {name} was dropped without a response")]
    HandleDropped { name: String },

    /// The caller denied a safety confirmation.
    #[error("Safety confirmation denied for {name}")]
    SafetyDenied { name: String },

    /// The loop ran for more model turns than allowed.
    #[error("Max turns ({0}) exceeded")]
    MaxTurnsExceeded(usize),

    /// The event receiver was dropped by the caller.
    #[error("Event channel closed")]
    EventChannelClosed,

    /// The loop's cancellation signal fired.
    #[error("Cancelled")]
    Cancelled,
}

/// Model client errors
#[derive(Debug, Error)]
pub enum LlmError {
    /// Remote API failure.
    #[error("{0}")]
    Api(String),

    /// Provider throttled the request.
    #[error("Rate limit exceeded")]
    RateLimit,

    /// Provider response schema/content was invalid.
    #[error("Invalid response from model: {0}")]
    InvalidResponse(String),

    /// Serialization/deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Browser session errors
#[derive(Debug, Error)]
pub enum BrowserError {
    /// Browser process could not be started or configured.
    #[error("Failed to launch browser: {0}")]
    Launch(String),

    /// A DevTools protocol command failed.
    #[error("CDP error: {0}")]
    Cdp(String),

    /// The page did not settle in time.
    #[error("Timed out after {0}s")]
    Timeout(u64),
}

/// Built-in tool execution errors
#[derive(Debug, Error)]
pub enum ToolError {
    /// Name is not in the built-in catalogue.
    #[error("Unknown built-in tool: {0}")]
    UnknownTool(String),

    /// A required argument is missing or has the wrong type.
    #[error("Invalid argument `{field}` for {tool}")]
    InvalidArgument { tool: String, field: String },

    /// The browser action itself failed.
    #[error("{tool} failed: {source}")]
    ActionFailed {
        tool: String,
        #[source]
        source: BrowserError,
    },

    /// The post-action screenshot could not be captured.
    #[error("Failed to take screenshot: {0}")]
    ScreenshotFailed(#[source] BrowserError),
}

impl ToolError {
    /// Shorthand for [`ToolError::InvalidArgument`].
    pub fn invalid_argument(tool: impl Into<String>, field: impl Into<String>) -> Self {
        Self::InvalidArgument {
            tool: tool.into(),
            field: field.into(),
        }
    }
}

/// Errors returned to the caller when settling a handle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettleError {
    /// The handle was already responded to, rejected, approved, or denied.
    #[error("Already settled")]
    AlreadySettled,

    /// The loop stopped waiting for this handle (cancelled, failed, or finished).
    #[error("The loop no longer waits for this call")]
    Abandoned,

    /// Built-in calls are executed by the loop and take no response.
    #[error("Call does not need action")]
    NotActionable,
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required field was not provided.
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// A field has an invalid value and reason.
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    /// Filesystem read error.
    #[error("IO error reading config: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parse error.
    #[error("TOML parse error: {0}")]
    Toml(String),
}
