//! Browser computer-use conversation loop.
//!
//! [`start_loop`] drives a model through a task in a browser: built-in
//! computer-use calls run against the [`tools::BrowserSession`], custom calls
//! are handed to the caller through [`Event::Progress`] handles.

pub mod broker;
pub mod dispatcher;
pub mod event;
pub mod gemini;
pub mod llm;
pub mod pruner;
pub mod runtime;
pub mod tool_registry;

/// Caller-facing call handles and safety confirmations.
pub use broker::{FunctionCallHandle, SafetyConfirmation};
/// Loop events.
pub use event::{Event, EventKind};
/// Gemini REST client.
pub use gemini::GeminiClient;
/// Model client interface and generation settings.
pub use llm::{DEFAULT_MODEL, GenerateRequest, GenerationConfig, ModelClient};
/// Screenshot retention policy.
pub use pruner::RetentionWindow;
/// Loop entry point.
pub use runtime::{LoopConfig, LoopHandle, start_loop};
/// Built-in tool lookup.
pub use tool_registry::ToolRegistry;
