//! Shared protocol types for the model client, browser tools, and the loop.
//!
//! This crate defines serializable conversation/tool structures and
//! strongly-typed error enums shared across the workspace.

pub mod error;
pub mod message;
pub mod tool;

/// Re-export of all protocol error types.
pub use error::*;
/// Re-export of conversation types.
pub use message::{Part, Role, Turn};
/// Re-export of tool call, result, and declaration types.
pub use tool::{Attachment, FunctionDeclaration, PNG_MIME_TYPE, Payload, ToolCall, ToolResult};
