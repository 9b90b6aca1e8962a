use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// JSON object carried by tool calls and tool results.
pub type Payload = Map<String, Value>;

/// MIME type of screenshots attached to built-in tool results.
pub const PNG_MIME_TYPE: &str = "image/png";

/// A tool call requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Tool name chosen by the model.
    pub name: String,
    /// Arguments as produced by the model.
    #[serde(default)]
    pub args: Payload,
    /// Opaque signature attached by the model, echoed back unchanged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl ToolCall {
    /// Creates a call without a signature.
    ///
    /// Non-object `args` are treated as no arguments.
    pub fn new(name: impl Into<String>, args: Value) -> Self {
        let args = match args {
            Value::Object(map) => map,
            _ => Payload::new(),
        };
        Self {
            name: name.into(),
            args,
            signature: None,
        }
    }
}

/// Binary data attached to a tool result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl Attachment {
    /// PNG image attachment.
    pub fn png(data: Vec<u8>) -> Self {
        Self {
            mime_type: PNG_MIME_TYPE.to_string(),
            data,
        }
    }
}

/// Result of one tool call, sent back to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Name of the tool call this result answers.
    pub name: String,
    /// Structured response.
    pub payload: Payload,
    /// Binary attachments (screenshots). May be emptied by history pruning.
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl ToolResult {
    /// Creates a result without attachments.
    pub fn new(name: impl Into<String>, payload: Payload) -> Self {
        Self {
            name: name.into(),
            payload,
            attachments: Vec::new(),
        }
    }

    /// Attaches a PNG screenshot.
    pub fn with_screenshot(mut self, png: Vec<u8>) -> Self {
        self.attachments.push(Attachment::png(png));
        self
    }
}

/// Declaration of a caller-handled tool offered to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDeclaration {
    /// Unique tool name exposed to the model.
    pub name: String,
    /// Human-readable description for tool selection.
    pub description: String,
    /// JSON schema for accepted arguments.
    pub parameters: Value,
}

impl FunctionDeclaration {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}
