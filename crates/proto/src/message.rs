use serde::{Deserialize, Serialize};

use crate::tool::{ToolCall, ToolResult};

/// Author of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The caller: the initial prompt and every tool-results turn.
    User,
    /// The generative model.
    Model,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Model => write!(f, "model"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = crate::error::LlmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "model" => Ok(Role::Model),
            other => Err(crate::error::LlmError::InvalidResponse(format!(
                "invalid role: {other}"
            ))),
        }
    }
}

/// One atomic piece of a turn's content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Part {
    /// Plain text. `thought` marks model reasoning.
    Text {
        text: String,
        #[serde(default)]
        thought: bool,
    },
    /// Tool call requested by the model.
    ToolCall(ToolCall),
    /// Tool result returned by the caller.
    ToolResult(ToolResult),
}

impl Part {
    /// Plain (non-thought) text part.
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text {
            text: text.into(),
            thought: false,
        }
    }
}

/// One role-tagged unit of conversation history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Turn {
    /// Creates a turn from parts.
    pub fn new(role: Role, parts: Vec<Part>) -> Self {
        Self { role, parts }
    }

    /// Creates a user turn holding a single text part (the initial prompt).
    pub fn user_text(text: impl Into<String>) -> Self {
        Self::new(Role::User, vec![Part::text(text)])
    }

    /// Creates the user turn answering a model turn's tool calls.
    pub fn tool_results(results: Vec<ToolResult>) -> Self {
        Self::new(Role::User, results.into_iter().map(Part::ToolResult).collect())
    }

    /// Concatenates every text part, thoughts included.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                Part::Text { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Tool calls in the order the model issued them.
    pub fn tool_calls(&self) -> Vec<&ToolCall> {
        self.parts
            .iter()
            .filter_map(|part| match part {
                Part::ToolCall(call) => Some(call),
                _ => None,
            })
            .collect()
    }

    /// Whether any tool result in this turn still carries an attachment.
    pub fn has_attachments(&self) -> bool {
        self.parts.iter().any(|part| {
            matches!(part, Part::ToolResult(result) if !result.attachments.is_empty())
        })
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;
    use crate::tool::Payload;

    #[test]
    fn role_display_and_parse_round_trip() {
        for role in [Role::User, Role::Model] {
            let parsed = Role::from_str(&role.to_string()).expect("role should parse");
            assert_eq!(parsed, role);
        }
    }

    #[test]
    fn role_parse_invalid_value_returns_error() {
        let err = Role::from_str("assistant").expect_err("invalid role should fail");
        assert!(err.to_string().contains("assistant"));
    }

    #[test]
    fn text_concatenates_text_parts_and_skips_others() {
        let turn = Turn::new(
            Role::Model,
            vec![
                Part::Text {
                    text: "thinking. ".to_string(),
                    thought: true,
                },
                Part::ToolCall(ToolCall::new("go_back", serde_json::json!({}))),
                Part::text("done"),
            ],
        );
        assert_eq!(turn.text(), "thinking. done");
    }

    #[test]
    fn tool_calls_preserve_order() {
        let turn = Turn::new(
            Role::Model,
            vec![
                Part::ToolCall(ToolCall::new("a", serde_json::json!({}))),
                Part::text("between"),
                Part::ToolCall(ToolCall::new("b", serde_json::json!({}))),
            ],
        );
        let names: Vec<&str> = turn.tool_calls().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn tool_results_turn_is_user_role() {
        let turn = Turn::tool_results(vec![ToolResult::new("x", Payload::new())]);
        assert_eq!(turn.role, Role::User);
        assert_eq!(turn.parts.len(), 1);
        assert!(!turn.has_attachments());
    }

    #[test]
    fn has_attachments_detects_screenshot() {
        let result = ToolResult::new("click_at", Payload::new()).with_screenshot(vec![0u8; 4]);
        let turn = Turn::tool_results(vec![result]);
        assert!(turn.has_attachments());
    }
}
