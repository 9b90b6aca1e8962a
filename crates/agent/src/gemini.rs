//! Gemini `generateContent` REST client.

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use proto::{FunctionDeclaration, LlmError, Part, Payload, Role, ToolCall, ToolResult, Turn};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::llm::{Environment, GenerateRequest, GenerationConfig, ModelClient};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

// ── Request types ──────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    tools: Vec<GeminiTool>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    role: String,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    thought: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    thought_signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_call: Option<GeminiFunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_response: Option<GeminiFunctionResponse>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiFunctionCall {
    name: String,
    #[serde(default)]
    args: Payload,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiFunctionResponse {
    name: String,
    response: Payload,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponsePart {
    inline_data: InlineData,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiTool {
    #[serde(skip_serializing_if = "Option::is_none")]
    computer_use: Option<ComputerUseTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    function_declarations: Option<Vec<FunctionDeclaration>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ComputerUseTool {
    environment: &'static str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    excluded_predefined_functions: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    temperature: f32,
    thinking_config: ThinkingConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ThinkingConfig {
    include_thoughts: bool,
}

// ── Response types ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<GeminiContent>,
    finish_reason: Option<String>,
}

// ── Client ─────────────────────────────────────────────────────────────────────

/// Gemini API model client.
pub struct GeminiClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl GeminiClient {
    /// Creates a client targeting the public Gemini API endpoint.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    /// Creates a client targeting a custom base URL (useful for proxies/tests).
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ModelClient for GeminiClient {
    async fn generate(&self, req: GenerateRequest<'_>) -> Result<Turn, LlmError> {
        let body = GeminiRequest {
            contents: req.history.iter().map(convert_turn).collect(),
            tools: convert_tools(req.config),
            generation_config: GeminiGenerationConfig {
                temperature: req.config.temperature,
                thinking_config: ThinkingConfig {
                    include_thoughts: req.config.include_thoughts,
                },
            },
        };

        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, req.model
        );
        debug!(
            model = %req.model,
            contents = %body.contents.len(),
            tools = %body.tools.len(),
            "Sending request to Gemini"
        );

        let payload =
            serde_json::to_vec(&body).map_err(|e| LlmError::Serialization(e.to_string()))?;
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(payload)
            .send()
            .await
            .map_err(|e| LlmError::Api(e.to_string()))?;

        let status = response.status();
        debug!(status = %status.as_u16(), "Gemini response received");
        if status.as_u16() == 429 {
            return Err(LlmError::RateLimit);
        }

        let text = response
            .text()
            .await
            .map_err(|e| LlmError::Api(e.to_string()))?;

        if !status.is_success() {
            let preview: String = text.chars().take(500).collect();
            return Err(LlmError::Api(format!("HTTP {status}: {preview}")));
        }

        parse_response(&text)
    }
}

// ── Conversion helpers ─────────────────────────────────────────────────────────

fn parse_response(body: &str) -> Result<Turn, LlmError> {
    let response: GeminiResponse = serde_json::from_str(body).map_err(|e| {
        LlmError::InvalidResponse(format!(
            "Deserialization error: {e}; body: {}",
            body.chars().take(200).collect::<String>()
        ))
    })?;

    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::InvalidResponse("No candidates in response".into()))?;
    let content = candidate.content.ok_or_else(|| {
        LlmError::InvalidResponse(format!(
            "Candidate has no content (finish reason: {})",
            candidate.finish_reason.as_deref().unwrap_or("unknown")
        ))
    })?;

    Ok(Turn::new(
        Role::Model,
        content.parts.into_iter().filter_map(convert_part_back).collect(),
    ))
}

fn convert_turn(turn: &Turn) -> GeminiContent {
    GeminiContent {
        role: turn.role.to_string(),
        parts: turn.parts.iter().map(convert_part).collect(),
    }
}

fn convert_part(part: &Part) -> GeminiPart {
    match part {
        Part::Text { text, thought } => GeminiPart {
            text: Some(text.clone()),
            thought: *thought,
            ..Default::default()
        },
        Part::ToolCall(call) => GeminiPart {
            thought_signature: call.signature.clone(),
            function_call: Some(GeminiFunctionCall {
                name: call.name.clone(),
                args: call.args.clone(),
            }),
            ..Default::default()
        },
        Part::ToolResult(result) => GeminiPart {
            function_response: Some(convert_result(result)),
            ..Default::default()
        },
    }
}

fn convert_result(result: &ToolResult) -> GeminiFunctionResponse {
    GeminiFunctionResponse {
        name: result.name.clone(),
        response: result.payload.clone(),
        parts: result
            .attachments
            .iter()
            .map(|attachment| GeminiResponsePart {
                inline_data: InlineData {
                    mime_type: attachment.mime_type.clone(),
                    data: general_purpose::STANDARD.encode(&attachment.data),
                },
            })
            .collect(),
    }
}

/// Maps a response part onto the conversation model; unsupported kinds are dropped.
fn convert_part_back(part: GeminiPart) -> Option<Part> {
    if let Some(call) = part.function_call {
        return Some(Part::ToolCall(ToolCall {
            name: call.name,
            args: call.args,
            signature: part.thought_signature,
        }));
    }
    part.text.map(|text| Part::Text {
        text,
        thought: part.thought,
    })
}

fn convert_tools(config: &GenerationConfig) -> Vec<GeminiTool> {
    let environment = match config.computer_use.environment {
        Environment::Browser => "ENVIRONMENT_BROWSER",
    };
    let mut tools = vec![GeminiTool {
        computer_use: Some(ComputerUseTool {
            environment,
            excluded_predefined_functions: config.computer_use.excluded_functions.clone(),
        }),
        ..Default::default()
    }];
    if !config.functions.is_empty() {
        tools.push(GeminiTool {
            function_declarations: Some(config.functions.clone()),
            ..Default::default()
        });
    }
    tools
}

// ── Tests ──────────────────────────────────────────────────────────────────────
