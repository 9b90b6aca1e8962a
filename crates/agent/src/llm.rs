//! Model client abstraction and the fixed generation configuration.

use async_trait::async_trait;
use proto::{FunctionDeclaration, LlmError, Turn};

/// Model used when the caller does not pick one.
pub const DEFAULT_MODEL: &str = "gemini-2.5-computer-use-preview-10-2025";

const DEFAULT_TEMPERATURE: f32 = 0.2;

/// Environment the computer-use tool operates in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Browser,
}

/// Declaration of the predefined computer-use tool.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ComputerUseDeclaration {
    pub environment: Environment,
    /// Predefined functions the model must not call.
    pub excluded_functions: Vec<String>,
}

/// Generation settings sent with every request of a loop.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationConfig {
    pub temperature: f32,
    /// Ask the model to return its reasoning as thought parts.
    pub include_thoughts: bool,
    pub computer_use: ComputerUseDeclaration,
    /// Caller-handled tools offered alongside computer use.
    pub functions: Vec<FunctionDeclaration>,
}

impl GenerationConfig {
    /// The loop's configuration: computer use in a browser plus `functions`.
    pub fn computer_use(
        functions: Vec<FunctionDeclaration>,
        excluded_functions: Vec<String>,
    ) -> Self {
        Self {
            temperature: DEFAULT_TEMPERATURE,
            include_thoughts: true,
            computer_use: ComputerUseDeclaration {
                environment: Environment::Browser,
                excluded_functions,
            },
            functions,
        }
    }
}

/// Request to the model. Borrows the history so it is never copied per turn.
#[derive(Debug, Clone, Copy)]
pub struct GenerateRequest<'a> {
    pub model: &'a str,
    pub history: &'a [Turn],
    pub config: &'a GenerationConfig,
}

/// Generative model client
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Sends the conversation and returns the model's next turn.
    async fn generate(&self, req: GenerateRequest<'_>) -> Result<Turn, LlmError>;
}
