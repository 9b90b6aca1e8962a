//! Predefined computer-use tools executed directly against the browser session.

use std::time::Duration;

use proto::{Payload, ToolError, ToolResult};
use serde_json::Value;
use tracing::debug;

use crate::args::{
    optional_bool, optional_int, require_coordinate, require_direction, require_point,
    require_str,
};
use crate::session::BrowserSession;

/// Scroll distance used when the model gives none.
pub const DEFAULT_SCROLL_MAGNITUDE: i64 = 800;

/// Upper bound on a model-supplied scroll distance.
pub const MAX_SCROLL_MAGNITUDE: i64 = 10_000;

const WAIT_DURATION: Duration = Duration::from_secs(5);

/// A predefined computer-use action the loop executes itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComputerUseTool {
    OpenWebBrowser,
    Wait5Seconds,
    GoBack,
    GoForward,
    Search,
    Navigate,
    ClickAt,
    HoverAt,
    TypeTextAt,
    KeyCombination,
    ScrollDocument,
    ScrollAt,
    DragAndDrop,
}

impl ComputerUseTool {
    /// The whole catalogue.
    pub const ALL: [ComputerUseTool; 13] = [
        Self::OpenWebBrowser,
        Self::Wait5Seconds,
        Self::GoBack,
        Self::GoForward,
        Self::Search,
        Self::Navigate,
        Self::ClickAt,
        Self::HoverAt,
        Self::TypeTextAt,
        Self::KeyCombination,
        Self::ScrollDocument,
        Self::ScrollAt,
        Self::DragAndDrop,
    ];

    /// Function name used by the model.
    pub fn name(self) -> &'static str {
        match self {
            Self::OpenWebBrowser => "open_web_browser",
            Self::Wait5Seconds => "wait_5_seconds",
            Self::GoBack => "go_back",
            Self::GoForward => "go_forward",
            Self::Search => "search",
            Self::Navigate => "navigate",
            Self::ClickAt => "click_at",
            Self::HoverAt => "hover_at",
            Self::TypeTextAt => "type_text_at",
            Self::KeyCombination => "key_combination",
            Self::ScrollDocument => "scroll_document",
            Self::ScrollAt => "scroll_at",
            Self::DragAndDrop => "drag_and_drop",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tool| tool.name() == name)
    }

    /// Performs the action and returns `{url}` for the page it left behind.
    pub async fn run(
        self,
        session: &dyn BrowserSession,
        args: &Payload,
    ) -> Result<Payload, ToolError> {
        let name = self.name();
        let failed = |source| ToolError::ActionFailed {
            tool: name.to_string(),
            source,
        };

        match self {
            // The session owns an open browser from the start.
            Self::OpenWebBrowser => {}
            Self::Wait5Seconds => tokio::time::sleep(WAIT_DURATION).await,
            Self::GoBack => session.go_back().await.map_err(failed)?,
            Self::GoForward => session.go_forward().await.map_err(failed)?,
            Self::Search => session.search().await.map_err(failed)?,
            Self::Navigate => {
                let url = require_str(name, args, "url")?;
                session.navigate(url).await.map_err(failed)?;
            }
            Self::ClickAt => {
                let (x, y) = require_point(name, args)?;
                session.click_at(x, y).await.map_err(failed)?;
            }
            Self::HoverAt => {
                let (x, y) = require_point(name, args)?;
                session.hover_at(x, y).await.map_err(failed)?;
            }
            Self::TypeTextAt => {
                let (x, y) = require_point(name, args)?;
                let text = require_str(name, args, "text")?;
                let press_enter = optional_bool(args, "press_enter", true);
                let clear_before_typing = optional_bool(args, "clear_before_typing", true);
                session
                    .type_text_at(x, y, text, clear_before_typing, press_enter)
                    .await
                    .map_err(failed)?;
            }
            Self::KeyCombination => {
                let keys = require_str(name, args, "keys")?;
                let keys: Vec<&str> = keys.split('+').collect();
                session.key_combination(&keys).await.map_err(failed)?;
            }
            Self::ScrollDocument => {
                let direction = require_direction(name, args)?;
                session
                    .scroll_document(direction, DEFAULT_SCROLL_MAGNITUDE)
                    .await
                    .map_err(failed)?;
            }
            Self::ScrollAt => {
                let (x, y) = require_point(name, args)?;
                let direction = require_direction(name, args)?;
                let magnitude = optional_int(args, "magnitude", DEFAULT_SCROLL_MAGNITUDE)
                    .clamp(0, MAX_SCROLL_MAGNITUDE);
                session
                    .scroll_at(x, y, direction, magnitude)
                    .await
                    .map_err(failed)?;
            }
            Self::DragAndDrop => {
                let (x, y) = require_point(name, args)?;
                let destination_x = require_coordinate(name, args, "destination_x")?;
                let destination_y = require_coordinate(name, args, "destination_y")?;
                session
                    .drag_and_drop(x, y, destination_x, destination_y)
                    .await
                    .map_err(failed)?;
            }
        }

        let url = session.current_url().await.map_err(failed)?;
        let mut result = Payload::new();
        result.insert("url".to_string(), Value::String(url));
        Ok(result)
    }
}

impl std::str::FromStr for ComputerUseTool {
    type Err = ToolError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Self::from_name(name).ok_or_else(|| ToolError::UnknownTool(name.to_string()))
    }
}

/// Runs a built-in tool and packages its result with a fresh screenshot.
///
/// `extra_fields` are merged over the tool's own result.
pub async fn execute_builtin(
    session: &dyn BrowserSession,
    tool: ComputerUseTool,
    args: &Payload,
    extra_fields: Payload,
) -> Result<ToolResult, ToolError> {
    debug!(tool = tool.name(), "Executing built-in tool");
    let mut payload = tool.run(session, args).await?;
    payload.extend(extra_fields);

    let screenshot = session
        .screenshot()
        .await
        .map_err(ToolError::ScreenshotFailed)?;
    debug!(tool = tool.name(), bytes = screenshot.len(), "Screenshot captured");

    Ok(ToolResult::new(tool.name(), payload).with_screenshot(screenshot))
}
