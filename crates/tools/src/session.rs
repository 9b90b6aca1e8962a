//! Browser session capability used by the built-in tools.

use async_trait::async_trait;
use proto::BrowserError;

/// Scroll direction as named by the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollDirection {
    Up,
    Down,
    Left,
    Right,
}

impl ScrollDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
            Self::Left => "left",
            Self::Right => "right",
        }
    }

    /// Signed (dx, dy) unit vector, with positive y pointing down the page.
    pub fn unit(self) -> (i64, i64) {
        match self {
            Self::Up => (0, -1),
            Self::Down => (0, 1),
            Self::Left => (-1, 0),
            Self::Right => (1, 0),
        }
    }
}

impl std::str::FromStr for ScrollDirection {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "up" => Ok(Self::Up),
            "down" => Ok(Self::Down),
            "left" => Ok(Self::Left),
            "right" => Ok(Self::Right),
            _ => Err(()),
        }
    }
}

/// Imperative actions on a single controllable browser page.
///
/// Coordinates and magnitudes are passed through as the model produced
/// them; implementations decide how to map them onto the viewport.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// URL of the current page.
    async fn current_url(&self) -> Result<String, BrowserError>;
    async fn navigate(&self, url: &str) -> Result<(), BrowserError>;
    async fn go_back(&self) -> Result<(), BrowserError>;
    async fn go_forward(&self) -> Result<(), BrowserError>;
    /// Opens the configured search engine start page.
    async fn search(&self) -> Result<(), BrowserError>;
    async fn click_at(&self, x: i64, y: i64) -> Result<(), BrowserError>;
    async fn hover_at(&self, x: i64, y: i64) -> Result<(), BrowserError>;
    async fn type_text_at(
        &self,
        x: i64,
        y: i64,
        text: &str,
        clear_before_typing: bool,
        press_enter: bool,
    ) -> Result<(), BrowserError>;
    /// Presses `keys` together, e.g. `["Control", "c"]`.
    async fn key_combination(&self, keys: &[&str]) -> Result<(), BrowserError>;
    async fn scroll_document(
        &self,
        direction: ScrollDirection,
        magnitude: i64,
    ) -> Result<(), BrowserError>;
    async fn scroll_at(
        &self,
        x: i64,
        y: i64,
        direction: ScrollDirection,
        magnitude: i64,
    ) -> Result<(), BrowserError>;
    async fn drag_and_drop(
        &self,
        x: i64,
        y: i64,
        destination_x: i64,
        destination_y: i64,
    ) -> Result<(), BrowserError>;
    /// PNG screenshot of the viewport.
    async fn screenshot(&self) -> Result<Vec<u8>, BrowserError>;
}
