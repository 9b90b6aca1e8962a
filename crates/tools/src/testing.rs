//! In-memory [`BrowserSession`] for tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use proto::BrowserError;

use crate::session::{BrowserSession, ScrollDirection};

/// Bytes returned by [`RecordingSession::screenshot`]: the PNG signature.
pub const FAKE_PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

/// One action observed by a [`RecordingSession`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Navigate(String),
    GoBack,
    GoForward,
    Search,
    ClickAt(i64, i64),
    HoverAt(i64, i64),
    TypeTextAt {
        x: i64,
        y: i64,
        text: String,
        clear_before_typing: bool,
        press_enter: bool,
    },
    KeyCombination(Vec<String>),
    ScrollDocument(ScrollDirection, i64),
    ScrollAt(i64, i64, ScrollDirection, i64),
    DragAndDrop(i64, i64, i64, i64),
    Screenshot,
}

/// Records every action and answers with canned values.
pub struct RecordingSession {
    url: Mutex<String>,
    actions: Mutex<Vec<Action>>,
    fail_actions: bool,
    fail_screenshots: bool,
}

impl RecordingSession {
    /// Session that starts on `url` and succeeds at everything.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: Mutex::new(url.into()),
            actions: Mutex::new(Vec::new()),
            fail_actions: false,
            fail_screenshots: false,
        }
    }

    /// Makes every non-screenshot action fail.
    pub fn failing_actions(mut self) -> Self {
        self.fail_actions = true;
        self
    }

    /// Makes every screenshot fail.
    pub fn failing_screenshots(mut self) -> Self {
        self.fail_screenshots = true;
        self
    }

    /// Actions recorded so far, screenshots included.
    pub fn actions(&self) -> Vec<Action> {
        self.actions.lock().clone()
    }

    /// Actions recorded so far, without screenshots.
    pub fn browser_actions(&self) -> Vec<Action> {
        self.actions
            .lock()
            .iter()
            .filter(|a| **a != Action::Screenshot)
            .cloned()
            .collect()
    }

    fn record(&self, action: Action) -> Result<(), BrowserError> {
        if self.fail_actions {
            return Err(BrowserError::Cdp(format!("{action:?} refused")));
        }
        self.actions.lock().push(action);
        Ok(())
    }
}

#[async_trait]
impl BrowserSession for RecordingSession {
    async fn current_url(&self) -> Result<String, BrowserError> {
        Ok(self.url.lock().clone())
    }

    async fn navigate(&self, url: &str) -> Result<(), BrowserError> {
        self.record(Action::Navigate(url.to_string()))?;
        *self.url.lock() = url.to_string();
        Ok(())
    }

    async fn go_back(&self) -> Result<(), BrowserError> {
        self.record(Action::GoBack)
    }

    async fn go_forward(&self) -> Result<(), BrowserError> {
        self.record(Action::GoForward)
    }

    async fn search(&self) -> Result<(), BrowserError> {
        self.record(Action::Search)?;
        *self.url.lock() = "https://www.google.com".to_string();
        Ok(())
    }

    async fn click_at(&self, x: i64, y: i64) -> Result<(), BrowserError> {
        self.record(Action::ClickAt(x, y))
    }

    async fn hover_at(&self, x: i64, y: i64) -> Result<(), BrowserError> {
        self.record(Action::HoverAt(x, y))
    }

    async fn type_text_at(
        &self,
        x: i64,
        y: i64,
        text: &str,
        clear_before_typing: bool,
        press_enter: bool,
    ) -> Result<(), BrowserError> {
        self.record(Action::TypeTextAt {
            x,
            y,
            text: text.to_string(),
            clear_before_typing,
            press_enter,
        })
    }

    async fn key_combination(&self, keys: &[&str]) -> Result<(), BrowserError> {
        self.record(Action::KeyCombination(
            keys.iter().map(|k| k.to_string()).collect(),
        ))
    }

    async fn scroll_document(
        &self,
        direction: ScrollDirection,
        magnitude: i64,
    ) -> Result<(), BrowserError> {
        self.record(Action::ScrollDocument(direction, magnitude))
    }

    async fn scroll_at(
        &self,
        x: i64,
        y: i64,
        direction: ScrollDirection,
        magnitude: i64,
    ) -> Result<(), BrowserError> {
        self.record(Action::ScrollAt(x, y, direction, magnitude))
    }

    async fn drag_and_drop(
        &self,
        x: i64,
        y: i64,
        destination_x: i64,
        destination_y: i64,
    ) -> Result<(), BrowserError> {
        self.record(Action::DragAndDrop(x, y, destination_x, destination_y))
    }

    async fn screenshot(&self) -> Result<Vec<u8>, BrowserError> {
        if self.fail_screenshots {
            return Err(BrowserError::Cdp("screenshot refused".to_string()));
        }
        self.actions.lock().push(Action::Screenshot);
        Ok(FAKE_PNG.to_vec())
    }
}
