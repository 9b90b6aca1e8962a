//! Browser session backed by Chromium CDP.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::Page;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchKeyEventParams, DispatchKeyEventType, DispatchMouseEventParams,
    DispatchMouseEventType, InsertTextParams, MouseButton,
};
use chromiumoxide::cdp::browser_protocol::page::{
    CaptureScreenshotFormat, GetNavigationHistoryParams, NavigateToHistoryEntryParams,
};
use chromiumoxide::page::ScreenshotParams;
use futures_util::StreamExt;
use proto::BrowserError;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::debug;

use crate::session::{BrowserSession, ScrollDirection};

/// Side length of the grid the model's coordinates are expressed on.
const NORMALIZED_GRID: f64 = 1000.0;
const DEFAULT_TIMEOUT_SECS: u64 = 15;

const MODIFIER_ALT: i64 = 1;
const MODIFIER_CONTROL: i64 = 2;
const MODIFIER_META: i64 = 4;
const MODIFIER_SHIFT: i64 = 8;

/// Launch settings for [`CdpSession`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub screen_width: u32,
    pub screen_height: u32,
    /// Page opened when the session starts.
    pub initial_url: String,
    /// Page opened by the `search` tool.
    pub search_url: String,
    /// Interpret coordinates and scroll magnitudes on a 1000x1000 grid.
    pub normalize_coordinates: bool,
    pub headless: bool,
    /// Upper bound for a single browser action.
    pub action_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            screen_width: 1440,
            screen_height: 900,
            initial_url: "https://www.google.com".to_string(),
            search_url: "https://www.google.com".to_string(),
            normalize_coordinates: true,
            headless: true,
            action_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

/// A single Chromium page driven through the DevTools protocol.
pub struct CdpSession {
    config: SessionConfig,
    browser: Mutex<Browser>,
    page: Page,
    handler_task: JoinHandle<()>,
}

impl CdpSession {
    /// Launches Chromium and opens `initial_url` at the configured screen size.
    pub async fn launch(config: SessionConfig) -> Result<Self, BrowserError> {
        let mut builder = BrowserConfig::builder()
            .window_size(config.screen_width, config.screen_height)
            .viewport(None);
        if !config.headless {
            builder = builder.with_head();
        }
        let browser_config = builder
            .build()
            .map_err(|e| BrowserError::Launch(format!("Failed to build browser config: {e}")))?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| BrowserError::Launch(e.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| BrowserError::Launch(format!("Failed to create page: {e}")))?;

        let session = Self {
            config,
            browser: Mutex::new(browser),
            page,
            handler_task,
        };
        session
            .page
            .execute(SetDeviceMetricsOverrideParams::new(
                i64::from(session.config.screen_width),
                i64::from(session.config.screen_height),
                1.0,
                false,
            ))
            .await
            .map_err(cdp_error)?;
        let initial_url = session.config.initial_url.clone();
        session.navigate(&initial_url).await?;
        debug!(url = %initial_url, "Browser session ready");
        Ok(session)
    }

    /// Closes the browser process.
    pub async fn close(&self) -> Result<(), BrowserError> {
        let mut browser = self.browser.lock().await;
        browser.close().await.map_err(cdp_error)?;
        Ok(())
    }

    async fn bounded<T, F>(&self, action: F) -> Result<T, BrowserError>
    where
        F: Future<Output = Result<T, BrowserError>>,
    {
        timeout(self.config.action_timeout, action)
            .await
            .unwrap_or(Err(BrowserError::Timeout(
                self.config.action_timeout.as_secs(),
            )))
    }

    fn to_pixels_x(&self, x: i64) -> f64 {
        self.scale(x, self.config.screen_width)
    }

    fn to_pixels_y(&self, y: i64) -> f64 {
        self.scale(y, self.config.screen_height)
    }

    fn scale(&self, value: i64, extent: u32) -> f64 {
        if self.config.normalize_coordinates {
            value as f64 * f64::from(extent) / NORMALIZED_GRID
        } else {
            value as f64
        }
    }

    async fn mouse(
        &self,
        kind: DispatchMouseEventType,
        x: f64,
        y: f64,
        button: Option<MouseButton>,
    ) -> Result<(), BrowserError> {
        let mut builder = DispatchMouseEventParams::builder().r#type(kind).x(x).y(y);
        if let Some(button) = button {
            builder = builder.button(button).click_count(1);
        }
        let params = builder.build().map_err(BrowserError::Cdp)?;
        self.page.execute(params).await.map_err(cdp_error)?;
        Ok(())
    }

    async fn click(&self, x: f64, y: f64) -> Result<(), BrowserError> {
        self.mouse(DispatchMouseEventType::MouseMoved, x, y, None)
            .await?;
        self.mouse(
            DispatchMouseEventType::MousePressed,
            x,
            y,
            Some(MouseButton::Left),
        )
        .await?;
        self.mouse(
            DispatchMouseEventType::MouseReleased,
            x,
            y,
            Some(MouseButton::Left),
        )
        .await
    }

    async fn wheel(&self, x: f64, y: f64, dx: f64, dy: f64) -> Result<(), BrowserError> {
        let params = DispatchMouseEventParams::builder()
            .r#type(DispatchMouseEventType::MouseWheel)
            .x(x)
            .y(y)
            .delta_x(dx)
            .delta_y(dy)
            .build()
            .map_err(BrowserError::Cdp)?;
        self.page.execute(params).await.map_err(cdp_error)?;
        Ok(())
    }

    fn scroll_delta(&self, direction: ScrollDirection, magnitude: i64) -> (f64, f64) {
        let (ux, uy) = direction.unit();
        (
            self.scale(ux.saturating_mul(magnitude), self.config.screen_width),
            self.scale(uy.saturating_mul(magnitude), self.config.screen_height),
        )
    }

    async fn key(
        &self,
        kind: DispatchKeyEventType,
        key: &KeyDefinition,
        modifiers: i64,
    ) -> Result<(), BrowserError> {
        let mut builder = DispatchKeyEventParams::builder()
            .r#type(kind.clone())
            .key(key.key.clone())
            .code(key.code.clone())
            .windows_virtual_key_code(key.key_code)
            .modifiers(modifiers);
        // Text input is suppressed while a command modifier is held.
        let command_held = modifiers & (MODIFIER_CONTROL | MODIFIER_META | MODIFIER_ALT) != 0;
        if kind == DispatchKeyEventType::KeyDown
            && !command_held
            && let Some(text) = &key.text
        {
            builder = builder.text(text.clone());
        }
        let params = builder.build().map_err(BrowserError::Cdp)?;
        self.page.execute(params).await.map_err(cdp_error)?;
        Ok(())
    }

    async fn press(&self, keys: &[&str]) -> Result<(), BrowserError> {
        let definitions: Vec<KeyDefinition> = keys.iter().map(|k| key_definition(k)).collect();
        let mut modifiers = 0;
        for definition in &definitions {
            let kind = if definition.text.is_some() {
                DispatchKeyEventType::KeyDown
            } else {
                DispatchKeyEventType::RawKeyDown
            };
            modifiers |= definition.modifier;
            self.key(kind, definition, modifiers).await?;
        }
        for definition in definitions.iter().rev() {
            self.key(DispatchKeyEventType::KeyUp, definition, modifiers)
                .await?;
            modifiers &= !definition.modifier;
        }
        Ok(())
    }

    async fn history_step(&self, offset: i64) -> Result<(), BrowserError> {
        let history = self
            .page
            .execute(GetNavigationHistoryParams::default())
            .await
            .map_err(cdp_error)?;
        let target = history.current_index + offset;
        let Some(entry) = usize::try_from(target)
            .ok()
            .and_then(|index| history.entries.get(index))
        else {
            debug!(target, "No history entry to move to");
            return Ok(());
        };
        self.page
            .execute(NavigateToHistoryEntryParams::new(entry.id))
            .await
            .map_err(cdp_error)?;
        self.page.wait_for_navigation().await.map_err(cdp_error)?;
        Ok(())
    }
}

impl Drop for CdpSession {
    fn drop(&mut self) {
        self.handler_task.abort();
    }
}

#[async_trait]
impl BrowserSession for CdpSession {
    async fn current_url(&self) -> Result<String, BrowserError> {
        let url = self.page.url().await.map_err(cdp_error)?;
        Ok(url.unwrap_or_default())
    }

    async fn navigate(&self, url: &str) -> Result<(), BrowserError> {
        self.bounded(async {
            self.page.goto(url).await.map_err(cdp_error)?;
            Ok(())
        })
        .await
    }

    async fn go_back(&self) -> Result<(), BrowserError> {
        self.bounded(self.history_step(-1)).await
    }

    async fn go_forward(&self) -> Result<(), BrowserError> {
        self.bounded(self.history_step(1)).await
    }

    async fn search(&self) -> Result<(), BrowserError> {
        let url = self.config.search_url.clone();
        self.navigate(&url).await
    }

    async fn click_at(&self, x: i64, y: i64) -> Result<(), BrowserError> {
        let (x, y) = (self.to_pixels_x(x), self.to_pixels_y(y));
        self.bounded(self.click(x, y)).await
    }

    async fn hover_at(&self, x: i64, y: i64) -> Result<(), BrowserError> {
        let (x, y) = (self.to_pixels_x(x), self.to_pixels_y(y));
        self.bounded(self.mouse(DispatchMouseEventType::MouseMoved, x, y, None))
            .await
    }

    async fn type_text_at(
        &self,
        x: i64,
        y: i64,
        text: &str,
        clear_before_typing: bool,
        press_enter: bool,
    ) -> Result<(), BrowserError> {
        let (x, y) = (self.to_pixels_x(x), self.to_pixels_y(y));
        self.bounded(async {
            self.click(x, y).await?;
            if clear_before_typing {
                let select_all = if cfg!(target_os = "macos") {
                    ["Meta", "a"]
                } else {
                    ["Control", "a"]
                };
                self.press(&select_all).await?;
                self.press(&["Backspace"]).await?;
            }
            self.page
                .execute(InsertTextParams::new(text))
                .await
                .map_err(cdp_error)?;
            if press_enter {
                self.press(&["Enter"]).await?;
            }
            Ok(())
        })
        .await
    }

    async fn key_combination(&self, keys: &[&str]) -> Result<(), BrowserError> {
        self.bounded(self.press(keys)).await
    }

    async fn scroll_document(
        &self,
        direction: ScrollDirection,
        magnitude: i64,
    ) -> Result<(), BrowserError> {
        let x = f64::from(self.config.screen_width) / 2.0;
        let y = f64::from(self.config.screen_height) / 2.0;
        let (dx, dy) = self.scroll_delta(direction, magnitude);
        self.bounded(self.wheel(x, y, dx, dy)).await
    }

    async fn scroll_at(
        &self,
        x: i64,
        y: i64,
        direction: ScrollDirection,
        magnitude: i64,
    ) -> Result<(), BrowserError> {
        let (x, y) = (self.to_pixels_x(x), self.to_pixels_y(y));
        let (dx, dy) = self.scroll_delta(direction, magnitude);
        self.bounded(self.wheel(x, y, dx, dy)).await
    }

    async fn drag_and_drop(
        &self,
        x: i64,
        y: i64,
        destination_x: i64,
        destination_y: i64,
    ) -> Result<(), BrowserError> {
        let (x, y) = (self.to_pixels_x(x), self.to_pixels_y(y));
        let (dx, dy) = (self.to_pixels_x(destination_x), self.to_pixels_y(destination_y));
        self.bounded(async {
            self.mouse(DispatchMouseEventType::MouseMoved, x, y, None)
                .await?;
            self.mouse(
                DispatchMouseEventType::MousePressed,
                x,
                y,
                Some(MouseButton::Left),
            )
            .await?;
            self.mouse(DispatchMouseEventType::MouseMoved, dx, dy, None)
                .await?;
            self.mouse(
                DispatchMouseEventType::MouseReleased,
                dx,
                dy,
                Some(MouseButton::Left),
            )
            .await
        })
        .await
    }

    async fn screenshot(&self) -> Result<Vec<u8>, BrowserError> {
        self.bounded(async {
            self.page
                .screenshot(
                    ScreenshotParams::builder()
                        .format(CaptureScreenshotFormat::Png)
                        .build(),
                )
                .await
                .map_err(cdp_error)
        })
        .await
    }
}

fn cdp_error(err: impl std::fmt::Display) -> BrowserError {
    BrowserError::Cdp(err.to_string())
}

/// CDP description of one key.
#[derive(Debug, Clone, PartialEq, Eq)]
struct KeyDefinition {
    key: String,
    code: String,
    key_code: i64,
    text: Option<String>,
    modifier: i64,
}

/// Maps a model key name ("Control", "enter", "a", "F5") onto CDP key fields.
fn key_definition(name: &str) -> KeyDefinition {
    let named = |key: &str, code: &str, key_code: i64, text: Option<&str>, modifier: i64| {
        KeyDefinition {
            key: key.to_string(),
            code: code.to_string(),
            key_code,
            text: text.map(str::to_string),
            modifier,
        }
    };

    match name.trim().to_ascii_lowercase().as_str() {
        "control" | "ctrl" => named("Control", "ControlLeft", 17, None, MODIFIER_CONTROL),
        "shift" => named("Shift", "ShiftLeft", 16, None, MODIFIER_SHIFT),
        "alt" | "option" => named("Alt", "AltLeft", 18, None, MODIFIER_ALT),
        "meta" | "cmd" | "command" | "super" => named("Meta", "MetaLeft", 91, None, MODIFIER_META),
        "enter" | "return" => named("Enter", "Enter", 13, Some("\r"), 0),
        "tab" => named("Tab", "Tab", 9, None, 0),
        "backspace" => named("Backspace", "Backspace", 8, None, 0),
        "delete" => named("Delete", "Delete", 46, None, 0),
        "escape" | "esc" => named("Escape", "Escape", 27, None, 0),
        "space" => named(" ", "Space", 32, Some(" "), 0),
        "arrowup" | "up" => named("ArrowUp", "ArrowUp", 38, None, 0),
        "arrowdown" | "down" => named("ArrowDown", "ArrowDown", 40, None, 0),
        "arrowleft" | "left" => named("ArrowLeft", "ArrowLeft", 37, None, 0),
        "arrowright" | "right" => named("ArrowRight", "ArrowRight", 39, None, 0),
        "home" => named("Home", "Home", 36, None, 0),
        "end" => named("End", "End", 35, None, 0),
        "pageup" => named("PageUp", "PageUp", 33, None, 0),
        "pagedown" => named("PageDown", "PageDown", 34, None, 0),
        lower => {
            if let Some(n) = lower
                .strip_prefix('f')
                .and_then(|n| n.parse::<i64>().ok())
                .filter(|n| (1..=12).contains(n))
            {
                let key = format!("F{n}");
                return named(&key, &key, 111 + n, None, 0);
            }
            let mut chars = name.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) if c.is_ascii_alphabetic() => KeyDefinition {
                    key: c.to_string(),
                    code: format!("Key{}", c.to_ascii_uppercase()),
                    key_code: i64::from(c.to_ascii_uppercase() as u8),
                    text: Some(c.to_string()),
                    modifier: 0,
                },
                (Some(c), None) if c.is_ascii_digit() => KeyDefinition {
                    key: c.to_string(),
                    code: format!("Digit{c}"),
                    key_code: i64::from(c as u8),
                    text: Some(c.to_string()),
                    modifier: 0,
                },
                _ => KeyDefinition {
                    key: name.to_string(),
                    code: String::new(),
                    key_code: 0,
                    text: (name.chars().count() == 1).then(|| name.to_string()),
                    modifier: 0,
                },
            }
        }
    }
}
