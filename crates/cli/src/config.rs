use proto::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tools::SessionConfig;
use tracing::debug;

const CONFIG_FILE_NAME: &str = "surfloop.toml";
const DEFAULT_RECENT_TURNS_WITH_SCREENSHOTS: i64 = 3;

/// Top-level application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Model and loop settings.
    #[serde(default)]
    pub agent: AgentConfig,

    /// Browser session settings.
    #[serde(default)]
    pub browser: BrowserConfig,
}

/// Model and loop config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Gemini API key (`GEMINI_API_KEY` overrides it at load time).
    #[serde(default)]
    pub api_key: String,
    /// Model ID. Leave empty (or omit) to use the computer-use default.
    #[serde(default)]
    pub model: String,
    /// Explicit API base URL (useful for proxies).
    pub base_url: Option<String>,
    /// Tool-result turns that keep their screenshots. `0` means 3, negative keeps all.
    #[serde(default = "default_recent_turns_with_screenshots")]
    pub max_recent_turns_with_screenshots: i64,
    /// Maximum model requests before giving up.
    pub max_turns: Option<usize>,
    /// Seconds to wait for a custom function response.
    pub custom_call_timeout_secs: Option<u64>,
    /// Predefined computer-use functions the model must not call.
    #[serde(default)]
    pub excluded_functions: Vec<String>,
}

fn default_recent_turns_with_screenshots() -> i64 {
    DEFAULT_RECENT_TURNS_WITH_SCREENSHOTS
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: String::new(),
            base_url: None,
            max_recent_turns_with_screenshots: default_recent_turns_with_screenshots(),
            max_turns: None,
            custom_call_timeout_secs: None,
            excluded_functions: Vec::new(),
        }
    }
}

impl AgentConfig {
    /// Returns the effective model ID.
    pub fn effective_model(&self) -> &str {
        let model = self.model.trim();
        if model.is_empty() {
            agent::DEFAULT_MODEL
        } else {
            model
        }
    }

    /// Returns the base URL override, ignoring blank values.
    pub fn effective_base_url(&self) -> Option<&str> {
        self.base_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }

    pub fn custom_call_timeout(&self) -> Option<Duration> {
        self.custom_call_timeout_secs.map(Duration::from_secs)
    }
}

/// Browser session config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    #[serde(default = "default_screen_width")]
    pub screen_width: u32,
    #[serde(default = "default_screen_height")]
    pub screen_height: u32,
    /// Page opened before the first model turn.
    #[serde(default = "default_initial_url")]
    pub initial_url: String,
    /// Run Chromium without a window.
    #[serde(default = "default_headless")]
    pub headless: bool,
}

fn default_screen_width() -> u32 {
    SessionConfig::default().screen_width
}

fn default_screen_height() -> u32 {
    SessionConfig::default().screen_height
}

fn default_initial_url() -> String {
    SessionConfig::default().initial_url
}

fn default_headless() -> bool {
    true
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            screen_width: default_screen_width(),
            screen_height: default_screen_height(),
            initial_url: default_initial_url(),
            headless: default_headless(),
        }
    }
}

impl BrowserConfig {
    /// Session settings for launching Chromium.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            screen_width: self.screen_width,
            screen_height: self.screen_height,
            initial_url: self.initial_url.clone(),
            headless: self.headless,
            ..SessionConfig::default()
        }
    }
}

impl Config {
    /// Loads configuration from explicit path, fallback locations, and env overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config_path = path.map(|p| p.to_path_buf()).or_else(|| {
            // Look in current dir, then home dir
            let cwd = std::env::current_dir().ok()?.join(CONFIG_FILE_NAME);
            if cwd.exists() {
                return Some(cwd);
            }
            let home_config = home_dir()?.join("config.toml");
            if home_config.exists() {
                return Some(home_config);
            }
            None
        });
        debug!(path = ?config_path, "Config file resolved");

        let mut config = if let Some(path) = config_path {
            let content = std::fs::read_to_string(&path).map_err(ConfigError::Io)?;
            toml::from_str(&content).map_err(|e| ConfigError::Toml(e.to_string()))?
        } else {
            Config::default()
        };

        // Environment variable overrides
        if let Ok(key) = std::env::var("GEMINI_API_KEY") {
            config.agent.api_key = key;
        }
        if let Ok(model) = std::env::var("SURFLOOP_MODEL") {
            config.agent.model = model;
        }
        if let Ok(base_url) = std::env::var("SURFLOOP_BASE_URL") {
            config.agent.base_url = Some(base_url);
        }

        debug!(
            model = %config.agent.effective_model(),
            base_url = ?config.agent.effective_base_url(),
            headless = config.browser.headless,
            "Config loaded"
        );
        Ok(config)
    }

    /// Checks the settings a loop cannot start without.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.agent.api_key.trim().is_empty() {
            return Err(ConfigError::MissingField("agent.api_key".to_string()));
        }
        for (field, value) in [
            ("browser.screen_width", self.browser.screen_width),
            ("browser.screen_height", self.browser.screen_height),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    reason: "must be greater than zero".to_string(),
                });
            }
        }
        for (field, is_zero) in [
            (
                "agent.custom_call_timeout_secs",
                self.agent.custom_call_timeout_secs == Some(0),
            ),
            ("agent.max_turns", self.agent.max_turns == Some(0)),
        ] {
            if is_zero {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    reason: "must be greater than zero".to_string(),
                });
            }
        }
        Ok(())
    }
}

/// `~/.surfloop`, the home of the user config file and debug logs.
pub fn home_dir() -> Option<PathBuf> {
    let home = std::env::var("HOME").ok()?;
    Some(PathBuf::from(home).join(".surfloop"))
}
