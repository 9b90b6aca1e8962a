//! Browser session and built-in computer-use tools.
//!
//! The loop executes every [`ComputerUseTool`] itself against a
//! [`BrowserSession`]; [`CdpSession`] is the Chromium implementation.

pub mod args;
pub mod browser;
pub mod computer_use;
pub mod session;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use browser::{CdpSession, SessionConfig};
pub use computer_use::{ComputerUseTool, DEFAULT_SCROLL_MAGNITUDE, execute_builtin};
pub use session::{BrowserSession, ScrollDirection};
