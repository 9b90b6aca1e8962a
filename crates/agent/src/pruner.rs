//! Drops old screenshots from the conversation history.

use proto::{Part, Role, Turn};
use tracing::debug;

/// Screenshot-bearing turns kept when the configured window is `0`.
pub const DEFAULT_RECENT_TURNS_WITH_SCREENSHOTS: usize = 3;

/// How many tool-result turns keep their screenshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionWindow {
    /// Only the `n` most recent turns with screenshots keep them.
    Recent(usize),
    /// Never drop a screenshot.
    Unlimited,
}

impl RetentionWindow {
    /// Maps the configured value: `0` is the default, negative is unlimited.
    pub fn from_config(value: i64) -> Self {
        match value {
            0 => Self::default(),
            n if n < 0 => Self::Unlimited,
            n => Self::Recent(usize::try_from(n).unwrap_or(usize::MAX)),
        }
    }
}

impl Default for RetentionWindow {
    fn default() -> Self {
        Self::Recent(DEFAULT_RECENT_TURNS_WITH_SCREENSHOTS)
    }
}

/// Strips screenshot attachments from user turns older than the window.
///
/// Payloads are left untouched. Returns the number of turns stripped.
pub fn prune(history: &mut [Turn], window: RetentionWindow) -> usize {
    let RetentionWindow::Recent(keep) = window else {
        return 0;
    };

    let mut stripped = 0;
    history
        .iter_mut()
        .rev()
        .filter(|turn| turn.role == Role::User && turn.has_attachments())
        .skip(keep)
        .for_each(|turn| {
            for part in &mut turn.parts {
                if let Part::ToolResult(result) = part {
                    result.attachments.clear();
                }
            }
            stripped += 1;
        });

    if stripped > 0 {
        debug!(stripped, keep, "Pruned screenshots from history");
    }
    stripped
}

#[cfg(test)]
mod tests {
    use proto::{Payload, ToolResult};
    use serde_json::json;

    use super::*;

    fn screenshot_turn(step: usize) -> Turn {
        let mut payload = Payload::new();
        payload.insert("url".to_string(), json!(format!("https://example.com/{step}")));
        Turn::tool_results(vec![
            ToolResult::new("click_at", payload).with_screenshot(vec![step as u8; 16]),
        ])
    }

    fn history_with(screenshot_turns: usize) -> Vec<Turn> {
        let mut history = vec![Turn::user_text("Search for Go tutorials on Google")];
        for step in 0..screenshot_turns {
            history.push(Turn::new(Role::Model, vec![Part::text("acting")]));
            history.push(screenshot_turn(step));
        }
        history
    }

    fn retained(history: &[Turn]) -> Vec<bool> {
        history
            .iter()
            .filter(|turn| turn.role == Role::User && turn.parts.len() == 1)
            .filter(|turn| matches!(turn.parts[0], Part::ToolResult(_)))
            .map(Turn::has_attachments)
            .collect()
    }

    #[test]
    fn from_config_maps_zero_and_negative() {
        assert_eq!(RetentionWindow::from_config(0), RetentionWindow::Recent(3));
        assert_eq!(RetentionWindow::from_config(5), RetentionWindow::Recent(5));
        assert_eq!(RetentionWindow::from_config(-1), RetentionWindow::Unlimited);
        assert_eq!(RetentionWindow::default(), RetentionWindow::Recent(3));
    }

    #[test]
    fn keeps_only_most_recent_screenshots() {
        let mut history = history_with(6);
        let stripped = prune(&mut history, RetentionWindow::Recent(3));
        assert_eq!(stripped, 3);
        assert_eq!(
            retained(&history),
            vec![false, false, false, true, true, true]
        );

        // Payloads survive pruning.
        let Part::ToolResult(oldest) = &history[2].parts[0] else {
            panic!("expected tool result");
        };
        assert_eq!(oldest.payload["url"], "https://example.com/0");
    }

    #[test]
    fn prune_is_idempotent() {
        let mut history = history_with(5);
        prune(&mut history, RetentionWindow::default());
        let once = history.clone();
        assert_eq!(prune(&mut history, RetentionWindow::default()), 0);
        assert_eq!(history, once);
    }

    #[test]
    fn within_window_nothing_changes() {
        let mut history = history_with(3);
        assert_eq!(prune(&mut history, RetentionWindow::Recent(3)), 0);
        assert_eq!(retained(&history), vec![true, true, true]);
    }

    #[test]
    fn unlimited_never_strips() {
        for turns in [0, 1, 4, 12] {
            let mut history = history_with(turns);
            assert_eq!(prune(&mut history, RetentionWindow::Unlimited), 0);
            assert!(retained(&history).into_iter().all(|kept| kept));
        }
    }

    #[test]
    fn model_turns_are_ignored() {
        let mut history = history_with(4);
        let mut model_turn = screenshot_turn(9);
        model_turn.role = Role::Model;
        history.insert(1, model_turn);
        prune(&mut history, RetentionWindow::Recent(1));
        assert!(history[1].has_attachments());
    }
}
