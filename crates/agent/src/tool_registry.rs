//! Registry the dispatcher uses to classify tool calls.

use std::collections::HashMap;

use tools::ComputerUseTool;
use tracing::debug;

/// Lookup table of the built-in tools a loop executes itself.
///
/// Built once per loop and read-only afterwards. Any name not found here is
/// a custom call the caller has to answer.
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    tools: HashMap<&'static str, ComputerUseTool>,
}

impl ToolRegistry {
    /// Creates a registry holding the full computer-use catalogue.
    pub fn new() -> Self {
        Self::without(&[])
    }

    /// Creates a registry holding the catalogue minus `excluded` names.
    pub fn without(excluded: &[String]) -> Self {
        let tools = ComputerUseTool::ALL
            .into_iter()
            .filter(|tool| !excluded.iter().any(|name| name == tool.name()))
            .map(|tool| (tool.name(), tool))
            .collect::<HashMap<_, _>>();
        debug!(
            builtin = tools.len(),
            excluded = excluded.len(),
            "Tool registry initialized"
        );
        Self { tools }
    }

    /// Whether `name` is executed by the loop rather than the caller.
    pub fn is_builtin(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Get a built-in tool by name
    pub fn get(&self, name: &str) -> Option<ComputerUseTool> {
        self.tools.get(name).copied()
    }

    /// Returns the registered tool names, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.tools.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
