//! Named tool registry

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// A named, callable capability exposed to an AI agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    /// Unique tool name
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,
}

impl Tool {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

/// Policy evaluation errors
#[derive(Debug, Error)]
pub enum PolicyError {
    /// The tool is not in the permitted set. Refused before dispatch, never
    /// after side effects begin.
    #[error("tool '{0}' is not permitted by the active policy")]
    Violation(String),
}

/// Ordered registry of tools. The filtered registry produced by policy
/// evaluation is the only dispatch surface: a tool absent from it is
/// unreachable, not merely unlisted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Tool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Tool) {
        self.tools.insert(tool.name.clone(), tool);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&Tool> {
        self.tools.get(name)
    }

    /// Resolve a tool for dispatch, refusing names outside the registry.
    pub fn require(&self, name: &str) -> Result<&Tool, PolicyError> {
        self.tools
            .get(name)
            .ok_or_else(|| PolicyError::Violation(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tools.keys().map(|name| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tool> {
        self.tools.values()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Keep only the named tools, in registry order.
    pub(crate) fn filtered(&self, permitted: &std::collections::BTreeSet<String>) -> Self {
        Self {
            tools: self
                .tools
                .iter()
                .filter(|(name, _)| permitted.contains(*name))
                .map(|(name, tool)| (name.clone(), tool.clone()))
                .collect(),
        }
    }
}
