//! Named policy groups
//!
//! A group is a predefined set of tool names used to express policy layers
//! concisely ("deny the write group") instead of enumerating tools.

use std::collections::{BTreeMap, BTreeSet};

/// Built-in group names
pub const GROUP_WRITE: &str = "write";
pub const GROUP_ANALYSIS: &str = "analysis";
pub const GROUP_WORKSPACE: &str = "workspace";
pub const GROUP_RUNTIME: &str = "runtime";

/// Registry of named tool-name sets.
#[derive(Debug, Clone)]
pub struct PolicyGroups {
    groups: BTreeMap<String, BTreeSet<String>>,
}

impl PolicyGroups {
    /// Empty group table.
    pub fn new() -> Self {
        Self {
            groups: BTreeMap::new(),
        }
    }

    /// The built-in groups shipped with the agent surface.
    pub fn builtin() -> Self {
        let mut groups = Self::new();
        groups.define(
            GROUP_WRITE,
            ["write_file", "edit_file", "delete_file", "move_file", "create_directory"],
        );
        groups.define(
            GROUP_ANALYSIS,
            ["read_file", "search_code", "list_symbols", "get_diagnostics"],
        );
        groups.define(GROUP_WORKSPACE, ["list_files", "workspace_info", "open_document"]);
        groups.define(GROUP_RUNTIME, ["run_code", "run_tests", "install_package"]);
        groups
    }

    /// Define or replace a group.
    pub fn define<I, S>(&mut self, name: impl Into<String>, members: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups.insert(
            name.into(),
            members.into_iter().map(Into::into).collect(),
        );
    }

    /// Expand a group name to its tool names. Unknown groups expand to the
    /// empty set, logged but not fatal: a layer referencing a missing group
    /// simply contributes nothing.
    pub fn expand(&self, name: &str) -> BTreeSet<String> {
        match self.groups.get(name) {
            Some(members) => members.clone(),
            None => {
                tracing::warn!(group = name, "policy layer references unknown group");
                BTreeSet::new()
            }
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.groups.contains_key(name)
    }
}

impl Default for PolicyGroups {
    fn default() -> Self {
        Self::builtin()
    }
}
