//! Layered allow/deny evaluation
//!
//! Layers compose by progressive restriction only. Per layer, left to right:
//! if the layer specifies any allow (explicit or group), the running
//! permitted set is intersected with the expanded allow set; then the
//! expanded deny set is subtracted unconditionally. Intersection operates on
//! the running set, not the registry, so an allow can never re-add a tool a
//! prior layer removed. This asymmetry is a design invariant, pinned by the
//! tests below.

use crate::groups::PolicyGroups;
use crate::registry::ToolRegistry;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One set of allow/deny rules, direct or group-based.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyLayer {
    /// Explicit tool names to allow
    #[serde(default)]
    pub allow: Vec<String>,

    /// Explicit tool names to deny
    #[serde(default)]
    pub deny: Vec<String>,

    /// Group names whose members are allowed
    #[serde(default)]
    pub allow_groups: Vec<String>,

    /// Group names whose members are denied
    #[serde(default)]
    pub deny_groups: Vec<String>,
}

impl PolicyLayer {
    pub fn allowing<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allow: names.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn denying<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            deny: names.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn allowing_groups<I, S>(groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allow_groups: groups.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn denying_groups<I, S>(groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            deny_groups: groups.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn with_deny_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.deny_groups = groups.into_iter().map(Into::into).collect();
        self
    }

    /// Resolve group references to concrete tool-name sets.
    fn normalize(&self, groups: &PolicyGroups) -> NormalizedLayer {
        let mut deny: BTreeSet<String> = self.deny.iter().cloned().collect();
        for group in &self.deny_groups {
            deny.extend(groups.expand(group));
        }

        let allow = if self.allow.is_empty() && self.allow_groups.is_empty() {
            None
        } else {
            let mut allow: BTreeSet<String> = self.allow.iter().cloned().collect();
            for group in &self.allow_groups {
                allow.extend(groups.expand(group));
            }
            Some(allow)
        };

        NormalizedLayer { allow, deny }
    }
}

/// A layer with groups resolved to concrete names. `allow: None` means the
/// layer places no allow restriction.
struct NormalizedLayer {
    allow: Option<BTreeSet<String>>,
    deny: BTreeSet<String>,
}

/// Apply policy layers to a registry and return the filtered registry of
/// permitted tools. The base running set is the full registry; zero layers
/// return it unchanged.
pub fn apply_layers(
    registry: &ToolRegistry,
    groups: &PolicyGroups,
    layers: &[PolicyLayer],
) -> ToolRegistry {
    let mut permitted: BTreeSet<String> =
        registry.names().map(|name| name.to_string()).collect();

    for layer in layers {
        let normalized = layer.normalize(groups);
        if let Some(allow) = &normalized.allow {
            permitted = permitted.intersection(allow).cloned().collect();
        }
        permitted = permitted.difference(&normalized.deny).cloned().collect();
    }

    tracing::debug!(
        layers = layers.len(),
        base = registry.len(),
        permitted = permitted.len(),
        "applied tool policy layers"
    );

    registry.filtered(&permitted)
}
