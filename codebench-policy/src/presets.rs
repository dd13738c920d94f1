//! Named policy presets

use crate::groups::{GROUP_ANALYSIS, GROUP_RUNTIME, GROUP_WORKSPACE, GROUP_WRITE};
use crate::layers::PolicyLayer;
use serde::{Deserialize, Serialize};

/// Predefined policy configurations selectable by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyPreset {
    /// No restriction
    Standard,
    /// Denies the `write` and `runtime` groups
    Safe,
    /// Allows only `analysis` and `workspace` tools, and additionally denies
    /// `write` and `runtime` (deny is evaluated regardless of the allow
    /// outcome)
    Readonly,
}

impl PolicyPreset {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "standard" => Some(Self::Standard),
            "safe" => Some(Self::Safe),
            "readonly" => Some(Self::Readonly),
            _ => None,
        }
    }

    /// The layers this preset contributes.
    pub fn layers(self) -> Vec<PolicyLayer> {
        match self {
            Self::Standard => Vec::new(),
            Self::Safe => vec![PolicyLayer::denying_groups([GROUP_WRITE, GROUP_RUNTIME])],
            Self::Readonly => vec![
                PolicyLayer::allowing_groups([GROUP_ANALYSIS, GROUP_WORKSPACE])
                    .with_deny_groups([GROUP_WRITE, GROUP_RUNTIME]),
            ],
        }
    }
}
