//! Tool access policy engine
//!
//! Gates which named tools an AI agent may invoke. An ordered list of policy
//! layers is applied to a base tool registry; each layer can only narrow the
//! permitted set (allow intersects, deny subtracts), so no layer can regrant
//! a capability removed earlier. Evaluation is pure and synchronous.

mod groups;
mod layers;
mod presets;
mod registry;

pub use groups::{
    PolicyGroups, GROUP_ANALYSIS, GROUP_RUNTIME, GROUP_WORKSPACE, GROUP_WRITE,
};
pub use layers::{apply_layers, PolicyLayer};
pub use presets::PolicyPreset;
pub use registry::{PolicyError, Tool, ToolRegistry};
