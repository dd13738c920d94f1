//! Policy engine flows: presets layered with user configuration, and the
//! dispatch gate that refuses filtered tools.

use codebench_policy::{
    apply_layers, PolicyError, PolicyGroups, PolicyLayer, PolicyPreset, Tool, ToolRegistry,
};

fn editor_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    for (name, description) in [
        ("read_file", "Read a file from the workspace"),
        ("search_code", "Search the workspace for a pattern"),
        ("get_diagnostics", "Fetch compiler diagnostics"),
        ("list_files", "List workspace files"),
        ("workspace_info", "Describe the open workspace"),
        ("write_file", "Write a file"),
        ("edit_file", "Apply an edit to a file"),
        ("delete_file", "Delete a file"),
        ("run_code", "Execute code in the sandbox"),
        ("install_package", "Install a dependency"),
    ] {
        registry.register(Tool::new(name, description));
    }
    registry
}

#[test]
fn test_preset_selected_by_name_gates_dispatch() {
    let registry = editor_registry();
    let preset = PolicyPreset::from_name("safe").unwrap();
    let permitted = apply_layers(&registry, &PolicyGroups::builtin(), &preset.layers());

    permitted.require("read_file").unwrap();
    assert!(matches!(
        permitted.require("write_file"),
        Err(PolicyError::Violation(name)) if name == "write_file"
    ));
    assert!(matches!(
        permitted.require("run_code"),
        Err(PolicyError::Violation(_))
    ));
}

#[test]
fn test_user_layer_stacks_on_preset() {
    let registry = editor_registry();
    let mut layers = PolicyPreset::Safe.layers();
    layers.push(PolicyLayer::denying(["get_diagnostics"]));

    let permitted = apply_layers(&registry, &PolicyGroups::builtin(), &layers);
    assert!(permitted.contains("read_file"));
    assert!(!permitted.contains("get_diagnostics"));
    assert!(!permitted.contains("write_file"));
}

#[test]
fn test_user_layer_cannot_widen_preset() {
    let registry = editor_registry();
    let mut layers = PolicyPreset::Readonly.layers();
    // A trailing allow naming denied tools must not bring them back.
    layers.push(PolicyLayer::allowing(["write_file", "run_code", "read_file"]));

    let permitted = apply_layers(&registry, &PolicyGroups::builtin(), &layers);
    let names: Vec<&str> = permitted.names().collect();
    assert_eq!(names, vec!["read_file"]);
}

#[test]
fn test_layers_round_trip_as_config() {
    let json = r#"[
        {"deny_groups": ["write"]},
        {"allow": ["read_file", "list_files"], "deny": ["list_files"]}
    ]"#;
    let layers: Vec<PolicyLayer> = serde_json::from_str(json).unwrap();

    let permitted = apply_layers(&editor_registry(), &PolicyGroups::builtin(), &layers);
    let names: Vec<&str> = permitted.names().collect();
    assert_eq!(names, vec!["read_file"]);
}

#[test]
fn test_unknown_group_restricts_to_nothing() {
    let registry = editor_registry();
    let layer = PolicyLayer::allowing_groups(["no-such-group"]);
    let permitted = apply_layers(&registry, &PolicyGroups::builtin(), &[layer]);
    assert!(permitted.is_empty());
}
