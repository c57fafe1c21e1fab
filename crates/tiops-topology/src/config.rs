//! The configuration compositor.
//!
//! Component configuration arrives as free-form maps whose keys may be
//! dotted paths (`raftstore.sync-log: false`). Dotted keys are split
//! into nested maps, the per-role defaults are merged under the
//! per-instance overrides leaf by leaf, and the result is rendered as
//! TOML with a pointer back to the editable source. After upload the
//! component binary gets a chance to veto the file via `--config-check`.

use serde_json::Value;
use tracing::debug;

use crate::error::{Result, TopologyError};
use crate::spec::{component, ConfigMap};

/// Splits a dotted key into its head and a nested value.
///
/// `("a.b.c", v)` becomes `("a", {"b": {"c": v}})`.
fn flatten_key(key: &str, val: Value) -> (String, Value) {
    match key.split_once('.') {
        None => (key.to_string(), val),
        Some((head, rest)) => {
            let (sub_key, sub_val) = flatten_key(rest, val);
            let mut nested = ConfigMap::new();
            nested.insert(sub_key, sub_val);
            (head.to_string(), Value::Object(nested))
        }
    }
}

/// Inserts `val` under `key`, deep-merging when both sides are maps.
fn patch(origin: &mut ConfigMap, key: String, val: Value) {
    match (origin.get_mut(&key), val) {
        (Some(Value::Object(old)), Value::Object(new)) => {
            for (k, v) in new {
                patch(old, k, v);
            }
        }
        (_, val) => {
            origin.insert(key, val);
        }
    }
}

/// Expands every dotted key in `map` into nested maps.
///
/// Insertion patches rather than replaces, so `a.b: 1` and `a.c: 2`
/// end up in the same `a` table.
pub fn flatten(map: &ConfigMap) -> ConfigMap {
    let mut result = ConfigMap::new();
    for (k, v) in map {
        let (key, val) = flatten_key(k, v.clone());
        patch(&mut result, key, val);
    }
    result
}

/// Merges `overlay` onto `global` leaf by leaf.
///
/// Every leaf in the overlay wins; sibling leaves of the global map
/// survive. Both sides are flattened first, so dotted and structured
/// spellings of the same key collide as expected.
pub fn merge(global: &ConfigMap, overlay: &ConfigMap) -> ConfigMap {
    let mut lhs = flatten(global);
    for (k, v) in flatten(overlay) {
        patch(&mut lhs, k, v);
    }
    lhs
}

/// Renders the merge of `global` and `overlay` as a TOML document with
/// the fixed editing hint on top.
pub fn merge_to_toml(comp: &str, global: &ConfigMap, overlay: &ConfigMap) -> Result<String> {
    let merged = merge(global, overlay);
    let body = toml::to_string(&Value::Object(merged))
        .map_err(|e| TopologyError::TomlEncode(e.to_string()))?;
    Ok(format!(
        "# WARNING: This file is auto-generated. Do not edit! All your modification will be overwritten!\n\
         # You can use 'tiops edit-config' and 'tiops reload' to update the configuration\n\
         # All configuration items you want to change can be added to:\n\
         # server_configs:\n\
         #   {}:\n\
         #     aa.b1.c3: value\n\
         #     aa.b2.c4: value\n\
         {}",
        comp, body
    ))
}

/// Overlays topology-specified config onto the verbatim config a legacy
/// inventory deployed with. Spec values win on conflict.
pub fn merge_imported(imported: &str, spec_config: &ConfigMap) -> Result<ConfigMap> {
    let legacy: toml::Value =
        toml::from_str(imported).map_err(|e| TopologyError::TomlEncode(e.to_string()))?;
    let legacy = serde_json::to_value(legacy)
        .map_err(|e| TopologyError::TomlEncode(e.to_string()))?;
    let legacy = match legacy {
        Value::Object(map) => map,
        _ => ConfigMap::new(),
    };
    Ok(merge(&legacy, spec_config))
}

/// The binary entry inside `bin/` for components that can self-check
/// their configuration.
pub fn bin_entry(comp: &str) -> Option<&'static str> {
    match comp {
        component::TIDB => Some("tidb-server"),
        component::TIKV => Some("tikv-server"),
        component::PD => Some("pd-server"),
        _ => None,
    }
}

fn has_config_check_flag(exec: &dyn tiops_executor::Executor, bin_path: &str) -> bool {
    // Some versions exit non-zero on --help; their output still counts.
    match exec.exec(&format!("{} --help", bin_path), None, false) {
        Ok((stdout, stderr)) => {
            String::from_utf8_lossy(&stdout).contains("config-check")
                || String::from_utf8_lossy(&stderr).contains("config-check")
        }
        Err(tiops_executor::ExecutorError::CommandFailed { stderr, .. }) => {
            stderr.contains("config-check")
        }
        Err(_) => false,
    }
}

/// Asks the component binary to validate its uploaded configuration.
///
/// Versions without a `--config-check` flag are skipped. TiKV requires
/// `--pd=""` to satisfy its mandatory flag set during the check.
pub fn check_config(
    exec: &dyn tiops_executor::Executor,
    comp: &str,
    deploy_dir: &str,
    config_file: &str,
) -> Result<()> {
    let Some(entry) = bin_entry(comp) else {
        return Ok(());
    };
    let bin_path = format!("{}/bin/{}", deploy_dir, entry);
    if !has_config_check_flag(exec, &bin_path) {
        debug!(component = comp, "Binary has no config-check flag, skipping");
        return Ok(());
    }

    let extra = if comp == component::TIKV { " --pd=\"\"" } else { "" };
    let cmd = format!(
        "{} --config-check --config={}/conf/{}{}",
        bin_path, deploy_dir, config_file, extra
    );
    exec.exec(&cmd, None, false)
        .map_err(|e| TopologyError::config_check(comp, e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(pairs: &[(&str, Value)]) -> ConfigMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_flatten_expands_dotted_keys() {
        let m = map(&[("a.b", json!(1)), ("a.c", json!(2))]);
        let flat = flatten(&m);
        assert_eq!(flat["a"]["b"], json!(1));
        assert_eq!(flat["a"]["c"], json!(2));
    }

    #[test]
    fn test_flatten_patch_keeps_structured_siblings() {
        let m = map(&[("a", json!({"b": 1})), ("a.c", json!(2))]);
        let flat = flatten(&m);
        assert_eq!(flat["a"]["b"], json!(1));
        assert_eq!(flat["a"]["c"], json!(2));
    }

    #[test]
    fn test_merge_overlay_wins_siblings_survive() {
        let global = map(&[("a.b", json!(1)), ("a.c", json!(2))]);
        let inst = map(&[("a.c", json!(3)), ("d", json!(4))]);
        let merged = merge(&global, &inst);
        assert_eq!(merged["a"]["b"], json!(1));
        assert_eq!(merged["a"]["c"], json!(3));
        assert_eq!(merged["d"], json!(4));
    }

    /// Dotted and structured spellings of the same tree merge equally.
    #[test]
    fn test_flattened_merge_matches_structural_merge() {
        let dotted_a = map(&[("x.y", json!(true)), ("x.z", json!("s"))]);
        let dotted_b = map(&[("x.z", json!("t"))]);
        let structural_a = map(&[("x", json!({"y": true, "z": "s"}))]);
        let structural_b = map(&[("x", json!({"z": "t"}))]);
        assert_eq!(merge(&dotted_a, &dotted_b), merge(&structural_a, &structural_b));
    }

    /// Scenario from the compositor contract: the rendered TOML parses
    /// back to the merged tree. Output bytes are not compared.
    #[test]
    fn test_merge_to_toml_parses_to_expected_values() {
        let global = map(&[("a.b", json!(1)), ("a.c", json!(2))]);
        let inst = map(&[("a.c", json!(3)), ("d", json!(4))]);
        let rendered = merge_to_toml("tidb", &global, &inst).unwrap();
        assert!(rendered.starts_with("# WARNING"));

        let parsed: toml::Value = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed["a"]["b"].as_integer(), Some(1));
        assert_eq!(parsed["a"]["c"].as_integer(), Some(3));
        assert_eq!(parsed["d"].as_integer(), Some(4));
    }

    #[test]
    fn test_merge_imported_spec_wins() {
        let legacy = "log-level = \"info\"\n[raftstore]\nsync-log = true\n";
        let spec = map(&[("raftstore.sync-log", json!(false))]);
        let merged = merge_imported(legacy, &spec).unwrap();
        assert_eq!(merged["log-level"], json!("info"));
        assert_eq!(merged["raftstore"]["sync-log"], json!(false));
    }

    #[test]
    fn test_bin_entry_only_for_core_components() {
        assert_eq!(bin_entry("tikv"), Some("tikv-server"));
        assert_eq!(bin_entry("grafana"), None);
    }
}
