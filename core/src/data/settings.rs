use std::path::Path;

use serde_json::Value;

use crate::error::ConvergeError;
use crate::types::config::RunSettings;


/// Load `RunSettings` from a YAML file. A missing file yields the defaults;
/// an unreadable or malformed one is an error.
pub fn load(path: &Path) -> Result<RunSettings, ConvergeError> {
    if !path.exists() {
        return Ok(RunSettings::default());
    }
    let content = std::fs::read_to_string(path)
        .map_err(|e| ConvergeError::Settings(format!("cannot read {}: {}", path.display(), e)))?;
    parse(&content)
        .map_err(|e| ConvergeError::Settings(format!("{}: {}", path.display(), e)))
}


/// Parse settings from a YAML string. Empty input yields the defaults.
pub fn parse(content: &str) -> Result<RunSettings, String> {
    if content.trim().is_empty() {
        return Ok(RunSettings::default());
    }
    serde_yaml::from_str(content).map_err(|e| e.to_string())
}


/// Save `RunSettings` as YAML.
pub fn save(path: &Path, settings: &RunSettings) -> Result<(), ConvergeError> {
    let content = serde_yaml::to_string(settings)
        .map_err(|e| ConvergeError::Settings(format!("cannot serialize settings: {}", e)))?;
    std::fs::write(path, content)
        .map_err(|e| ConvergeError::Settings(format!("cannot write {}: {}", path.display(), e)))
}


/// A node file: attribute overrides plus an optional run list.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeFile {
    pub attributes: Value,
    pub run_list: Option<Vec<String>>,
}


/// Load a node file. YAML is a superset of JSON, so both parse here. The
/// top-level `run_list` key is split off; everything else is attributes.
pub fn load_node_file(path: &Path) -> Result<NodeFile, ConvergeError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| ConvergeError::Settings(format!("cannot read {}: {}", path.display(), e)))?;
    parse_node_file(&content)
        .map_err(|e| ConvergeError::Settings(format!("{}: {}", path.display(), e)))
}


pub fn parse_node_file(content: &str) -> Result<NodeFile, String> {
    let mut value: Value = if content.trim().is_empty() {
        Value::Object(Default::default())
    } else {
        serde_yaml::from_str(content).map_err(|e| e.to_string())?
    };
    let map = value
        .as_object_mut()
        .ok_or_else(|| "node file must contain a mapping at the top level".to_string())?;
    let run_list = match map.remove("run_list") {
        None | Some(Value::Null) => None,
        Some(Value::Array(items)) => Some(
            items
                .into_iter()
                .map(|item| match item {
                    Value::String(s) => Ok(normalize_recipe(&s)),
                    other => Err(format!("run_list entries must be strings, got {}", other)),
                })
                .collect::<Result<Vec<_>, _>>()?,
        ),
        Some(other) => return Err(format!("run_list must be a sequence, got {}", other)),
    };
    Ok(NodeFile {
        attributes: value,
        run_list,
    })
}


/// Accept `recipe[hbase::master]` as well as `hbase::master`.
pub fn normalize_recipe(entry: &str) -> String {
    let trimmed = entry.trim();
    trimmed
        .strip_prefix("recipe[")
        .and_then(|s| s.strip_suffix(']'))
        .unwrap_or(trimmed)
        .to_string()
}
