//! The attribute store: desired state as a tree of JSON values.
//!
//! Paths are segment slices rather than dotted strings because HBase property
//! names contain dots themselves: `["hbase", "config", "hbase.rootdir"]`.
//! Every read accessor returns a stable default when the path is absent or
//! holds a value of a different shape.

use serde::Serialize;
use serde_json::{Map, Value};

use super::merge::deep_merge;

static NULL: Value = Value::Null;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct AttributeTree {
    root: Value,
}

impl Default for AttributeTree {
    fn default() -> Self {
        AttributeTree {
            root: Value::Object(Map::new()),
        }
    }
}

impl AttributeTree {
    pub fn new() -> Self {
        AttributeTree::default()
    }

    /// Wrap an existing value. Non-mapping roots are replaced by an empty map.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(_) => AttributeTree { root: value },
            _ => AttributeTree::default(),
        }
    }

    pub fn as_value(&self) -> &Value {
        &self.root
    }

    /// Raw lookup. Absent paths yield `Value::Null`.
    pub fn get(&self, path: &[&str]) -> &Value {
        let mut node = &self.root;
        for segment in path {
            match node.get(*segment) {
                Some(next) => node = next,
                None => return &NULL,
            }
        }
        node
    }

    pub fn contains(&self, path: &[&str]) -> bool {
        !self.get(path).is_null()
    }

    /// String form of a scalar; empty for absent, null or structured values.
    pub fn str(&self, path: &[&str]) -> String {
        scalar_to_string(self.get(path)).unwrap_or_default()
    }

    pub fn str_or(&self, path: &[&str], default: &str) -> String {
        scalar_to_string(self.get(path)).unwrap_or_else(|| default.to_string())
    }

    /// Optional string; `None` for absent, null or empty values.
    pub fn opt_str(&self, path: &[&str]) -> Option<String> {
        scalar_to_string(self.get(path)).filter(|s| !s.is_empty())
    }

    /// Booleans accept `true`/`false` and the strings "true"/"false".
    pub fn bool(&self, path: &[&str]) -> bool {
        match self.get(path) {
            Value::Bool(b) => *b,
            Value::String(s) => s.eq_ignore_ascii_case("true"),
            _ => false,
        }
    }

    pub fn u64_or(&self, path: &[&str], default: u64) -> u64 {
        match self.get(path) {
            Value::Number(n) => n.as_u64().unwrap_or(default),
            Value::String(s) => s.trim().parse().unwrap_or(default),
            _ => default,
        }
    }

    /// Sequence of scalars as strings. A single scalar becomes a one-item list.
    pub fn strings(&self, path: &[&str]) -> Vec<String> {
        match self.get(path) {
            Value::Array(items) => items.iter().filter_map(scalar_to_string).collect(),
            Value::Null => Vec::new(),
            other => scalar_to_string(other).into_iter().collect(),
        }
    }

    pub fn map(&self, path: &[&str]) -> Map<String, Value> {
        match self.get(path) {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        }
    }

    /// Write a value, creating intermediate maps. Scalars in the way are
    /// replaced.
    pub fn set(&mut self, path: &[&str], value: Value) {
        set_in(&mut self.root, path, value);
    }

    /// Write only when nothing (or null) is stored at the path.
    pub fn set_default(&mut self, path: &[&str], value: Value) {
        if !self.contains(path) {
            self.set(path, value);
        }
    }

    /// Deep-merge overrides over the current tree; override scalars win,
    /// maps merge recursively, sequences are replaced.
    pub fn merge(&mut self, overrides: &Value) {
        deep_merge(&mut self.root, overrides);
    }
}

fn set_in(node: &mut Value, path: &[&str], value: Value) {
    match path.split_first() {
        None => *node = value,
        Some((head, rest)) => {
            if !node.is_object() {
                *node = Value::Object(Map::new());
            }
            if let Value::Object(map) = node {
                let child = map.entry(head.to_string()).or_insert(Value::Null);
                set_in(child, rest, value);
            }
        }
    }
}

/// Render a scalar the way a template would print it.
pub fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tree() -> AttributeTree {
        AttributeTree::from_value(json!({
            "hbase": {
                "user": "hbase",
                "limits": { "nofile": 32768 },
                "config": {
                    "hbase.rootdir": "file:///var/hbase",
                    "hbase.cluster.distributed": false
                },
                "topology": { "regionservers": ["rs1", "rs2"] }
            }
        }))
    }

    #[test]
    fn reads_nested_values() {
        let t = tree();
        assert_eq!(t.str(&["hbase", "user"]), "hbase");
        assert_eq!(t.str(&["hbase", "config", "hbase.rootdir"]), "file:///var/hbase");
        assert_eq!(t.u64_or(&["hbase", "limits", "nofile"], 0), 32768);
        assert!(!t.bool(&["hbase", "config", "hbase.cluster.distributed"]));
        assert_eq!(t.strings(&["hbase", "topology", "regionservers"]), vec!["rs1", "rs2"]);
    }

    #[test]
    fn absent_keys_return_stable_defaults() {
        let t = tree();
        assert!(t.get(&["hbase", "nope", "deeper"]).is_null());
        assert_eq!(t.str(&["missing"]), "");
        assert_eq!(t.str_or(&["missing"], "fallback"), "fallback");
        assert!(!t.bool(&["hbase", "metrics", "enabled"]));
        assert!(t.strings(&["hbase", "topology", "backup_masters"]).is_empty());
        assert!(t.map(&["hbase", "services", "thrift", "config"]).is_empty());
        assert_eq!(t.opt_str(&["hbase", "java_home"]), None);
    }

    #[test]
    fn reading_through_a_scalar_is_absent() {
        let t = tree();
        assert!(t.get(&["hbase", "user", "name"]).is_null());
    }

    #[test]
    fn set_creates_intermediate_maps() {
        let mut t = AttributeTree::new();
        t.set(&["hbase", "service_mapping", "master", "config"], json!({}));
        assert!(t.get(&["hbase", "service_mapping", "master"]).is_object());
        t.set(&["hbase", "java_home"], json!("/usr/lib/jvm/java-11-openjdk"));
        assert_eq!(t.str(&["hbase", "java_home"]), "/usr/lib/jvm/java-11-openjdk");
    }

    #[test]
    fn set_replaces_scalar_parent() {
        let mut t = tree();
        t.set(&["hbase", "user", "name"], json!("x"));
        assert_eq!(t.str(&["hbase", "user", "name"]), "x");
    }

    #[test]
    fn set_default_keeps_existing() {
        let mut t = tree();
        t.set_default(&["hbase", "user"], json!("other"));
        t.set_default(&["hbase", "group"], json!("hbase"));
        assert_eq!(t.str(&["hbase", "user"]), "hbase");
        assert_eq!(t.str(&["hbase", "group"]), "hbase");
    }

    #[test]
    fn single_scalar_reads_as_list() {
        let t = AttributeTree::from_value(json!({"quorum": "zk1,zk2"}));
        assert_eq!(t.strings(&["quorum"]), vec!["zk1,zk2"]);
    }

    #[test]
    fn non_object_root_is_replaced() {
        let t = AttributeTree::from_value(json!([1, 2]));
        assert!(t.as_value().is_object());
    }
}
