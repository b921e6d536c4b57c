//! Attribute-derived values shared by recipes and resources.

use std::fmt;
use std::str::FromStr;

use quick_xml::escape::escape;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::data::attributes::{scalar_to_string, AttributeTree};
use crate::error::ConvergeError;
use crate::infrastructure::{NodeDescriptor, NodeSearch};

// ---------------------------------------------------------------------------
// Roles
// ---------------------------------------------------------------------------

/// A supervised HBase daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HbaseRole {
    Master,
    Regionserver,
    Thrift,
    Rest,
}

impl HbaseRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            HbaseRole::Master => "master",
            HbaseRole::Regionserver => "regionserver",
            HbaseRole::Thrift => "thrift",
            HbaseRole::Rest => "rest",
        }
    }

    /// `Master`, `Regionserver`, ...
    pub fn title(&self) -> String {
        let s = self.as_str();
        let mut chars = s.chars();
        match chars.next() {
            Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
            None => String::new(),
        }
    }

    pub fn unit_name(&self) -> String {
        format!("hbase-{}.service", self.as_str())
    }
}

impl fmt::Display for HbaseRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HbaseRole {
    type Err = ConvergeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "master" => Ok(HbaseRole::Master),
            "regionserver" => Ok(HbaseRole::Regionserver),
            "thrift" => Ok(HbaseRole::Thrift),
            "rest" => Ok(HbaseRole::Rest),
            other => Err(ConvergeError::InvalidProperty {
                resource: format!("hbase_service[{}]", other),
                property: "role".into(),
                reason: "must be one of: master, regionserver, thrift, rest".into(),
            }),
        }
    }
}

pub fn is_master(attrs: &AttributeTree) -> bool {
    attrs.str(&["hbase", "topology", "role"]) == "master"
}

pub fn is_regionserver(attrs: &AttributeTree) -> bool {
    attrs.str(&["hbase", "topology", "role"]) == "regionserver"
}

pub fn is_backup_master(attrs: &AttributeTree) -> bool {
    attrs.str(&["hbase", "topology", "role"]) == "backup_master"
}

/// The services declared on this node by the default recipe: master unless
/// the node is a regionserver, plus thrift and rest when enabled.
pub fn local_services(attrs: &AttributeTree) -> Vec<HbaseRole> {
    let mut roles = Vec::new();
    if is_regionserver(attrs) {
        roles.push(HbaseRole::Regionserver);
    } else {
        roles.push(HbaseRole::Master);
    }
    if attrs.bool(&["hbase", "services", "thrift", "enabled"]) {
        roles.push(HbaseRole::Thrift);
    }
    if attrs.bool(&["hbase", "services", "rest", "enabled"]) {
        roles.push(HbaseRole::Rest);
    }
    roles
}

// ---------------------------------------------------------------------------
// XML
// ---------------------------------------------------------------------------

/// One `<property>` block per key, keys in byte order. Sequences are joined
/// with commas; nested maps are written as JSON.
pub fn config_to_xml_properties(config: &Map<String, Value>) -> String {
    let mut keys: Vec<&String> = config.keys().collect();
    keys.sort();
    keys.iter()
        .map(|key| {
            let value = property_value(&config[key.as_str()]);
            format!(
                "  <property>\n    <name>{}</name>\n    <value>{}</value>\n  </property>\n",
                escape(key.as_str()),
                escape(value.as_str())
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn property_value(value: &Value) -> String {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(scalar_to_string)
            .collect::<Vec<_>>()
            .join(","),
        Value::Null => String::new(),
        Value::Object(_) => value.to_string(),
        other => scalar_to_string(other).unwrap_or_default(),
    }
}

/// Fallbacks for the keys every `hbase-site.xml` must carry.
#[derive(Debug, Clone, PartialEq)]
pub struct XmlDefaults {
    pub rootdir: Value,
    pub quorum: Value,
    pub distributed: Value,
}

impl XmlDefaults {
    /// Read from `hbase.config`, falling back to local standalone values.
    pub fn from_attributes(attrs: &AttributeTree) -> Self {
        let pick = |key: &str, fallback: Value| {
            let v = attrs.get(&["hbase", "config", key]);
            if v.is_null() {
                fallback
            } else {
                v.clone()
            }
        };
        XmlDefaults {
            rootdir: pick("hbase.rootdir", Value::from("file:///tmp/hbase")),
            quorum: pick("hbase.zookeeper.quorum", Value::from("localhost")),
            distributed: pick("hbase.cluster.distributed", Value::from(false)),
        }
    }
}

impl Default for XmlDefaults {
    fn default() -> Self {
        XmlDefaults::from_attributes(&AttributeTree::new())
    }
}

/// The required keys with the user's values layered over them.
pub fn validate_config(config: &Map<String, Value>, defaults: &XmlDefaults) -> Map<String, Value> {
    let mut merged = Map::new();
    merged.insert("hbase.rootdir".into(), defaults.rootdir.clone());
    merged.insert("hbase.zookeeper.quorum".into(), defaults.quorum.clone());
    merged.insert("hbase.cluster.distributed".into(), defaults.distributed.clone());
    for (k, v) in config {
        merged.insert(k.clone(), v.clone());
    }
    merged
}

// ---------------------------------------------------------------------------
// Derived strings
// ---------------------------------------------------------------------------

/// `host:port` for every quorum member. The quorum may be a comma-separated
/// string or a sequence; the port defaults to 2181.
pub fn zk_connection_string(attrs: &AttributeTree) -> String {
    let quorum = match attrs.get(&["hbase", "config", "hbase.zookeeper.quorum"]) {
        Value::Array(items) => items.iter().filter_map(scalar_to_string).collect::<Vec<_>>(),
        other => scalar_to_string(other).into_iter().collect(),
    };
    let port = attrs.str_or(&["hbase", "config", "hbase.zookeeper.property.clientPort"], "2181");
    quorum
        .iter()
        .flat_map(|entry| entry.split(','))
        .map(str::trim)
        .filter(|host| !host.is_empty())
        .map(|host| format!("{}:{}", host, port))
        .collect::<Vec<_>>()
        .join(",")
}

/// `principal@realm` under Kerberos, otherwise `None`.
pub fn hbase_principal(attrs: &AttributeTree) -> Option<String> {
    if attrs.str(&["hbase", "security", "authentication"]) != "kerberos" {
        return None;
    }
    Some(format!(
        "{}@{}",
        attrs.str(&["hbase", "security", "kerberos", "principal"]),
        attrs.str(&["hbase", "security", "kerberos", "realm"])
    ))
}

/// Base Java options plus the JAAS config under Kerberos and the standard
/// log flags.
pub fn java_options(attrs: &AttributeTree) -> String {
    let mut opts = Vec::new();
    let base = attrs.str(&["hbase", "java_opts"]);
    if !base.is_empty() {
        opts.push(base);
    }
    if attrs.str(&["hbase", "security", "authentication"]) == "kerberos" {
        opts.push(format!(
            "-Djava.security.auth.login.config={}/jaas.conf",
            attrs.str(&["hbase", "conf_dir"])
        ));
    }
    opts.push(format!("-Dhbase.log.dir={}", attrs.str(&["hbase", "log_dir"])));
    opts.push(format!(
        "-Dhbase.security.logger={},console",
        attrs.str(&["hbase", "log_level"])
    ));
    opts.join(" ")
}

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

/// Nodes with `role` in `environment`, sorted by name. A failing backend is
/// logged and treated as an empty result.
pub fn nodes_with_role(search: &dyn NodeSearch, role: &str, environment: &str) -> Vec<NodeDescriptor> {
    match search.search(role, environment) {
        Ok(mut nodes) => {
            nodes.sort_by(|a, b| a.name.cmp(&b.name));
            nodes
        }
        Err(e) => {
            tracing::warn!(role, environment, error = %e, "could not search for nodes");
            Vec::new()
        }
    }
}
