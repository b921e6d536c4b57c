//! `hbase_config`: a rendered HBase configuration file.
//!
//! The resource name is the target path. XML files with helpers enabled get
//! the required keys merged under the user's values before rendering, and
//! every render is verified for its format before anything is written.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use quick_xml::events::Event;
use quick_xml::Reader;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::file::{converge_directory, converge_file, json_type, Metadata};
use super::{validate_absolute_path, validate_mode, ActionContext, Provider};
use crate::error::ConvergeError;
use crate::helpers::{config_to_xml_properties, validate_config, XmlDefaults};
use crate::types::resource::{Action, Notification, ResourceId};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigKind {
    #[default]
    Xml,
    Properties,
    Env,
    Script,
}

impl ConfigKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigKind::Xml => "xml",
            ConfigKind::Properties => "properties",
            ConfigKind::Env => "env",
            ConfigKind::Script => "script",
        }
    }

    pub fn default_template(&self) -> &'static str {
        match self {
            ConfigKind::Xml => "hbase-site.xml",
            ConfigKind::Properties => "log4j2.properties",
            ConfigKind::Env => "hbase-env.sh",
            ConfigKind::Script => "generic-script",
        }
    }
}

impl fmt::Display for ConfigKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConfigKind {
    type Err = ConvergeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "xml" => Ok(ConfigKind::Xml),
            "properties" => Ok(ConfigKind::Properties),
            "env" => Ok(ConfigKind::Env),
            "script" => Ok(ConfigKind::Script),
            other => Err(ConvergeError::InvalidConfigKind {
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConfigResource {
    pub user: String,
    pub group: String,
    pub mode: u32,
    pub kind: ConfigKind,
    /// Must be a mapping; anything else fails validation.
    pub variables: Value,
    pub template: Option<String>,
    /// Roles whose services restart (delayed) when the content changes.
    pub restart_services: Vec<String>,
    pub use_helpers: bool,
    pub xml_defaults: XmlDefaults,
}

impl Default for ConfigResource {
    fn default() -> Self {
        ConfigResource {
            user: "hbase".into(),
            group: "hbase".into(),
            mode: 0o644,
            kind: ConfigKind::Xml,
            variables: Value::Object(Map::new()),
            template: None,
            restart_services: Vec::new(),
            use_helpers: false,
            xml_defaults: XmlDefaults::default(),
        }
    }
}

impl ConfigResource {
    pub fn new(kind: ConfigKind, variables: Value) -> Self {
        ConfigResource {
            kind,
            variables,
            ..ConfigResource::default()
        }
    }

    pub fn owned_by(mut self, user: &str, group: &str) -> Self {
        self.user = user.to_string();
        self.group = group.to_string();
        self
    }

    pub fn mode(mut self, mode: u32) -> Self {
        self.mode = mode;
        self
    }

    pub fn template(mut self, template: &str) -> Self {
        self.template = Some(template.to_string());
        self
    }

    pub fn restart_services(mut self, services: Vec<String>) -> Self {
        self.restart_services = services;
        self
    }

    pub fn with_helpers(mut self, defaults: XmlDefaults) -> Self {
        self.use_helpers = true;
        self.xml_defaults = defaults;
        self
    }

    pub fn template_name(&self) -> &str {
        self.template
            .as_deref()
            .unwrap_or_else(|| self.kind.default_template())
    }

    /// The variables handed to the template. XML gets `config` (the
    /// effective mapping) and `properties` (pre-rendered blocks).
    pub fn template_variables(&self) -> Value {
        let vars = match &self.variables {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };
        match self.kind {
            ConfigKind::Xml => {
                let config = if self.use_helpers {
                    validate_config(&vars, &self.xml_defaults)
                } else {
                    vars
                };
                json!({
                    "properties": config_to_xml_properties(&config),
                    "config": Value::Object(config),
                })
            }
            _ => Value::Object(vars),
        }
    }
}

/// Check rendered output for its format. XML must be well formed with a
/// single root element; properties lines must be `key = value`.
pub fn verify_rendered(kind: ConfigKind, content: &[u8]) -> Result<(), String> {
    match kind {
        ConfigKind::Xml => verify_xml(content),
        ConfigKind::Properties => {
            let text = std::str::from_utf8(content).map_err(|e| e.to_string())?;
            for (n, line) in text.lines().enumerate() {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
                    continue;
                }
                if !line.contains('=') && !line.contains(':') {
                    return Err(format!("line {}: expected key = value", n + 1));
                }
            }
            Ok(())
        }
        ConfigKind::Env | ConfigKind::Script => std::str::from_utf8(content)
            .map(|_| ())
            .map_err(|e| e.to_string()),
    }
}

pub fn verify_xml(content: &[u8]) -> Result<(), String> {
    let text = std::str::from_utf8(content).map_err(|e| e.to_string())?;
    let mut reader = Reader::from_str(text);
    let mut open: Vec<Vec<u8>> = Vec::new();
    let mut roots = 0;
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                if open.is_empty() {
                    roots += 1;
                }
                open.push(e.name().as_ref().to_vec());
            }
            Ok(Event::Empty(_)) => {
                if open.is_empty() {
                    roots += 1;
                }
            }
            Ok(Event::End(e)) => match open.pop() {
                Some(name) if name == e.name().as_ref() => {}
                _ => {
                    return Err(format!(
                        "unexpected closing tag </{}> at byte {}",
                        String::from_utf8_lossy(e.name().as_ref()),
                        reader.buffer_position()
                    ))
                }
            },
            Ok(Event::Text(t)) => {
                if open.is_empty() && !t.iter().all(|b| b.is_ascii_whitespace()) {
                    return Err("text outside the root element".to_string());
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(format!("at byte {}: {}", reader.buffer_position(), e)),
        }
    }
    if let Some(name) = open.last() {
        return Err(format!("unclosed element <{}>", String::from_utf8_lossy(name)));
    }
    match roots {
        1 => Ok(()),
        0 => Err("no root element".to_string()),
        _ => Err("more than one root element".to_string()),
    }
}

impl Provider for ConfigResource {
    fn validate(&self, id: &ResourceId) -> Result<(), ConvergeError> {
        validate_absolute_path(&id.name)?;
        validate_mode(id, Some(self.mode))?;
        if !self.variables.is_object() {
            return Err(ConvergeError::InvalidVariables {
                resource: id.to_string(),
                found: json_type(&self.variables).to_string(),
            });
        }
        for svc in &self.restart_services {
            if svc.trim().is_empty() {
                return Err(ConvergeError::InvalidProperty {
                    resource: id.to_string(),
                    property: "restart_services".into(),
                    reason: "service names must not be empty".into(),
                });
            }
        }
        Ok(())
    }

    fn actions(&self) -> &'static [Action] {
        &[Action::Create, Action::Nothing]
    }

    fn converge(&self, id: &ResourceId, action: Action, ctx: &mut ActionContext<'_>) -> Result<(), ConvergeError> {
        if action != Action::Create {
            return Ok(());
        }
        let path = Path::new(&id.name);
        if let Some(parent) = path.parent() {
            if !ctx.host.is_directory(parent) {
                let meta = Metadata::new(&self.user, &self.group, 0o755);
                converge_directory(ctx, id, parent, &meta, true)?;
            }
        }

        let template = self.template_name();
        let rendered = ctx.host.templates.render(template, &self.template_variables())?;
        verify_rendered(self.kind, &rendered).map_err(|message| ConvergeError::Verification {
            path: id.name.clone(),
            message,
        })?;

        let meta = Metadata::new(&self.user, &self.group, self.mode);
        let outcome = converge_file(ctx, id, path, Some(&rendered), &meta)?;
        if outcome.content_changed {
            tracing::info!(path = %id.name, template, "config content changed");
            for svc in &self.restart_services {
                ctx.queue(Notification::delayed_restart(svc));
            }
        }
        Ok(())
    }

    fn implicit_notifications(&self, _id: &ResourceId) -> Vec<Notification> {
        self.restart_services
            .iter()
            .map(|svc| Notification::delayed_restart(svc))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::mock::MockHost;
    use crate::types::resource::{ResourceKind, Timing};

    fn site_id() -> ResourceId {
        ResourceId::new(ResourceKind::HbaseConfig, "/etc/hbase/conf/hbase-site.xml")
    }

    fn converge(mock: &MockHost, r: &ConfigResource, id: &ResourceId) -> Result<(Vec<String>, Vec<Notification>), ConvergeError> {
        let mut host = mock.host();
        let mut ctx = ActionContext::new(&mut host, false);
        r.converge(id, Action::Create, &mut ctx)?;
        Ok((ctx.changes, ctx.queued))
    }

    #[test]
    fn kind_parsing() {
        assert_eq!("env".parse::<ConfigKind>().unwrap(), ConfigKind::Env);
        assert!(matches!(
            "yaml".parse::<ConfigKind>(),
            Err(ConvergeError::InvalidConfigKind { ref value }) if value == "yaml"
        ));
        assert_eq!(ConfigKind::Properties.default_template(), "log4j2.properties");
        assert_eq!(ConfigKind::Script.default_template(), "generic-script");
    }

    #[test]
    fn validation_rejects_bad_path_and_variables() {
        let r = ConfigResource::new(ConfigKind::Xml, json!({}));
        let bad = ResourceId::new(ResourceKind::HbaseConfig, "/etc/hbase/../shadow");
        assert!(matches!(r.validate(&bad), Err(ConvergeError::InvalidPath { .. })));

        let r = ConfigResource::new(ConfigKind::Xml, json!("hbase.rootdir=x"));
        assert!(matches!(
            r.validate(&site_id()),
            Err(ConvergeError::InvalidVariables { ref found, .. }) if found == "string"
        ));
    }

    #[test]
    fn helpers_merge_required_keys_under_user_values() {
        let r = ConfigResource::new(
            ConfigKind::Xml,
            json!({ "hbase.zookeeper.quorum": "zk1,zk2", "hbase.master.port": 16000 }),
        )
        .with_helpers(XmlDefaults::default());
        let vars = r.template_variables();
        assert_eq!(vars["config"]["hbase.zookeeper.quorum"], "zk1,zk2");
        assert_eq!(vars["config"]["hbase.rootdir"], "file:///tmp/hbase");
        assert_eq!(vars["config"]["hbase.cluster.distributed"], false);
    }

    #[test]
    fn without_helpers_nothing_is_added() {
        let r = ConfigResource::new(ConfigKind::Xml, json!({ "fs.defaultFS": "hdfs://nn:8020" }));
        let vars = r.template_variables();
        assert_eq!(vars["config"].as_object().unwrap().len(), 1);
    }

    #[test]
    fn creates_parent_and_file_then_unchanged() {
        let mock = MockHost::new();
        let r = ConfigResource::new(ConfigKind::Xml, json!({ "b": 2, "a": 1 }))
            .with_helpers(XmlDefaults::default())
            .restart_services(vec!["master".into()]);
        let (changes, queued) = converge(&mock, &r, &site_id()).unwrap();
        assert!(changes.iter().any(|c| c == "create directory /etc/hbase/conf"));
        assert_eq!(queued, vec![Notification::delayed_restart("master")]);
        assert_eq!(queued[0].timing, Timing::Delayed);

        let conf = mock.fs.entry("/etc/hbase/conf").unwrap();
        assert_eq!((conf.owner.as_str(), conf.mode), ("hbase", 0o755));
        let xml = mock.fs.contents("/etc/hbase/conf/hbase-site.xml").unwrap();
        assert!(verify_xml(xml.as_bytes()).is_ok());
        assert!(xml.find("<name>a</name>").unwrap() < xml.find("<name>b</name>").unwrap());

        let (changes, queued) = converge(&mock, &r, &site_id()).unwrap();
        assert!(changes.is_empty());
        assert!(queued.is_empty());
    }

    #[test]
    fn metadata_only_change_does_not_queue_restart() {
        let mock = MockHost::new();
        let r = ConfigResource::new(ConfigKind::Xml, json!({ "a": 1 }))
            .restart_services(vec!["master".into()]);
        converge(&mock, &r, &site_id()).unwrap();
        let r = r.mode(0o640);
        let (changes, queued) = converge(&mock, &r, &site_id()).unwrap();
        assert_eq!(changes, vec!["change mode of /etc/hbase/conf/hbase-site.xml to 0640"]);
        assert!(queued.is_empty());
    }

    #[test]
    fn broken_override_template_fails_verification_and_keeps_file() {
        let mock = MockHost::new();
        mock.fs.add_file("/etc/hbase/conf/hbase-site.xml", b"<configuration/>");
        let mut host = mock.host();
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.hbs"), "<configuration>{{properties}}").unwrap();
        host.templates = Box::new(
            crate::templates::HandlebarsRenderer::builtin()
                .with_override_dir(dir.path())
                .unwrap(),
        );
        let r = ConfigResource::new(ConfigKind::Xml, json!({ "a": 1 })).template("broken");
        let mut ctx = ActionContext::new(&mut host, false);
        let err = r.converge(&site_id(), Action::Create, &mut ctx).unwrap_err();
        assert!(matches!(err, ConvergeError::Verification { .. }));
        assert_eq!(
            mock.fs.contents("/etc/hbase/conf/hbase-site.xml").as_deref(),
            Some("<configuration/>")
        );
    }

    #[test]
    fn unknown_template_is_render_error() {
        let mock = MockHost::new();
        let r = ConfigResource::new(ConfigKind::Env, json!({})).template("missing.sh");
        let id = ResourceId::new(ResourceKind::HbaseConfig, "/etc/hbase/conf/x.sh");
        assert!(matches!(
            converge(&mock, &r, &id),
            Err(ConvergeError::TemplateRender { .. })
        ));
    }

    #[test]
    fn xml_verifier() {
        assert!(verify_xml(b"<?xml version=\"1.0\"?>\n<configuration>\n</configuration>\n").is_ok());
        assert!(verify_xml(b"<configuration>").is_err());
        assert!(verify_xml(b"<a></b>").is_err());
        assert!(verify_xml(b"<a/><b/>").is_err());
        assert!(verify_xml(b"").is_err());
    }

    #[test]
    fn properties_verifier() {
        assert!(verify_rendered(ConfigKind::Properties, b"# c\nstatus = warn\n\n").is_ok());
        assert!(verify_rendered(ConfigKind::Properties, b"just words\n").is_err());
    }

    #[test]
    fn implicit_notifications_name_services() {
        let r = ConfigResource::default().restart_services(vec!["master".into(), "rest".into()]);
        let n = r.implicit_notifications(&site_id());
        assert_eq!(n[1].target, ResourceId::service("rest"));
        assert_eq!(n[1].action, Action::Restart);
    }
}
