//! `hbase_service`: a systemd-supervised HBase daemon.
//!
//! The resource name is the role. `create` installs the unit (and the
//! optional `<role>-site.xml`); the remaining actions map one to one onto
//! supervisor operations and are no-ops when the unit is already in the
//! requested state.

use std::path::{Path, PathBuf};

use serde_json::{json, Map, Value};

use super::config::verify_xml;
use super::file::{converge_directory, converge_file, json_type, Metadata};
use super::{validate_absolute_path, ActionContext, Provider};
use crate::data::attributes::AttributeTree;
use crate::error::ConvergeError;
use crate::helpers::{config_to_xml_properties, java_options, HbaseRole};
use crate::infrastructure::systemd::environment_assignment;
use crate::types::resource::{Action, Notification, ResourceId, Timing};

const SUPERVISOR: &str = "supervisor";

/// A systemd unit as ordered `[Section]` key/value lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitDescriptor {
    pub sections: Vec<(String, Vec<(String, String)>)>,
}

impl UnitDescriptor {
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (i, (section, entries)) in self.sections.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            out.push_str(&format!("[{}]\n", section));
            for (key, value) in entries {
                out.push_str(&format!("{}={}\n", key, value));
            }
        }
        out
    }

    pub fn get(&self, section: &str, key: &str) -> Vec<&str> {
        self.sections
            .iter()
            .filter(|(s, _)| s == section)
            .flat_map(|(_, entries)| entries.iter())
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceResource {
    pub user: String,
    pub group: String,
    pub install_dir: String,
    pub conf_dir: String,
    pub log_dir: String,
    pub pid_dir: String,
    /// May be empty; validated as a path otherwise.
    pub java_home: String,
    pub java_opts: String,
    /// Role-specific `<role>-site.xml` properties. Must be a mapping.
    pub config: Value,
    pub restart_on_config_change: bool,
    pub limit_nofile: u64,
    pub limit_nproc: u64,
}

impl ServiceResource {
    /// Defaults taken from the `hbase` attribute subtree. Java options are
    /// the derived ones, so Kerberos and log flags reach the unit.
    pub fn from_attributes(attrs: &AttributeTree) -> Self {
        let h = |key: &str| attrs.str(&["hbase", key]);
        ServiceResource {
            user: h("user"),
            group: h("group"),
            install_dir: h("install_dir"),
            conf_dir: h("conf_dir"),
            log_dir: h("log_dir"),
            pid_dir: attrs.str_or(&["hbase", "pid_dir"], "/var/run/hbase"),
            java_home: h("java_home"),
            java_opts: java_options(attrs),
            config: Value::Object(Map::new()),
            restart_on_config_change: attrs.get(&["hbase", "restart_on_config_change"]).as_bool().unwrap_or(true),
            limit_nofile: attrs.u64_or(&["hbase", "limits", "nofile"], 32768),
            limit_nproc: attrs.u64_or(&["hbase", "limits", "nproc"], 65536),
        }
    }

    pub fn config(mut self, config: Value) -> Self {
        self.config = config;
        self
    }

    pub fn role(id: &ResourceId) -> Result<HbaseRole, ConvergeError> {
        id.name.parse()
    }

    pub fn config_path(&self, role: HbaseRole) -> PathBuf {
        Path::new(&self.conf_dir).join(format!("{}-site.xml", role))
    }

    pub fn pid_file(&self, role: HbaseRole) -> String {
        format!("{}/hbase-{}-{}.pid", self.pid_dir, self.user, role)
    }

    pub fn unit(&self, role: HbaseRole) -> UnitDescriptor {
        let kv = |k: &str, v: String| (k.to_string(), v);
        let daemon = format!("{}/bin/hbase-daemon.sh", self.install_dir);
        UnitDescriptor {
            sections: vec![
                (
                    "Unit".into(),
                    vec![
                        kv("Description", format!("Apache HBase {} Service", role.title())),
                        kv("Documentation", "https://hbase.apache.org".into()),
                        kv("After", "network.target".into()),
                        kv("Wants", "network-online.target".into()),
                    ],
                ),
                (
                    "Service".into(),
                    vec![
                        kv("Type", "forking".into()),
                        kv("User", self.user.clone()),
                        kv("Group", self.group.clone()),
                        kv("Environment", environment_assignment("JAVA_HOME", &self.java_home)),
                        kv("Environment", environment_assignment("HBASE_OPTS", &self.java_opts)),
                        kv("Environment", environment_assignment("HBASE_LOG_DIR", &self.log_dir)),
                        kv("ExecStart", format!("{} start {}", daemon, role)),
                        kv("ExecStop", format!("{} stop {}", daemon, role)),
                        kv("Restart", "on-failure".into()),
                        kv("RestartSec", "10s".into()),
                        kv("TimeoutStartSec", "180s".into()),
                        kv("LimitNOFILE", self.limit_nofile.to_string()),
                        kv("LimitNPROC", self.limit_nproc.to_string()),
                        kv("PIDFile", self.pid_file(role)),
                    ],
                ),
                (
                    "Install".into(),
                    vec![kv("WantedBy", "multi-user.target".into())],
                ),
            ],
        }
    }

    fn create(&self, id: &ResourceId, role: HbaseRole, ctx: &mut ActionContext<'_>) -> Result<(), ConvergeError> {
        let dir_meta = Metadata::new(&self.user, &self.group, 0o755);
        converge_directory(ctx, id, Path::new(&self.pid_dir), &dir_meta, true)?;

        let unit = role.unit_name();
        let desired = self.unit(role).render();
        let installed = ctx
            .host
            .supervisor
            .unit_content(&unit)
            .map_err(|e| ConvergeError::upstream(id, SUPERVISOR, e))?;
        if installed.as_deref() != Some(desired.as_str()) {
            let verb = if installed.is_some() { "update" } else { "install" };
            if ctx.change(format!("{} unit {}", verb, unit)) {
                ctx.host
                    .supervisor
                    .install_unit(&unit, &desired)
                    .map_err(|e| ConvergeError::upstream(id, SUPERVISOR, e))?;
            }
        }

        let config = self.config.as_object().cloned().unwrap_or_default();
        if config.is_empty() {
            return Ok(());
        }
        let path = self.config_path(role);
        let vars = json!({
            "properties": config_to_xml_properties(&config),
            "config": Value::Object(config),
        });
        let rendered = ctx.host.templates.render("hbase-site.xml", &vars)?;
        verify_xml(&rendered).map_err(|message| ConvergeError::Verification {
            path: path.display().to_string(),
            message,
        })?;
        let outcome = converge_file(ctx, id, &path, Some(&rendered), &Metadata::new(&self.user, &self.group, 0o644))?;
        if outcome.content_changed && self.restart_on_config_change {
            ctx.queue(Notification::new(id.clone(), Action::Restart, Timing::Delayed));
        }
        Ok(())
    }
}

impl Provider for ServiceResource {
    fn validate(&self, id: &ResourceId) -> Result<(), ConvergeError> {
        Self::role(id)?;
        for dir in [&self.install_dir, &self.conf_dir, &self.log_dir, &self.pid_dir] {
            validate_absolute_path(dir)?;
        }
        if !self.java_home.trim().is_empty() {
            validate_absolute_path(&self.java_home)?;
        }
        if !self.config.is_object() {
            return Err(ConvergeError::InvalidVariables {
                resource: id.to_string(),
                found: json_type(&self.config).to_string(),
            });
        }
        Ok(())
    }

    fn actions(&self) -> &'static [Action] {
        &[
            Action::Create,
            Action::Enable,
            Action::Start,
            Action::Stop,
            Action::Restart,
            Action::Disable,
            Action::Reload,
            Action::Nothing,
        ]
    }

    fn converge(&self, id: &ResourceId, action: Action, ctx: &mut ActionContext<'_>) -> Result<(), ConvergeError> {
        let role = Self::role(id)?;
        let unit = role.unit_name();
        let upstream = |e: String| ConvergeError::upstream(id, SUPERVISOR, e);
        match action {
            Action::Create => self.create(id, role, ctx)?,
            Action::Enable => {
                if !ctx.host.supervisor.is_enabled(&unit).map_err(upstream)?
                    && ctx.change(format!("enable {}", unit))
                {
                    ctx.host.supervisor.enable(&unit).map_err(upstream)?;
                }
            }
            Action::Disable => {
                if ctx.host.supervisor.is_enabled(&unit).map_err(upstream)?
                    && ctx.change(format!("disable {}", unit))
                {
                    ctx.host.supervisor.disable(&unit).map_err(upstream)?;
                }
            }
            Action::Start => {
                if role == HbaseRole::Master {
                    let site = Path::new(&self.conf_dir).join("hbase-site.xml");
                    if !ctx.host.path_exists(&site) {
                        ctx.warn(format!(
                            "{}: {} does not exist, starting anyway",
                            id,
                            site.display()
                        ));
                    }
                }
                if !ctx.host.supervisor.is_active(&unit).map_err(upstream)?
                    && ctx.change(format!("start {}", unit))
                {
                    ctx.host.supervisor.start(&unit).map_err(upstream)?;
                }
            }
            Action::Stop => {
                if ctx.host.supervisor.is_active(&unit).map_err(upstream)?
                    && ctx.change(format!("stop {}", unit))
                {
                    ctx.host.supervisor.stop(&unit).map_err(upstream)?;
                }
            }
            Action::Restart => {
                if ctx.change(format!("restart {}", unit)) {
                    ctx.host.supervisor.restart(&unit).map_err(upstream)?;
                }
            }
            Action::Reload => {
                if ctx.host.supervisor.is_active(&unit).map_err(upstream)?
                    && ctx.change(format!("reload {}", unit))
                {
                    ctx.host.supervisor.reload(&unit).map_err(upstream)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn implicit_notifications(&self, id: &ResourceId) -> Vec<Notification> {
        let has_config = self.config.as_object().map_or(false, |m| !m.is_empty());
        if has_config && self.restart_on_config_change {
            vec![Notification::new(id.clone(), Action::Restart, Timing::Delayed)]
        } else {
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::defaults::default_attributes;
    use crate::infrastructure::mock::{MockHost, MockUnit};

    fn service() -> ServiceResource {
        let mut attrs = default_attributes();
        attrs.set(&["hbase", "java_home"], json!("/usr/lib/jvm/java-11-openjdk-amd64"));
        ServiceResource::from_attributes(&attrs)
    }

    fn converge(mock: &MockHost, s: &ServiceResource, role: &str, action: Action) -> Result<(Vec<String>, Vec<String>, Vec<Notification>), ConvergeError> {
        let mut host = mock.host();
        let mut ctx = ActionContext::new(&mut host, false);
        s.converge(&ResourceId::service(role), action, &mut ctx)?;
        Ok((ctx.changes, ctx.warnings, ctx.queued))
    }

    #[test]
    fn unit_descriptor_contents() {
        let unit = service().unit(HbaseRole::Master);
        assert_eq!(unit.get("Unit", "Description"), vec!["Apache HBase Master Service"]);
        assert_eq!(
            unit.get("Service", "ExecStart"),
            vec!["/opt/hbase/bin/hbase-daemon.sh start master"]
        );
        assert_eq!(unit.get("Service", "RestartSec"), vec!["10s"]);
        assert_eq!(unit.get("Service", "LimitNOFILE"), vec!["32768"]);
        assert_eq!(
            unit.get("Service", "PIDFile"),
            vec!["/var/run/hbase/hbase-hbase-master.pid"]
        );
        assert_eq!(unit.get("Service", "Environment").len(), 3);
        let text = unit.render();
        assert!(text.starts_with("[Unit]\n"));
        assert!(text.contains("\n\n[Service]\n"));
        assert!(text.contains("Environment=\"JAVA_HOME=/usr/lib/jvm/java-11-openjdk-amd64\"\n"));
    }

    #[test]
    fn quoted_java_options_survive_in_unit() {
        let s = ServiceResource {
            java_opts: r#"-Xmx1g -XX:OnOutOfMemoryError="kill -9 %p""#.into(),
            ..service()
        };
        let unit = s.unit(HbaseRole::Regionserver);
        let env = unit.get("Service", "Environment");
        assert_eq!(
            env[1],
            r#""HBASE_OPTS=-Xmx1g -XX:OnOutOfMemoryError=\"kill -9 %%p\"""#
        );
    }

    #[test]
    fn validation() {
        let s = service();
        assert!(s.validate(&ResourceId::service("rest")).is_ok());
        assert!(s.validate(&ResourceId::service("zookeeper")).is_err());
        let bad = ServiceResource { log_dir: "var/log".into(), ..service() };
        assert!(matches!(
            bad.validate(&ResourceId::service("master")),
            Err(ConvergeError::InvalidPath { .. })
        ));
        let no_java = ServiceResource { java_home: String::new(), ..service() };
        assert!(no_java.validate(&ResourceId::service("master")).is_ok());
        let bad_config = service().config(json!([1]));
        assert!(bad_config.validate(&ResourceId::service("master")).is_err());
    }

    #[test]
    fn create_installs_unit_once() {
        let mock = MockHost::new();
        let s = service();
        let (changes, _, queued) = converge(&mock, &s, "regionserver", Action::Create).unwrap();
        assert!(changes.contains(&"install unit hbase-regionserver.service".to_string()));
        assert!(queued.is_empty());
        assert!(mock.fs.entry("/var/run/hbase").is_some());
        let (changes, _, _) = converge(&mock, &s, "regionserver", Action::Create).unwrap();
        assert!(changes.is_empty());
        assert_eq!(mock.supervisor.count_calls("install hbase-regionserver.service"), 1);
    }

    #[test]
    fn create_with_config_renders_role_site_and_restarts_itself() {
        let mock = MockHost::new();
        mock.fs.add_dir("/etc/hbase/conf");
        let s = service().config(json!({ "hbase.thrift.port": 9090 }));
        let (_, _, queued) = converge(&mock, &s, "thrift", Action::Create).unwrap();
        assert_eq!(
            queued,
            vec![Notification::new(ResourceId::service("thrift"), Action::Restart, Timing::Delayed)]
        );
        let xml = mock.fs.contents("/etc/hbase/conf/thrift-site.xml").unwrap();
        assert!(xml.contains("<name>hbase.thrift.port</name>"));

        let quiet = ServiceResource { restart_on_config_change: false, ..s.config(json!({ "hbase.thrift.port": 9091 })) };
        let (changes, _, queued) = converge(&mock, &quiet, "thrift", Action::Create).unwrap();
        assert!(!changes.is_empty());
        assert!(queued.is_empty());
    }

    #[test]
    fn enable_and_start_are_idempotent() {
        let mock = MockHost::new();
        mock.supervisor.set_unit("hbase-master.service", MockUnit::default());
        mock.fs.add_file("/etc/hbase/conf/hbase-site.xml", b"<configuration/>");
        let s = service();
        for action in [Action::Enable, Action::Start] {
            let (changes, warnings, _) = converge(&mock, &s, "master", action).unwrap();
            assert_eq!(changes.len(), 1);
            assert!(warnings.is_empty());
            let (changes, _, _) = converge(&mock, &s, "master", action).unwrap();
            assert!(changes.is_empty());
        }
        let unit = mock.supervisor.unit("hbase-master.service").unwrap();
        assert!(unit.enabled && unit.active);
    }

    #[test]
    fn master_start_without_site_warns_and_proceeds() {
        let mock = MockHost::new();
        mock.supervisor.set_unit("hbase-master.service", MockUnit::default());
        let (changes, warnings, _) = converge(&mock, &service(), "master", Action::Start).unwrap();
        assert_eq!(changes, vec!["start hbase-master.service"]);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("hbase-site.xml does not exist"));
    }

    #[test]
    fn reload_only_when_active() {
        let mock = MockHost::new();
        mock.supervisor.set_unit("hbase-rest.service", MockUnit::default());
        let (changes, _, _) = converge(&mock, &service(), "rest", Action::Reload).unwrap();
        assert!(changes.is_empty());
        mock.supervisor.set_unit(
            "hbase-rest.service",
            MockUnit { content: None, enabled: true, active: true },
        );
        let (changes, _, _) = converge(&mock, &service(), "rest", Action::Reload).unwrap();
        assert_eq!(changes, vec!["reload hbase-rest.service"]);
    }

    #[test]
    fn supervisor_failure_names_service() {
        let mock = MockHost::new();
        mock.supervisor.set_unit("hbase-master.service", MockUnit::default());
        mock.supervisor.fail_on("restart", "hbase-master.service");
        let err = converge(&mock, &service(), "master", Action::Restart).unwrap_err();
        assert_eq!(
            err.to_string(),
            "hbase_service[master]: supervisor failed: Job for hbase-master.service failed"
        );
    }
}
