//! Every file under `conf_dir`.

use serde_json::{json, Map, Value};
use tracing::info;

use super::RecipeContext;
use crate::error::ConvergeError;
use crate::helpers::{java_options, nodes_with_role, XmlDefaults};
use crate::resources::{ConfigKind, ConfigResource, RemoteFileSpec, Resource, TemplateSpec};

pub const PROMETHEUS_AGENT: &str = "jmx_prometheus_javaagent.jar";

fn conf_path(ctx: &RecipeContext<'_>, file: &str) -> String {
    format!("{}/{}", ctx.attrs.str(&["hbase", "conf_dir"]), file)
}

fn hbase_config(ctx: &RecipeContext<'_>, kind: ConfigKind, vars: Value) -> ConfigResource {
    ConfigResource::new(kind, vars)
        .owned_by(&ctx.attrs.str(&["hbase", "user"]), &ctx.attrs.str(&["hbase", "group"]))
        .restart_services(ctx.restart_targets.clone())
}

/// Hosts for a topology list, falling back to discovery by role.
fn hosts(ctx: &RecipeContext<'_>, list: &str, role: &str) -> Vec<String> {
    let configured = ctx.attrs.strings(&["hbase", "topology", list]);
    if !configured.is_empty() {
        return configured;
    }
    nodes_with_role(ctx.search, role, &ctx.environment)
        .iter()
        .map(|n| n.address().to_string())
        .collect()
}

/// `HBASE_OPTS` for `hbase-env.sh`: the derived Java options plus the
/// metrics agent flags.
pub fn hbase_opts(ctx: &RecipeContext<'_>) -> String {
    let mut opts = java_options(ctx.attrs);
    if !ctx.attrs.bool(&["hbase", "metrics", "enabled"]) {
        return opts;
    }
    match ctx.attrs.str(&["hbase", "metrics", "provider"]).as_str() {
        "prometheus" => opts.push_str(&format!(
            " -javaagent:{}/lib/{}={}:{}",
            ctx.attrs.str(&["hbase", "install_dir"]),
            PROMETHEUS_AGENT,
            ctx.attrs.u64_or(&["hbase", "metrics", "prometheus", "port"], 9090),
            conf_path(ctx, "prometheus.yml"),
        )),
        "graphite" => opts.push_str(
            " -Dcom.sun.management.jmxremote.authenticate=false -Dcom.sun.management.jmxremote.ssl=false",
        ),
        _ => {}
    }
    opts
}

pub fn config(ctx: &mut RecipeContext<'_>) -> Result<(), ConvergeError> {
    let site = hbase_config(ctx, ConfigKind::Xml, Value::Object(ctx.attrs.map(&["hbase", "config"])))
        .with_helpers(XmlDefaults::from_attributes(ctx.attrs));
    ctx.declare(Resource::new(conf_path(ctx, "hbase-site.xml"), site))?;

    if ctx.attrs.str(&["hbase", "security", "authentication"]) == "kerberos" {
        let vars = json!({
            "principal": ctx.attrs.str(&["hbase", "security", "kerberos", "principal"]),
            "keytab": ctx.attrs.str(&["hbase", "security", "kerberos", "keytab"]),
            "realm": ctx.attrs.str(&["hbase", "security", "kerberos", "realm"]),
        });
        let jaas = TemplateSpec::new("jaas.conf", vars).meta(ctx.owned(0o600));
        let resource = ctx.with_restarts(Resource::new(conf_path(ctx, "jaas.conf"), jaas));
        ctx.declare(resource)?;
    }

    if ctx.attrs.bool(&["hbase", "metrics", "enabled"]) {
        metrics(ctx)?;
    }

    let env = json!({
        "java_home": ctx.attrs.str(&["hbase", "java_home"]),
        "hbase_conf_dir": ctx.attrs.str(&["hbase", "conf_dir"]),
        "hbase_log_dir": ctx.attrs.str(&["hbase", "log_dir"]),
        "hbase_pid_dir": ctx.attrs.str(&["hbase", "pid_dir"]),
        "hbase_opts": hbase_opts(ctx),
    });
    let env = hbase_config(ctx, ConfigKind::Env, env);
    ctx.declare(Resource::new(conf_path(ctx, "hbase-env.sh"), env))?;

    let log4j = json!({
        "log_dir": ctx.attrs.str(&["hbase", "log_dir"]),
        "log_level": ctx.attrs.str(&["hbase", "log_level"]),
    });
    let log4j = hbase_config(ctx, ConfigKind::Properties, log4j);
    ctx.declare(Resource::new(conf_path(ctx, "log4j2.properties"), log4j))?;

    let mut regionservers = hosts(ctx, "regionservers", "regionserver");
    if regionservers.is_empty() {
        regionservers.push("localhost".into());
    }
    let rs = TemplateSpec::new("regionservers", json!({ "regionservers": regionservers }))
        .meta(ctx.owned(0o644));
    ctx.declare(Resource::new(conf_path(ctx, "regionservers"), rs))?;

    if ctx.attrs.bool(&["hbase", "config", "hbase.cluster.distributed"]) {
        let backup_masters = hosts(ctx, "backup_masters", "backup_master");
        if backup_masters.is_empty() {
            info!("no backup masters, skipping backup-masters");
        } else {
            let bm = TemplateSpec::new("backup-masters", json!({ "backup_masters": backup_masters }))
                .meta(ctx.owned(0o644));
            ctx.declare(Resource::new(conf_path(ctx, "backup-masters"), bm))?;
        }
    }

    if ctx.attrs.str(&["hbase", "config", "hbase.rootdir"]).starts_with("hdfs://") {
        for (file, key) in [("core-site.xml", "core_site"), ("hdfs-site.xml", "hdfs_site")] {
            let props: Map<String, Value> = ctx.attrs.map(&["hbase", "hadoop", key]);
            if props.is_empty() {
                continue;
            }
            let hadoop = hbase_config(ctx, ConfigKind::Xml, Value::Object(props));
            ctx.declare(Resource::new(conf_path(ctx, file), hadoop))?;
        }
    }
    Ok(())
}

fn metrics(ctx: &mut RecipeContext<'_>) -> Result<(), ConvergeError> {
    if ctx.attrs.str(&["hbase", "metrics", "provider"]) != "prometheus" {
        return Ok(());
    }
    let agent = RemoteFileSpec {
        url: ctx.attrs.str(&["hbase", "metrics", "prometheus", "agent_url"]),
        checksum: ctx.attrs.opt_str(&["hbase", "metrics", "prometheus", "agent_checksum"]),
        meta: ctx.owned(0o644),
    };
    let path = format!("{}/lib/{}", ctx.attrs.str(&["hbase", "install_dir"]), PROMETHEUS_AGENT);
    let agent = ctx.with_restarts(Resource::new(path, agent));
    ctx.declare(agent)?;

    let vars = json!({ "prefix": ctx.attrs.str_or(&["hbase", "metrics", "graphite", "prefix"], "hbase") });
    let yml = TemplateSpec::new("prometheus.yml", vars).meta(ctx.owned(0o644));
    let yml = ctx.with_restarts(Resource::new(conf_path(ctx, "prometheus.yml"), yml));
    ctx.declare(yml)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::mock::{MockHost, MockSearch};
    use crate::infrastructure::NodeDescriptor;
    use crate::recipes::testing::{compile, converge};
    use crate::types::resource::{ResourceId, ResourceKind};

    const CONF: &str = "/etc/hbase/conf";

    fn node(name: &str, role: &str) -> NodeDescriptor {
        NodeDescriptor {
            name: name.into(),
            fqdn: Some(format!("{}.example.com", name)),
            environment: None,
            role: Some(role.into()),
        }
    }

    fn conf_mock() -> MockHost {
        let mock = MockHost::new();
        mock.fs.add_dir(CONF);
        mock
    }

    #[test]
    fn renders_core_files() {
        let (_, engine) = compile(json!({}), &MockSearch::default(), &["hbase::config"]).unwrap();
        let mock = conf_mock();
        let report = converge(&engine, &mock);
        assert!(report.is_success());

        let site = mock.fs.contents("/etc/hbase/conf/hbase-site.xml").unwrap();
        let rootdir = site.find("<name>hbase.rootdir</name>").unwrap();
        let quorum = site.find("<name>hbase.zookeeper.quorum</name>").unwrap();
        assert!(rootdir < quorum);
        assert!(site.contains("<value>file:///var/hbase</value>"));

        let env = mock.fs.contents("/etc/hbase/conf/hbase-env.sh").unwrap();
        assert!(env.contains("export HBASE_LOG_DIR=/var/log/hbase\n"));
        assert!(env.contains("-Dhbase.log.dir=/var/log/hbase"));

        assert_eq!(mock.fs.contents("/etc/hbase/conf/regionservers").unwrap().trim(), "localhost");
        assert!(mock.fs.contents("/etc/hbase/conf/backup-masters").is_none());
        assert!(mock
            .fs
            .contents("/etc/hbase/conf/log4j2.properties")
            .unwrap()
            .contains("rootLogger = INFO,DRFA"));

        let again = converge(&engine, &mock);
        assert_eq!(again.summary.updated, 0);
    }

    #[test]
    fn regionservers_come_from_topology_or_discovery() {
        let search = MockSearch::with_nodes(vec![node("rs2", "regionserver"), node("rs1", "regionserver")]);
        let (_, engine) = compile(json!({}), &search, &["hbase::config"]).unwrap();
        let mock = conf_mock();
        converge(&engine, &mock);
        assert_eq!(
            mock.fs.contents("/etc/hbase/conf/regionservers").unwrap(),
            "rs1.example.com\nrs2.example.com\n"
        );

        let (_, engine) = compile(
            json!({ "hbase": { "topology": { "regionservers": ["a", "b"] } } }),
            &search,
            &["hbase::config"],
        )
        .unwrap();
        let mock = conf_mock();
        converge(&engine, &mock);
        assert_eq!(mock.fs.contents("/etc/hbase/conf/regionservers").unwrap(), "a\nb\n");
    }

    #[test]
    fn unavailable_discovery_falls_back_to_localhost() {
        let (_, engine) = compile(json!({}), &MockSearch::unavailable(), &["hbase::config"]).unwrap();
        let mock = conf_mock();
        converge(&engine, &mock);
        assert_eq!(mock.fs.contents("/etc/hbase/conf/regionservers").unwrap(), "localhost\n");
    }

    #[test]
    fn backup_masters_only_when_distributed() {
        let overrides = json!({ "hbase": {
            "config": { "hbase.cluster.distributed": true },
            "topology": { "backup_masters": ["bm1"] }
        } });
        let (_, engine) = compile(overrides, &MockSearch::default(), &["hbase::config"]).unwrap();
        assert!(engine.contains(&ResourceId::new(ResourceKind::Template, "/etc/hbase/conf/backup-masters")));

        let (_, engine) = compile(
            json!({ "hbase": { "topology": { "backup_masters": ["bm1"] } } }),
            &MockSearch::default(),
            &["hbase::config"],
        )
        .unwrap();
        assert!(!engine.contains(&ResourceId::new(ResourceKind::Template, "/etc/hbase/conf/backup-masters")));
    }

    #[test]
    fn kerberos_adds_jaas_and_login_config() {
        let (_, engine) = compile(
            json!({ "hbase": { "security": { "authentication": "kerberos" } } }),
            &MockSearch::default(),
            &["hbase::config"],
        )
        .unwrap();
        let mock = conf_mock();
        converge(&engine, &mock);
        let jaas = mock.fs.entry("/etc/hbase/conf/jaas.conf").unwrap();
        assert_eq!(jaas.mode, 0o600);
        assert!(String::from_utf8_lossy(&jaas.content).contains("principal=\"hbase/_HOST@EXAMPLE.COM\";"));
        let env = mock.fs.contents("/etc/hbase/conf/hbase-env.sh").unwrap();
        assert!(env.contains("-Djava.security.auth.login.config=/etc/hbase/conf/jaas.conf"));
    }

    #[test]
    fn prometheus_agent_and_flags() {
        let (_, engine) = compile(
            json!({ "hbase": { "metrics": { "enabled": true } } }),
            &MockSearch::default(),
            &["hbase::config"],
        )
        .unwrap();
        let mock = conf_mock();
        mock.fs.add_dir("/opt/hbase/lib");
        let report = converge(&engine, &mock);
        assert!(report.is_success());
        assert_eq!(mock.fetcher.downloaded_urls().len(), 1);
        let env = mock.fs.contents("/etc/hbase/conf/hbase-env.sh").unwrap();
        assert!(env.contains(
            "-javaagent:/opt/hbase/lib/jmx_prometheus_javaagent.jar=9090:/etc/hbase/conf/prometheus.yml"
        ));
        assert!(mock.fs.contents("/etc/hbase/conf/prometheus.yml").unwrap().contains("name: hbase_$1_$2_$3"));
    }

    #[test]
    fn graphite_only_adds_jmx_flags() {
        let (_, engine) = compile(
            json!({ "hbase": { "metrics": { "enabled": true, "provider": "graphite" } } }),
            &MockSearch::default(),
            &["hbase::config"],
        )
        .unwrap();
        assert!(!engine.contains(&ResourceId::new(ResourceKind::Template, "/etc/hbase/conf/prometheus.yml")));
        let mock = conf_mock();
        converge(&engine, &mock);
        assert!(mock
            .fs
            .contents("/etc/hbase/conf/hbase-env.sh")
            .unwrap()
            .contains("-Dcom.sun.management.jmxremote.ssl=false"));
    }

    #[test]
    fn hadoop_files_only_on_hdfs() {
        let hadoop = json!({ "core_site": { "fs.defaultFS": "hdfs://nn:8020" }, "hdfs_site": {} });
        let (_, engine) = compile(
            json!({ "hbase": { "hadoop": hadoop.clone(), "config": { "hbase.rootdir": "hdfs://nn:8020/hbase" } } }),
            &MockSearch::default(),
            &["hbase::config"],
        )
        .unwrap();
        let core = ResourceId::new(ResourceKind::HbaseConfig, "/etc/hbase/conf/core-site.xml");
        assert!(engine.contains(&core));
        assert!(!engine.contains(&ResourceId::new(ResourceKind::HbaseConfig, "/etc/hbase/conf/hdfs-site.xml")));

        let mock = conf_mock();
        converge(&engine, &mock);
        let core_site = mock.fs.contents("/etc/hbase/conf/core-site.xml").unwrap();
        assert!(core_site.contains("<name>fs.defaultFS</name>"));
        assert!(!core_site.contains("hbase.rootdir"));

        let (_, engine) = compile(json!({ "hbase": { "hadoop": hadoop } }), &MockSearch::default(), &["hbase::config"]).unwrap();
        assert!(!engine.contains(&core));
    }
}
