//! The full node: Java, account, install, config, then the role's services.

use std::path::Path;

use serde_json::{json, Value};
use tracing::info;

use super::RecipeContext;
use crate::data::attributes::AttributeTree;
use crate::error::ConvergeError;
use crate::helpers::{is_backup_master, is_master, is_regionserver, local_services, HbaseRole};
use crate::resources::{FileSpec, Resource};

const ACCESS_CONTROLLER: &str = "org.apache.hadoop.hbase.security.access.AccessController";
const TOKEN_PROVIDER: &str = "org.apache.hadoop.hbase.security.token.TokenProvider";

/// Write the Kerberos security properties into `hbase.config`. Values the
/// node already sets are kept.
pub fn derive_kerberos(attrs: &mut AttributeTree) {
    let krb = |key: &str| attrs.get(&["hbase", "security", "kerberos", key]).clone();
    let keytab = krb("keytab");
    let derived: Vec<(&str, Value)> = vec![
        ("hbase.security.authentication", json!("kerberos")),
        (
            "hbase.security.authorization",
            attrs.get(&["hbase", "security", "authorization"]).clone(),
        ),
        ("hbase.master.kerberos.principal", krb("server_principal")),
        ("hbase.regionserver.kerberos.principal", krb("regionserver_principal")),
        ("hbase.master.keytab.file", keytab.clone()),
        ("hbase.regionserver.keytab.file", keytab),
        ("hbase.rpc.protection", json!("privacy")),
        ("hbase.coprocessor.master.classes", json!(ACCESS_CONTROLLER)),
        (
            "hbase.coprocessor.region.classes",
            json!(format!("{},{}", TOKEN_PROVIDER, ACCESS_CONTROLLER)),
        ),
    ];
    for (key, value) in derived {
        attrs.set_default(&["hbase", "config", key], value);
    }
}

pub fn default(ctx: &mut RecipeContext<'_>) -> Result<(), ConvergeError> {
    info!("starting HBase installation");
    let kerberos = ctx.attrs.str(&["hbase", "security", "authentication"]) == "kerberos";
    if kerberos {
        info!("configuring HBase with Kerberos authentication");
        derive_kerberos(ctx.attrs);
    }
    ctx.restart_targets = local_services(ctx.attrs)
        .iter()
        .map(|r| r.as_str().to_string())
        .collect();

    for recipe in ["hbase::java", "hbase::user", "hbase::install", "hbase::config"] {
        ctx.include_recipe(recipe)?;
    }

    if kerberos {
        let keytab = ctx.attrs.str(&["hbase", "security", "kerberos", "keytab"]);
        let probe = keytab.clone();
        let spec = FileSpec {
            meta: ctx.owned(0o400),
            content: None,
        };
        ctx.declare(
            Resource::new(keytab, spec).only_if(move |host| host.path_exists(Path::new(&probe))),
        )?;
    }

    let role_recipe = if is_regionserver(ctx.attrs) {
        "hbase::regionserver"
    } else if is_backup_master(ctx.attrs) {
        "hbase::backup_master"
    } else {
        if !is_master(ctx.attrs) {
            info!("no topology role, setting up a standalone master");
        }
        "hbase::master"
    };
    ctx.include_recipe(role_recipe)?;

    for role in [HbaseRole::Thrift, HbaseRole::Rest] {
        if ctx.attrs.bool(&["hbase", "services", role.as_str(), "enabled"]) {
            ctx.include_recipe(&format!("hbase::{}", role))?;
        }
    }
    info!("HBase recipes compiled");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convergence::Status;
    use crate::data::defaults::default_attributes;
    use crate::helpers::hbase_principal;
    use crate::infrastructure::mock::{MockHost, MockSearch};
    use crate::recipes::testing::{compile, converge};
    use crate::types::resource::{Action, ResourceId, ResourceKind};

    fn standalone_mock() -> MockHost {
        let mock = MockHost::new();
        for dir in ["/etc/profile.d", "/etc/security/limits.d"] {
            mock.fs.add_dir(dir);
        }
        mock
    }

    #[test]
    fn kerberos_derivation_keeps_node_values() {
        let mut attrs = default_attributes();
        attrs.set(&["hbase", "security", "authentication"], json!("kerberos"));
        attrs.set(&["hbase", "config", "hbase.rpc.protection"], json!("integrity"));
        derive_kerberos(&mut attrs);
        assert_eq!(attrs.str(&["hbase", "config", "hbase.rpc.protection"]), "integrity");
        assert_eq!(
            attrs.str(&["hbase", "config", "hbase.master.kerberos.principal"]),
            "hbase/_HOST@EXAMPLE.COM"
        );
        assert_eq!(
            attrs.str(&["hbase", "config", "hbase.regionserver.keytab.file"]),
            "/etc/hbase/conf/hbase.keytab"
        );
        assert_eq!(hbase_principal(&attrs).as_deref(), Some("hbase/_HOST@EXAMPLE.COM"));
    }

    #[test]
    fn standalone_node_converges_then_settles() {
        let (attrs, engine) = compile(json!({}), &MockSearch::default(), &["hbase::default"]).unwrap();
        assert_eq!(attrs.str(&["hbase", "java_home"]), "/usr/lib/jvm/java-11-openjdk-amd64");

        let mock = standalone_mock();
        let report = converge(&engine, &mock);
        assert!(report.is_success(), "{:?}", report.failures().collect::<Vec<_>>());

        let unit = mock.supervisor.unit("hbase-master.service").unwrap();
        assert!(unit.enabled && unit.active);
        assert!(unit
            .content
            .unwrap()
            .contains("Environment=\"JAVA_HOME=/usr/lib/jvm/java-11-openjdk-amd64\""));
        assert!(mock.fs.contents("/etc/hbase/conf/hbase-site.xml").is_some());
        // Config and the install changed, so master restarts once at the end.
        assert_eq!(mock.supervisor.count_calls("restart hbase-master.service"), 1);
        assert_eq!(report.results.last().unwrap().action, Action::Restart);

        let again = converge(&engine, &mock);
        assert_eq!(again.summary.updated, 0, "{:?}", again.results);
        assert_eq!(mock.supervisor.count_calls("restart hbase-master.service"), 1);
    }

    #[test]
    fn regionserver_with_thrift_and_rest() {
        let (_, engine) = compile(
            json!({ "hbase": {
                "topology": { "role": "regionserver" },
                "services": { "thrift": { "enabled": true }, "rest": { "enabled": true } }
            } }),
            &MockSearch::default(),
            &["hbase::default"],
        )
        .unwrap();
        for role in ["regionserver", "thrift", "rest"] {
            assert!(engine.contains(&ResourceId::service(role)), "{}", role);
        }
        assert!(!engine.contains(&ResourceId::service("master")));

        let mock = standalone_mock();
        let report = converge(&engine, &mock);
        assert!(report.is_success());
        for unit in ["hbase-regionserver.service", "hbase-thrift.service", "hbase-rest.service"] {
            assert_eq!(mock.supervisor.count_calls(&format!("restart {}", unit)), 1, "{}", unit);
        }
    }

    #[test]
    fn backup_master_role_runs_the_master_daemon() {
        let (_, engine) = compile(
            json!({ "hbase": { "topology": { "role": "backup_master" } } }),
            &MockSearch::default(),
            &["hbase::default"],
        )
        .unwrap();
        assert!(engine.contains(&ResourceId::service("master")));
        assert!(!engine.contains(&ResourceId::service("regionserver")));
    }

    #[test]
    fn kerberos_keytab_only_if_present() {
        let overrides = json!({ "hbase": { "security": { "authentication": "kerberos" } } });
        let (attrs, engine) = compile(overrides, &MockSearch::default(), &["hbase::default"]).unwrap();
        assert_eq!(attrs.str(&["hbase", "config", "hbase.security.authentication"]), "kerberos");

        let mock = standalone_mock();
        let report = converge(&engine, &mock);
        let keytab = ResourceId::new(ResourceKind::File, "/etc/hbase/conf/hbase.keytab");
        assert_eq!(
            report.result(&keytab, Action::Create).unwrap().status,
            Status::skipped("guard")
        );
        let site = mock.fs.contents("/etc/hbase/conf/hbase-site.xml").unwrap();
        assert!(site.contains("<name>hbase.rpc.protection</name>\n    <value>privacy</value>"));

        mock.fs.add_file("/etc/hbase/conf/hbase.keytab", b"keytab");
        let report = converge(&engine, &mock);
        assert_eq!(report.result(&keytab, Action::Create).unwrap().status, Status::Updated);
        let entry = mock.fs.entry("/etc/hbase/conf/hbase.keytab").unwrap();
        assert_eq!((entry.owner.as_str(), entry.mode), ("hbase", 0o400));
    }

    #[test]
    fn config_write_failure_leaves_other_files_converging() {
        let (_, engine) = compile(json!({}), &MockSearch::default(), &["hbase::default"]).unwrap();
        let mock = standalone_mock();
        mock.fetcher.set_installed("/opt/hbase", "2.4.0");
        mock.fs.add_dir("/etc/hbase/conf");
        mock.fs.fail_writes_to("/etc/hbase/conf/hbase-site.xml");
        let report = converge(&engine, &mock);
        assert_eq!(report.summary.failed, 1);
        // hbase-env.sh still changed and queued the restart.
        assert_eq!(
            report
                .result(&ResourceId::service("master"), Action::Restart)
                .unwrap()
                .status,
            Status::Updated
        );
        assert!(mock.fs.contents("/etc/hbase/conf/hbase-env.sh").is_some());
    }
}
