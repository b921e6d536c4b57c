//! One recipe per HBase daemon.

use serde_json::{Map, Value};
use tracing::info;

use super::RecipeContext;
use crate::error::ConvergeError;
use crate::helpers::HbaseRole;
use crate::resources::{Resource, ServiceResource};
use crate::types::resource::{Action, ResourceId};

/// Declare `hbase_service[<role>]` with create, enable and start. The
/// role-specific config is recorded back under `service_mapping`.
fn service(ctx: &mut RecipeContext<'_>, role: HbaseRole) -> Result<(), ConvergeError> {
    let name = role.as_str();
    if ctx.engine.contains(&ResourceId::service(name)) {
        return Ok(());
    }
    info!(
        role = name,
        node = %ctx.attrs.str(&["platform", "fqdn"]),
        "setting up HBase {}",
        role.title()
    );

    let mut fallback = Value::Object(Map::new());
    if matches!(role, HbaseRole::Thrift | HbaseRole::Rest) {
        let configured = ctx.attrs.get(&["hbase", "services", name, "config"]);
        if configured.is_object() {
            fallback = configured.clone();
        }
    }
    ctx.attrs
        .set_default(&["hbase", "service_mapping", name, "config"], fallback);
    let config = ctx.attrs.get(&["hbase", "service_mapping", name, "config"]).clone();

    let spec = ServiceResource::from_attributes(ctx.attrs).config(config);
    ctx.declare(
        Resource::new(name, spec).actions(&[Action::Create, Action::Enable, Action::Start]),
    )?;
    Ok(())
}

pub fn master(ctx: &mut RecipeContext<'_>) -> Result<(), ConvergeError> {
    service(ctx, HbaseRole::Master)
}

pub fn regionserver(ctx: &mut RecipeContext<'_>) -> Result<(), ConvergeError> {
    service(ctx, HbaseRole::Regionserver)
}

/// Same daemon as the master; the node is listed in `backup-masters`.
pub fn backup_master(ctx: &mut RecipeContext<'_>) -> Result<(), ConvergeError> {
    info!("node runs as backup master");
    service(ctx, HbaseRole::Master)
}

pub fn thrift(ctx: &mut RecipeContext<'_>) -> Result<(), ConvergeError> {
    service(ctx, HbaseRole::Thrift)
}

pub fn rest(ctx: &mut RecipeContext<'_>) -> Result<(), ConvergeError> {
    service(ctx, HbaseRole::Rest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::mock::{MockHost, MockSearch};
    use crate::recipes::testing::{compile, converge};
    use crate::resources::ResourceSpec;
    use serde_json::json;

    fn service_spec(engine: &crate::convergence::Engine, role: &str) -> ServiceResource {
        match &engine.get(&ResourceId::service(role)).unwrap().spec {
            ResourceSpec::HbaseService(s) => s.clone(),
            _ => panic!("not a service"),
        }
    }

    #[test]
    fn master_and_backup_master_share_one_service() {
        let (_, engine) = compile(
            json!({}),
            &MockSearch::default(),
            &["hbase::master", "hbase::backup_master"],
        )
        .unwrap();
        assert_eq!(engine.len(), 1);
        let master = engine.get(&ResourceId::service("master")).unwrap();
        assert_eq!(master.actions, vec![Action::Create, Action::Enable, Action::Start]);
    }

    #[test]
    fn thrift_config_falls_back_to_services_attribute() {
        let (attrs, engine) = compile(
            json!({ "hbase": { "services": { "thrift": { "config": { "hbase.thrift.port": 9091 } } } } }),
            &MockSearch::default(),
            &["hbase::thrift"],
        )
        .unwrap();
        assert_eq!(service_spec(&engine, "thrift").config, json!({ "hbase.thrift.port": 9091 }));
        assert_eq!(
            attrs.get(&["hbase", "service_mapping", "thrift", "config"]),
            &json!({ "hbase.thrift.port": 9091 })
        );
    }

    #[test]
    fn service_mapping_config_wins() {
        let (_, engine) = compile(
            json!({ "hbase": {
                "service_mapping": { "rest": { "config": { "hbase.rest.port": 8081 } } },
                "services": { "rest": { "config": { "hbase.rest.port": 9999 } } }
            } }),
            &MockSearch::default(),
            &["hbase::rest"],
        )
        .unwrap();
        assert_eq!(service_spec(&engine, "rest").config, json!({ "hbase.rest.port": 8081 }));
    }

    #[test]
    fn regionserver_unit_is_started() {
        let (_, engine) = compile(json!({}), &MockSearch::default(), &["hbase::regionserver"]).unwrap();
        let mock = MockHost::new();
        let report = converge(&engine, &mock);
        assert!(report.is_success());
        let unit = mock.supervisor.unit("hbase-regionserver.service").unwrap();
        assert!(unit.enabled && unit.active);
        assert!(unit
            .content
            .unwrap()
            .contains("ExecStart=/opt/hbase/bin/hbase-daemon.sh start regionserver"));
    }
}
