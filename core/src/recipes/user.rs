//! Service account and its resource limits.

use serde_json::json;

use super::RecipeContext;
use crate::error::ConvergeError;
use crate::resources::file::Metadata;
use crate::resources::{GroupSpec, Resource, TemplateSpec, UserSpec};

pub const LIMITS_PATH: &str = "/etc/security/limits.d/hbase.conf";

pub fn user(ctx: &mut RecipeContext<'_>) -> Result<(), ConvergeError> {
    let attrs = &*ctx.attrs;
    let name = attrs.str(&["hbase", "user"]);
    let group = attrs.str(&["hbase", "group"]);
    let gid = attrs.get(&["hbase", "gid"]).as_u64().map(|g| g as u32);
    let uid = attrs.get(&["hbase", "uid"]).as_u64().map(|u| u as u32);
    let home = attrs.str(&["hbase", "install_dir"]);

    ctx.declare(Resource::new(group.as_str(), GroupSpec { gid, system: true }))?;
    ctx.declare(Resource::new(
        name,
        UserSpec {
            uid,
            group: Some(group),
            home: Some(home),
            shell: Some("/bin/bash".into()),
            comment: Some("HBase Service Account".into()),
            system: true,
        },
    ))?;
    ctx.include_recipe("hbase::limits")?;
    Ok(())
}

pub fn limits(ctx: &mut RecipeContext<'_>) -> Result<(), ConvergeError> {
    let vars = json!({
        "user": ctx.attrs.str(&["hbase", "user"]),
        "nofile": ctx.attrs.u64_or(&["hbase", "limits", "nofile"], 32768),
        "nproc": ctx.attrs.u64_or(&["hbase", "limits", "nproc"], 65536),
    });
    ctx.declare(Resource::new(
        LIMITS_PATH,
        TemplateSpec::new("limits.conf", vars).meta(Metadata {
            mode: Some(0o644),
            ..Metadata::default()
        }),
    ))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::mock::{MockHost, MockSearch};
    use crate::recipes::testing::{compile, converge};
    use crate::convergence::Status;
    use crate::types::resource::{Action, ResourceId, ResourceKind};

    #[test]
    fn creates_account_then_limits() {
        let (_, engine) = compile(
            serde_json::json!({ "hbase": { "limits": { "nofile": 65536 } } }),
            &MockSearch::default(),
            &["hbase::user"],
        )
        .unwrap();
        let mock = MockHost::new();
        mock.fs.add_dir("/etc/security/limits.d");
        let report = converge(&engine, &mock);
        assert!(report.is_success());

        let user = mock.accounts.user_info("hbase").unwrap();
        assert_eq!(user.uid, 2313);
        assert_eq!(user.home, "/opt/hbase");
        assert_eq!(user.shell, "/bin/bash");
        assert_eq!(mock.accounts.group_info("hbase").unwrap().gid, 2313);

        let limits = mock.fs.contents(LIMITS_PATH).unwrap();
        assert!(limits.contains("hbase - nofile 65536\n"));
        assert!(limits.contains("hbase - nproc 65536\n"));

        let again = converge(&engine, &mock);
        assert_eq!(
            again
                .result(&ResourceId::new(ResourceKind::User, "hbase"), Action::Create)
                .unwrap()
                .status,
            Status::Unchanged
        );
        assert_eq!(again.summary.updated, 0);
    }
}
