//! Directories plus the HBase distribution, from a tarball or packages.

use std::path::{Path, PathBuf};

use super::RecipeContext;
use crate::error::ConvergeError;
use crate::resources::{ArkSpec, DirectorySpec, PackageSpec, Resource};

/// Local directory backing a `file://` root dir. `None` on HDFS.
pub fn local_rootdir(rootdir: &str) -> Option<String> {
    if rootdir.starts_with("hdfs://") || rootdir.is_empty() {
        return None;
    }
    Some(rootdir.trim_start_matches("file://").to_string())
}

pub fn tarball_url(mirror: &str, version: &str) -> String {
    format!(
        "{}/{}/hbase-{}-bin.tar.gz",
        mirror.trim_end_matches('/'),
        version,
        version
    )
}

fn directory(ctx: &mut RecipeContext<'_>, path: &str) -> Result<(), ConvergeError> {
    let spec = DirectorySpec {
        meta: ctx.owned(0o755),
        recursive: true,
    };
    ctx.declare_once(Resource::new(path, spec))?;
    Ok(())
}

pub fn install(ctx: &mut RecipeContext<'_>) -> Result<(), ConvergeError> {
    let method = ctx.attrs.str_or(&["hbase", "install", "method"], "binary");

    // The binary install owns install_dir as a symlink.
    let mut dirs = vec!["conf_dir", "log_dir", "pid_dir"];
    if method != "binary" {
        dirs.push("install_dir");
    }
    for key in dirs {
        let path = ctx.attrs.str(&["hbase", key]);
        directory(ctx, &path)?;
    }

    if let Some(root) = local_rootdir(&ctx.attrs.str(&["hbase", "config", "hbase.rootdir"])) {
        directory(ctx, &root)?;
    }
    if let Some(data_dir) = ctx
        .attrs
        .opt_str(&["hbase", "config", "hbase.zookeeper.property.dataDir"])
    {
        directory(ctx, &data_dir)?;
    }

    match method.as_str() {
        "binary" => {
            let version = ctx.attrs.str(&["hbase", "version"]);
            let home_dir = PathBuf::from(ctx.attrs.str(&["hbase", "install_dir"]));
            let prefix = home_dir
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("/"));
            let ark = ArkSpec {
                url: tarball_url(&ctx.attrs.str(&["hbase", "mirror"]), &version),
                version,
                checksum: ctx.attrs.opt_str(&["hbase", "checksum"]),
                prefix,
                home_dir,
                owner: ctx.attrs.str(&["hbase", "user"]),
                group: ctx.attrs.str(&["hbase", "group"]),
            };
            let resource = ctx.with_restarts(Resource::new("hbase", ark));
            ctx.declare(resource)?;
        }
        "package" => {
            for pkg in ctx.attrs.strings(&["hbase", "install", "packages"]) {
                ctx.declare_once(Resource::new(pkg, PackageSpec))?;
            }
        }
        other => {
            return Err(ConvergeError::InvalidProperty {
                resource: "hbase::install".into(),
                property: "hbase.install.method".into(),
                reason: format!("must be binary or package, got '{}'", other),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::mock::{MockHost, MockSearch};
    use crate::recipes::testing::{compile, converge};
    use crate::types::resource::{ResourceId, ResourceKind};
    use serde_json::json;

    fn dir(path: &str) -> ResourceId {
        ResourceId::new(ResourceKind::Directory, path)
    }

    #[test]
    fn rootdir_handling() {
        assert_eq!(local_rootdir("file:///var/hbase").as_deref(), Some("/var/hbase"));
        assert_eq!(local_rootdir("/data/hbase").as_deref(), Some("/data/hbase"));
        assert_eq!(local_rootdir("hdfs://nn:8020/hbase"), None);
    }

    #[test]
    fn url_from_mirror() {
        assert_eq!(
            tarball_url("https://downloads.apache.org/hbase/", "2.5.8"),
            "https://downloads.apache.org/hbase/2.5.8/hbase-2.5.8-bin.tar.gz"
        );
    }

    #[test]
    fn binary_install_unpacks_and_skips_install_dir() {
        let (_, engine) = compile(json!({}), &MockSearch::default(), &["hbase::install"]).unwrap();
        assert!(!engine.contains(&dir("/opt/hbase")));
        assert!(engine.contains(&dir("/var/hbase")));
        assert!(engine.contains(&dir("/var/lib/zookeeper")));

        let mock = MockHost::new();
        let report = converge(&engine, &mock);
        assert!(report.is_success(), "{:?}", report.failures().collect::<Vec<_>>());
        assert_eq!(
            mock.fetcher.fetched_urls(),
            vec!["https://downloads.apache.org/hbase/2.4.0/hbase-2.4.0-bin.tar.gz"]
        );
        assert_eq!(mock.fs.entry("/etc/hbase/conf").unwrap().owner, "hbase");

        let again = converge(&engine, &mock);
        assert_eq!(again.summary.updated, 0);
        assert_eq!(mock.fetcher.fetched_urls().len(), 1);
    }

    #[test]
    fn hdfs_rootdir_has_no_local_dir() {
        let (_, engine) = compile(
            json!({ "hbase": { "config": { "hbase.rootdir": "hdfs://nn:8020/hbase" } } }),
            &MockSearch::default(),
            &["hbase::install"],
        )
        .unwrap();
        assert_eq!(
            engine
                .resources()
                .iter()
                .filter(|r| r.id().kind == ResourceKind::Directory)
                .count(),
            4
        );
    }

    #[test]
    fn package_install() {
        let (_, engine) = compile(
            json!({ "hbase": { "install": { "method": "package", "packages": ["hbase", "hbase-master"] } } }),
            &MockSearch::default(),
            &["hbase::install"],
        )
        .unwrap();
        assert!(engine.contains(&dir("/opt/hbase")));
        let mock = MockHost::new();
        converge(&engine, &mock);
        assert_eq!(mock.packages.install_attempts(), vec!["hbase", "hbase-master"]);
    }

    #[test]
    fn unknown_method_is_rejected() {
        let err = compile(
            json!({ "hbase": { "install": { "method": "source" } } }),
            &MockSearch::default(),
            &["hbase::install"],
        )
        .err()
        .unwrap();
        assert!(err.to_string().contains("must be binary or package"));
    }
}
