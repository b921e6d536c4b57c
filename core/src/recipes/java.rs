//! JDK install and `JAVA_HOME` resolution.

use serde_json::Value;

use super::RecipeContext;
use crate::error::ConvergeError;
use crate::resources::{ExecuteSpec, FileSpec, LogLevel, LogSpec, PackageSpec, Resource};
use crate::resources::file::Metadata;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JdkFamily {
    Debian,
    Rhel,
    Unsupported,
}

fn jdk_family(platform_family: &str) -> JdkFamily {
    match platform_family {
        "debian" => JdkFamily::Debian,
        "rhel" | "fedora" | "amazon" => JdkFamily::Rhel,
        _ => JdkFamily::Unsupported,
    }
}

/// Default `JAVA_HOME` for a JDK version on a platform family.
pub fn default_java_home(platform_family: &str, version: &str) -> String {
    match jdk_family(platform_family) {
        JdkFamily::Debian => format!("/usr/lib/jvm/java-{}-openjdk-amd64", version),
        _ => format!("/usr/lib/jvm/java-{}-openjdk", version),
    }
}

pub fn java(ctx: &mut RecipeContext<'_>) -> Result<(), ConvergeError> {
    let family = ctx.attrs.str(&["platform", "family"]);
    let version = ctx.attrs.str(&["hbase", "java", "version"]);
    let supported = jdk_family(&family) != JdkFamily::Unsupported;

    if ctx.attrs.opt_str(&["hbase", "java_home"]).is_none() {
        if !supported {
            ctx.declare(Resource::new(
                "java_unsupported_platform",
                LogSpec {
                    message: Some(format!(
                        "Unsupported platform family: {}. Setting default Java home.",
                        family
                    )),
                    level: LogLevel::Warn,
                },
            ))?;
        }
        let home = default_java_home(&family, &version);
        ctx.attrs
            .set(&["hbase", "java_home"], Value::String(home));
    }

    match jdk_family(&family) {
        JdkFamily::Debian => {
            ctx.declare(Resource::new(format!("openjdk-{}-jdk", version), PackageSpec))?;
        }
        JdkFamily::Rhel => {
            ctx.declare(Resource::new(format!("java-{}-openjdk-devel", version), PackageSpec))?;
        }
        JdkFamily::Unsupported => {
            ctx.declare(Resource::new(
                "java_install_unsupported",
                LogSpec {
                    message: Some(format!(
                        "Unsupported platform family for Java installation: {}. Please install Java manually.",
                        family
                    )),
                    level: LogLevel::Warn,
                },
            ))?;
        }
    }

    ctx.declare(Resource::new(
        "verify_java_installation",
        ExecuteSpec::check("java -version"),
    ))?;

    let java_home = ctx.attrs.str(&["hbase", "java_home"]);
    ctx.declare(Resource::new(
        "/etc/profile.d/java_home.sh",
        FileSpec {
            meta: Metadata {
                mode: Some(0o755),
                ..Metadata::default()
            },
            content: Some(format!("export JAVA_HOME={}\n", java_home)),
        },
    ))?;
    Ok(())
}
