//! apt/dnf package manager driven through a `CommandRunner`.

use super::{shell_escape, CommandRunner, PackageManager};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageFamily {
    Debian,
    Rhel,
}

impl PackageFamily {
    /// `rhel` selects dnf/rpm; anything else apt/dpkg.
    pub fn from_platform(family: &str) -> Self {
        if family == "rhel" {
            PackageFamily::Rhel
        } else {
            PackageFamily::Debian
        }
    }

    fn query(&self, name: &str) -> String {
        match self {
            PackageFamily::Debian => format!(
                "dpkg-query -W -f='${{Status}}' {}",
                shell_escape(name)
            ),
            PackageFamily::Rhel => format!("rpm -q {}", shell_escape(name)),
        }
    }

    fn install(&self, name: &str) -> String {
        match self {
            PackageFamily::Debian => format!(
                "DEBIAN_FRONTEND=noninteractive apt-get install -y -q {}",
                shell_escape(name)
            ),
            PackageFamily::Rhel => format!("dnf install -y -q {}", shell_escape(name)),
        }
    }

    fn remove(&self, name: &str) -> String {
        match self {
            PackageFamily::Debian => format!(
                "DEBIAN_FRONTEND=noninteractive apt-get remove -y -q {}",
                shell_escape(name)
            ),
            PackageFamily::Rhel => format!("dnf remove -y -q {}", shell_escape(name)),
        }
    }
}

pub struct SystemPackageManager {
    runner: Box<dyn CommandRunner>,
    family: PackageFamily,
}

impl SystemPackageManager {
    pub fn new(runner: Box<dyn CommandRunner>, family: PackageFamily) -> Self {
        SystemPackageManager { runner, family }
    }
}

impl PackageManager for SystemPackageManager {
    fn is_installed(&self, name: &str) -> Result<bool, String> {
        match self.runner.run(&self.family.query(name)) {
            Ok(out) => Ok(match self.family {
                PackageFamily::Debian => out.contains("install ok installed"),
                PackageFamily::Rhel => true,
            }),
            // Both query tools exit non-zero for unknown packages.
            Err(_) => Ok(false),
        }
    }

    fn install(&mut self, name: &str) -> Result<(), String> {
        self.runner.run(&self.family.install(name)).map(|_| ())
    }

    fn remove(&mut self, name: &str) -> Result<(), String> {
        self.runner.run(&self.family.remove(name)).map(|_| ())
    }
}
