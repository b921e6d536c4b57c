//! systemd command builder and supervisor.
//!
//! `SystemctlCommandBuilder` only builds `systemctl` command strings.
//! `SystemdSupervisor` executes them through a `CommandRunner` and writes
//! unit files into the unit directory.

use std::path::PathBuf;

use super::{shell_escape, CommandRunner, Supervisor};

pub const DEFAULT_UNIT_DIR: &str = "/etc/systemd/system";

// ---------------------------------------------------------------------------
// Command builder
// ---------------------------------------------------------------------------

/// Builds systemctl CLI command strings without executing them.
pub struct SystemctlCommandBuilder;

impl SystemctlCommandBuilder {
    pub fn new() -> Self {
        SystemctlCommandBuilder
    }

    /// `systemctl <verb> <unit>` for the state-changing verbs.
    pub fn unit_verb(&self, verb: &str, unit: &str) -> String {
        format!("systemctl {} {}", verb, shell_escape(unit))
    }

    /// `systemctl is-enabled <unit>`
    pub fn is_enabled(&self, unit: &str) -> String {
        format!("systemctl is-enabled {}", shell_escape(unit))
    }

    /// `systemctl is-active <unit>`
    pub fn is_active(&self, unit: &str) -> String {
        format!("systemctl is-active {}", shell_escape(unit))
    }

    /// `systemctl daemon-reload`
    pub fn daemon_reload(&self) -> String {
        "systemctl daemon-reload".to_string()
    }
}

impl Default for SystemctlCommandBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A quoted `Environment=` value. Backslashes and quotes are escaped and `%`
/// is doubled so systemd does not read it as a specifier.
pub fn environment_assignment(name: &str, value: &str) -> String {
    let mut out = String::with_capacity(name.len() + value.len() + 3);
    out.push('"');
    out.push_str(name);
    out.push('=');
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '%' => out.push_str("%%"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

// ---------------------------------------------------------------------------
// Output parsers
// ---------------------------------------------------------------------------

/// `is-enabled` prints `enabled`, `enabled-runtime`, `static`, ... The unit
/// counts as enabled only for the first two.
pub fn parse_is_enabled(output: &str) -> bool {
    matches!(output.trim(), "enabled" | "enabled-runtime")
}

pub fn parse_is_active(output: &str) -> bool {
    output.trim() == "active"
}

// ---------------------------------------------------------------------------
// Supervisor
// ---------------------------------------------------------------------------

pub struct SystemdSupervisor {
    runner: Box<dyn CommandRunner>,
    unit_dir: PathBuf,
    cmd: SystemctlCommandBuilder,
}

impl SystemdSupervisor {
    pub fn new(runner: Box<dyn CommandRunner>, unit_dir: impl Into<PathBuf>) -> Self {
        SystemdSupervisor {
            runner,
            unit_dir: unit_dir.into(),
            cmd: SystemctlCommandBuilder::new(),
        }
    }

    fn verb(&self, verb: &str, unit: &str) -> Result<(), String> {
        self.runner.run(&self.cmd.unit_verb(verb, unit)).map(|_| ())
    }
}

impl Supervisor for SystemdSupervisor {
    fn unit_content(&self, unit: &str) -> Result<Option<String>, String> {
        let path = self.unit_dir.join(unit);
        match std::fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(format!("cannot read {}: {}", path.display(), e)),
        }
    }

    fn install_unit(&mut self, unit: &str, content: &str) -> Result<(), String> {
        let path = self.unit_dir.join(unit);
        std::fs::write(&path, content)
            .map_err(|e| format!("cannot write {}: {}", path.display(), e))?;
        self.runner.run(&self.cmd.daemon_reload()).map(|_| ())
    }

    // `is-enabled`/`is-active` exit non-zero for the negative answer, so an
    // error from the runner means "no".
    fn is_enabled(&self, unit: &str) -> Result<bool, String> {
        Ok(self
            .runner
            .run(&self.cmd.is_enabled(unit))
            .map(|out| parse_is_enabled(&out))
            .unwrap_or(false))
    }

    fn is_active(&self, unit: &str) -> Result<bool, String> {
        Ok(self
            .runner
            .run(&self.cmd.is_active(unit))
            .map(|out| parse_is_active(&out))
            .unwrap_or(false))
    }

    fn enable(&mut self, unit: &str) -> Result<(), String> {
        self.verb("enable", unit)
    }

    fn disable(&mut self, unit: &str) -> Result<(), String> {
        self.verb("disable", unit)
    }

    fn start(&mut self, unit: &str) -> Result<(), String> {
        self.verb("start", unit)
    }

    fn stop(&mut self, unit: &str) -> Result<(), String> {
        self.verb("stop", unit)
    }

    fn restart(&mut self, unit: &str) -> Result<(), String> {
        self.verb("restart", unit)
    }

    fn reload(&mut self, unit: &str) -> Result<(), String> {
        self.verb("reload", unit)
    }
}
