//! Account, package, archive, command and log resources.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::{validate_absolute_path, ActionContext, Provider};
use crate::error::ConvergeError;
use crate::infrastructure::{ArchiveRequest, UserRequest};
use crate::types::resource::{Action, ResourceId};

// ---------------------------------------------------------------------------
// group
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupSpec {
    pub gid: Option<u32>,
    pub system: bool,
}

impl Provider for GroupSpec {
    fn validate(&self, _id: &ResourceId) -> Result<(), ConvergeError> {
        Ok(())
    }

    fn actions(&self) -> &'static [Action] {
        &[Action::Create, Action::Remove, Action::Nothing]
    }

    fn converge(&self, id: &ResourceId, action: Action, ctx: &mut ActionContext<'_>) -> Result<(), ConvergeError> {
        let current = ctx
            .host
            .accounts
            .group(&id.name)
            .map_err(|e| ConvergeError::upstream(id, "accounts", e))?;
        match (action, current) {
            (Action::Create, None) => {
                if ctx.change(format!("create group {}", id.name)) {
                    ctx.host
                        .accounts
                        .create_group(&id.name, self.gid, self.system)
                        .map_err(|e| ConvergeError::upstream(id, "accounts", e))?;
                }
            }
            (Action::Create, Some(existing)) => {
                if let Some(gid) = self.gid.filter(|g| *g != existing.gid) {
                    if ctx.change(format!("change gid of {} from {} to {}", id.name, existing.gid, gid)) {
                        ctx.host
                            .accounts
                            .modify_group(&id.name, gid)
                            .map_err(|e| ConvergeError::upstream(id, "accounts", e))?;
                    }
                }
            }
            (Action::Remove, Some(_)) => {
                if ctx.change(format!("remove group {}", id.name)) {
                    ctx.host
                        .accounts
                        .remove_group(&id.name)
                        .map_err(|e| ConvergeError::upstream(id, "accounts", e))?;
                }
            }
            _ => {}
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// user
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserSpec {
    pub uid: Option<u32>,
    /// Primary group by name.
    pub group: Option<String>,
    pub home: Option<String>,
    pub shell: Option<String>,
    pub comment: Option<String>,
    pub system: bool,
}

impl UserSpec {
    fn request(&self, name: &str) -> UserRequest {
        UserRequest {
            name: name.to_string(),
            uid: self.uid,
            group: self.group.clone(),
            home: self.home.clone(),
            shell: self.shell.clone(),
            comment: self.comment.clone(),
            system: self.system,
        }
    }
}

impl Provider for UserSpec {
    fn validate(&self, _id: &ResourceId) -> Result<(), ConvergeError> {
        if let Some(home) = &self.home {
            validate_absolute_path(home)?;
        }
        Ok(())
    }

    fn actions(&self) -> &'static [Action] {
        &[Action::Create, Action::Remove, Action::Nothing]
    }

    fn converge(&self, id: &ResourceId, action: Action, ctx: &mut ActionContext<'_>) -> Result<(), ConvergeError> {
        let upstream = |e: String| ConvergeError::upstream(id, "accounts", e);
        let current = ctx.host.accounts.user(&id.name).map_err(upstream)?;
        match (action, current) {
            (Action::Create, None) => {
                if ctx.change(format!("create user {}", id.name)) {
                    ctx.host
                        .accounts
                        .create_user(&self.request(&id.name))
                        .map_err(upstream)?;
                }
            }
            (Action::Create, Some(existing)) => {
                let gid = match &self.group {
                    Some(group) => ctx
                        .host
                        .accounts
                        .group(group)
                        .map_err(upstream)?
                        .map(|g| g.gid),
                    None => None,
                };
                let mut diff = UserRequest {
                    name: id.name.clone(),
                    ..UserRequest::default()
                };
                let mut fields = Vec::new();
                if let Some(uid) = self.uid.filter(|u| *u != existing.uid) {
                    diff.uid = Some(uid);
                    fields.push("uid");
                }
                if gid.map_or(self.group.is_some(), |g| g != existing.gid) {
                    diff.group = self.group.clone();
                    fields.push("group");
                }
                if let Some(home) = self.home.as_ref().filter(|h| **h != existing.home) {
                    diff.home = Some(home.clone());
                    fields.push("home");
                }
                if let Some(shell) = self.shell.as_ref().filter(|s| **s != existing.shell) {
                    diff.shell = Some(shell.clone());
                    fields.push("shell");
                }
                if let Some(comment) = self.comment.as_ref().filter(|c| **c != existing.comment) {
                    diff.comment = Some(comment.clone());
                    fields.push("comment");
                }
                if !fields.is_empty()
                    && ctx.change(format!("modify user {} ({})", id.name, fields.join(", ")))
                {
                    ctx.host.accounts.modify_user(&diff).map_err(upstream)?;
                }
            }
            (Action::Remove, Some(_)) => {
                if ctx.change(format!("remove user {}", id.name)) {
                    ctx.host.accounts.remove_user(&id.name).map_err(upstream)?;
                }
            }
            _ => {}
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// package
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PackageSpec;

impl Provider for PackageSpec {
    fn validate(&self, _id: &ResourceId) -> Result<(), ConvergeError> {
        Ok(())
    }

    fn actions(&self) -> &'static [Action] {
        &[Action::Install, Action::Remove, Action::Nothing]
    }

    fn converge(&self, id: &ResourceId, action: Action, ctx: &mut ActionContext<'_>) -> Result<(), ConvergeError> {
        let upstream = |e: String| ConvergeError::upstream(id, "package manager", e);
        let installed = ctx.host.packages.is_installed(&id.name).map_err(upstream)?;
        match action {
            Action::Install if !installed => {
                if ctx.change(format!("install package {}", id.name)) {
                    ctx.host.packages.install(&id.name).map_err(upstream)?;
                }
            }
            Action::Remove if installed => {
                if ctx.change(format!("remove package {}", id.name)) {
                    ctx.host.packages.remove(&id.name).map_err(upstream)?;
                }
            }
            _ => {}
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ark
// ---------------------------------------------------------------------------

/// A versioned tarball unpacked under `prefix` and linked from `home_dir`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArkSpec {
    pub url: String,
    pub version: String,
    pub checksum: Option<String>,
    pub prefix: PathBuf,
    pub home_dir: PathBuf,
    pub owner: String,
    pub group: String,
}

impl ArkSpec {
    fn request(&self, name: &str) -> ArchiveRequest {
        ArchiveRequest {
            name: name.to_string(),
            url: self.url.clone(),
            version: self.version.clone(),
            checksum: self.checksum.clone(),
            prefix: self.prefix.clone(),
            home_dir: self.home_dir.clone(),
            owner: self.owner.clone(),
            group: self.group.clone(),
        }
    }
}

impl Provider for ArkSpec {
    fn validate(&self, id: &ResourceId) -> Result<(), ConvergeError> {
        validate_absolute_path(&self.prefix.to_string_lossy())?;
        validate_absolute_path(&self.home_dir.to_string_lossy())?;
        for (property, value) in [("url", &self.url), ("version", &self.version)] {
            if value.trim().is_empty() {
                return Err(ConvergeError::InvalidProperty {
                    resource: id.to_string(),
                    property: property.into(),
                    reason: "must not be empty".into(),
                });
            }
        }
        Ok(())
    }

    fn actions(&self) -> &'static [Action] {
        &[Action::Install, Action::Nothing]
    }

    fn converge(&self, id: &ResourceId, action: Action, ctx: &mut ActionContext<'_>) -> Result<(), ConvergeError> {
        if action != Action::Install {
            return Ok(());
        }
        let upstream = |e: String| ConvergeError::upstream(id, "archive fetcher", e);
        let request = self.request(&id.name);
        let installed = ctx.host.fetcher.installed_version(&request).map_err(upstream)?;
        if installed.as_deref() == Some(self.version.as_str()) {
            return Ok(());
        }
        let desc = match installed {
            Some(old) => format!(
                "upgrade {} from {} to {} at {}",
                id.name,
                old,
                self.version,
                request.release_dir().display()
            ),
            None => format!(
                "install {} {} at {}",
                id.name,
                self.version,
                request.release_dir().display()
            ),
        };
        if ctx.change(desc) {
            ctx.host.fetcher.fetch_and_unpack(&request).map_err(upstream)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// execute
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct ExecuteSpec {
    pub command: String,
    /// Skip the command when this path exists.
    pub creates: Option<PathBuf>,
    /// A check command runs on every converge but never reports a change.
    pub check: bool,
}

impl ExecuteSpec {
    pub fn new(command: &str) -> Self {
        ExecuteSpec {
            command: command.to_string(),
            creates: None,
            check: false,
        }
    }

    pub fn check(command: &str) -> Self {
        ExecuteSpec {
            check: true,
            ..ExecuteSpec::new(command)
        }
    }
}

impl Provider for ExecuteSpec {
    fn validate(&self, id: &ResourceId) -> Result<(), ConvergeError> {
        if self.command.trim().is_empty() {
            return Err(ConvergeError::InvalidProperty {
                resource: id.to_string(),
                property: "command".into(),
                reason: "must not be empty".into(),
            });
        }
        if let Some(creates) = &self.creates {
            validate_absolute_path(&creates.to_string_lossy())?;
        }
        Ok(())
    }

    fn actions(&self) -> &'static [Action] {
        &[Action::Run, Action::Nothing]
    }

    fn converge(&self, id: &ResourceId, action: Action, ctx: &mut ActionContext<'_>) -> Result<(), ConvergeError> {
        if action != Action::Run {
            return Ok(());
        }
        if let Some(creates) = &self.creates {
            if ctx.host.path_exists(creates) {
                return Ok(());
            }
        }
        let upstream = |e: String| ConvergeError::upstream(id, "command runner", e);
        if self.check {
            if ctx.dry_run {
                return Ok(());
            }
            let out = ctx.host.runner.run(&self.command).map_err(upstream)?;
            tracing::debug!(resource = %id, output = %out.trim(), "check passed");
            return Ok(());
        }
        if ctx.change(format!("run `{}`", self.command)) {
            ctx.host.runner.run(&self.command).map_err(upstream)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// log
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

/// Writes a message to the run log. Never changes the host.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogSpec {
    /// Defaults to the resource name.
    pub message: Option<String>,
    pub level: LogLevel,
}

impl Provider for LogSpec {
    fn validate(&self, _id: &ResourceId) -> Result<(), ConvergeError> {
        Ok(())
    }

    fn actions(&self) -> &'static [Action] {
        &[Action::Write, Action::Nothing]
    }

    fn converge(&self, id: &ResourceId, action: Action, ctx: &mut ActionContext<'_>) -> Result<(), ConvergeError> {
        if action != Action::Write {
            return Ok(());
        }
        let message = self.message.as_deref().unwrap_or(&id.name);
        match self.level {
            LogLevel::Debug => tracing::debug!("{}", message),
            LogLevel::Info => tracing::info!("{}", message),
            LogLevel::Warn => ctx.warn(message.to_string()),
            LogLevel::Error => tracing::error!("{}", message),
        }
        Ok(())
    }
}
