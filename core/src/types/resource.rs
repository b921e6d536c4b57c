use std::fmt;

use serde::{Deserialize, Serialize};

/// The kind half of a resource identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Directory,
    File,
    Template,
    RemoteFile,
    Group,
    User,
    Package,
    Ark,
    Execute,
    Log,
    HbaseConfig,
    HbaseService,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Directory => "directory",
            ResourceKind::File => "file",
            ResourceKind::Template => "template",
            ResourceKind::RemoteFile => "remote_file",
            ResourceKind::Group => "group",
            ResourceKind::User => "user",
            ResourceKind::Package => "package",
            ResourceKind::Ark => "ark",
            ResourceKind::Execute => "execute",
            ResourceKind::Log => "log",
            ResourceKind::HbaseConfig => "hbase_config",
            ResourceKind::HbaseService => "hbase_service",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `(kind, name)`, unique within a run. Displays as `kind[name]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceId {
    pub kind: ResourceKind,
    pub name: String,
}

impl ResourceId {
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        ResourceId {
            kind,
            name: name.into(),
        }
    }

    /// Identity of the `hbase_service` resource for a role name.
    pub fn service(role: &str) -> Self {
        ResourceId::new(ResourceKind::HbaseService, role)
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.kind, self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Nothing,
    Create,
    Delete,
    Install,
    Remove,
    Run,
    Write,
    Enable,
    Disable,
    Start,
    Stop,
    Restart,
    Reload,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Nothing => "nothing",
            Action::Create => "create",
            Action::Delete => "delete",
            Action::Install => "install",
            Action::Remove => "remove",
            Action::Run => "run",
            Action::Write => "write",
            Action::Enable => "enable",
            Action::Disable => "disable",
            Action::Start => "start",
            Action::Stop => "stop",
            Action::Restart => "restart",
            Action::Reload => "reload",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// When a notification fires relative to its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Timing {
    /// Right after the source action reports `updated`, before the next
    /// declared resource.
    Immediate,
    /// Queued, deduplicated by `(target, action)`, run after the declaration
    /// pass.
    Delayed,
}

/// A directed edge from a source resource to an action on a target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Notification {
    pub target: ResourceId,
    pub action: Action,
    pub timing: Timing,
}

impl Notification {
    pub fn new(target: ResourceId, action: Action, timing: Timing) -> Self {
        Notification {
            target,
            action,
            timing,
        }
    }

    pub fn delayed_restart(role: &str) -> Self {
        Notification::new(ResourceId::service(role), Action::Restart, Timing::Delayed)
    }
}
