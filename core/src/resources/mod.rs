//! Resources, the atomic units of convergence.
//!
//! A `Resource` pairs an identity `(kind, name)` with a kind-specific
//! `ResourceSpec`, the actions requested on it, guards and notifications.
//! Each spec type implements `Provider`: static validation at declaration,
//! the supported action list, and the idempotent per-action convergence.
//!
//! Providers never touch the host directly on a change. They describe the
//! change through `ActionContext::change`, which returns `false` in why-run
//! mode, and only then call the collaborator.

pub mod config;
pub mod file;
pub mod service;
pub mod system;

use std::fmt;
use std::path::{Component, Path};

use crate::error::ConvergeError;
use crate::infrastructure::Host;
use crate::types::resource::{Action, Notification, ResourceId, ResourceKind, Timing};

pub use config::{ConfigKind, ConfigResource};
pub use file::{DirectorySpec, FileSpec, RemoteFileSpec, TemplateSpec};
pub use service::{ServiceResource, UnitDescriptor};
pub use system::{ArkSpec, ExecuteSpec, GroupSpec, LogLevel, LogSpec, PackageSpec, UserSpec};

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

pub trait Provider {
    /// Declaration-time checks. Errors here abort the run.
    fn validate(&self, id: &ResourceId) -> Result<(), ConvergeError>;

    /// Actions this kind understands, `Nothing` included.
    fn actions(&self) -> &'static [Action];

    /// Bring the host to the desired state for `action`. Reports what it
    /// changes through `ctx`; an empty change list means "unchanged".
    fn converge(
        &self,
        id: &ResourceId,
        action: Action,
        ctx: &mut ActionContext<'_>,
    ) -> Result<(), ConvergeError>;

    /// Notifications the provider may queue on its own at apply time. The
    /// engine validates their targets along with the declared ones.
    fn implicit_notifications(&self, _id: &ResourceId) -> Vec<Notification> {
        Vec::new()
    }
}

/// Tagged variant over every resource kind.
pub enum ResourceSpec {
    Directory(DirectorySpec),
    File(FileSpec),
    Template(TemplateSpec),
    RemoteFile(RemoteFileSpec),
    Group(GroupSpec),
    User(UserSpec),
    Package(PackageSpec),
    Ark(ArkSpec),
    Execute(ExecuteSpec),
    Log(LogSpec),
    HbaseConfig(ConfigResource),
    HbaseService(ServiceResource),
}

impl ResourceSpec {
    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceSpec::Directory(_) => ResourceKind::Directory,
            ResourceSpec::File(_) => ResourceKind::File,
            ResourceSpec::Template(_) => ResourceKind::Template,
            ResourceSpec::RemoteFile(_) => ResourceKind::RemoteFile,
            ResourceSpec::Group(_) => ResourceKind::Group,
            ResourceSpec::User(_) => ResourceKind::User,
            ResourceSpec::Package(_) => ResourceKind::Package,
            ResourceSpec::Ark(_) => ResourceKind::Ark,
            ResourceSpec::Execute(_) => ResourceKind::Execute,
            ResourceSpec::Log(_) => ResourceKind::Log,
            ResourceSpec::HbaseConfig(_) => ResourceKind::HbaseConfig,
            ResourceSpec::HbaseService(_) => ResourceKind::HbaseService,
        }
    }

    pub fn provider(&self) -> &dyn Provider {
        match self {
            ResourceSpec::Directory(s) => s,
            ResourceSpec::File(s) => s,
            ResourceSpec::Template(s) => s,
            ResourceSpec::RemoteFile(s) => s,
            ResourceSpec::Group(s) => s,
            ResourceSpec::User(s) => s,
            ResourceSpec::Package(s) => s,
            ResourceSpec::Ark(s) => s,
            ResourceSpec::Execute(s) => s,
            ResourceSpec::Log(s) => s,
            ResourceSpec::HbaseConfig(s) => s,
            ResourceSpec::HbaseService(s) => s,
        }
    }

    /// The action used when a declaration names none.
    pub fn default_action(&self) -> Action {
        match self {
            ResourceSpec::Package(_) | ResourceSpec::Ark(_) => Action::Install,
            ResourceSpec::Execute(_) => Action::Run,
            ResourceSpec::Log(_) => Action::Write,
            _ => Action::Create,
        }
    }
}

macro_rules! spec_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(impl From<$ty> for ResourceSpec {
            fn from(spec: $ty) -> Self {
                ResourceSpec::$variant(spec)
            }
        })*
    };
}

spec_from! {
    DirectorySpec => Directory,
    FileSpec => File,
    TemplateSpec => Template,
    RemoteFileSpec => RemoteFile,
    GroupSpec => Group,
    UserSpec => User,
    PackageSpec => Package,
    ArkSpec => Ark,
    ExecuteSpec => Execute,
    LogSpec => Log,
    ConfigResource => HbaseConfig,
    ServiceResource => HbaseService,
}

// ---------------------------------------------------------------------------
// Resource
// ---------------------------------------------------------------------------

pub enum Guard {
    OnlyIf(Box<dyn Fn(&Host) -> bool>),
    NotIf(Box<dyn Fn(&Host) -> bool>),
}

impl Guard {
    pub fn allows(&self, host: &Host) -> bool {
        match self {
            Guard::OnlyIf(f) => f(host),
            Guard::NotIf(f) => !f(host),
        }
    }
}

pub struct Resource {
    pub name: String,
    pub spec: ResourceSpec,
    pub actions: Vec<Action>,
    pub guards: Vec<Guard>,
    pub notifications: Vec<Notification>,
    /// A failure of a critical resource aborts the rest of the run.
    pub critical: bool,
    /// Overrides the run-wide retry budget.
    pub retries: Option<u32>,
}

impl Resource {
    pub fn new(name: impl Into<String>, spec: impl Into<ResourceSpec>) -> Self {
        let spec = spec.into();
        Resource {
            name: name.into(),
            actions: vec![spec.default_action()],
            spec,
            guards: Vec::new(),
            notifications: Vec::new(),
            critical: false,
            retries: None,
        }
    }

    pub fn id(&self) -> ResourceId {
        ResourceId::new(self.spec.kind(), self.name.clone())
    }

    pub fn action(mut self, action: Action) -> Self {
        self.actions = vec![action];
        self
    }

    pub fn actions(mut self, actions: &[Action]) -> Self {
        self.actions = actions.to_vec();
        self
    }

    pub fn only_if(mut self, f: impl Fn(&Host) -> bool + 'static) -> Self {
        self.guards.push(Guard::OnlyIf(Box::new(f)));
        self
    }

    pub fn not_if(mut self, f: impl Fn(&Host) -> bool + 'static) -> Self {
        self.guards.push(Guard::NotIf(Box::new(f)));
        self
    }

    pub fn notifies(mut self, action: Action, target: ResourceId, timing: Timing) -> Self {
        self.notifications.push(Notification::new(target, action, timing));
        self
    }

    pub fn critical(mut self, critical: bool) -> Self {
        self.critical = critical;
        self
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }

    /// Every guard must allow the action.
    pub fn guards_allow(&self, host: &Host) -> bool {
        self.guards.iter().all(|g| g.allows(host))
    }

    pub fn supports(&self, action: Action) -> bool {
        self.spec.provider().actions().contains(&action)
    }

    /// Spec validation plus the requested actions.
    pub fn validate(&self) -> Result<(), ConvergeError> {
        let id = self.id();
        if self.name.trim().is_empty() {
            return Err(ConvergeError::InvalidProperty {
                resource: id.to_string(),
                property: "name".into(),
                reason: "must not be empty".into(),
            });
        }
        self.spec.provider().validate(&id)?;
        for action in &self.actions {
            if !self.supports(*action) {
                return Err(ConvergeError::InvalidAction {
                    resource: id,
                    action: *action,
                });
            }
        }
        for n in &self.notifications {
            if n.target == id && n.timing == Timing::Immediate {
                return Err(ConvergeError::InvalidProperty {
                    resource: id.to_string(),
                    property: "notifies".into(),
                    reason: "a resource cannot notify itself immediately".into(),
                });
            }
        }
        Ok(())
    }

    /// Declared notifications followed by the provider's implicit ones.
    pub fn all_notifications(&self) -> Vec<Notification> {
        let mut all = self.notifications.clone();
        all.extend(self.spec.provider().implicit_notifications(&self.id()));
        all
    }
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("id", &self.id())
            .field("actions", &self.actions)
            .field("guards", &self.guards.len())
            .field("notifications", &self.notifications)
            .field("critical", &self.critical)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// ActionContext
// ---------------------------------------------------------------------------

/// Per-action scratch space handed to a provider.
pub struct ActionContext<'a> {
    pub host: &'a mut Host,
    pub dry_run: bool,
    pub changes: Vec<String>,
    pub warnings: Vec<String>,
    /// Notifications the provider queued itself (content-change restarts).
    pub queued: Vec<Notification>,
}

impl<'a> ActionContext<'a> {
    pub fn new(host: &'a mut Host, dry_run: bool) -> Self {
        ActionContext {
            host,
            dry_run,
            changes: Vec::new(),
            warnings: Vec::new(),
            queued: Vec::new(),
        }
    }

    /// Record a change. Returns whether the provider should apply it.
    pub fn change(&mut self, description: impl Into<String>) -> bool {
        self.changes.push(description.into());
        !self.dry_run
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("{}", message);
        self.warnings.push(message);
    }

    pub fn queue(&mut self, notification: Notification) {
        self.queued.push(notification);
    }

    pub fn updated(&self) -> bool {
        !self.changes.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Validation helpers
// ---------------------------------------------------------------------------

/// Absolute, non-empty, no `..` segments.
pub fn validate_absolute_path(path: &str) -> Result<(), ConvergeError> {
    let invalid = |reason: &str| ConvergeError::InvalidPath {
        path: path.to_string(),
        reason: reason.to_string(),
    };
    if path.trim().is_empty() {
        return Err(invalid("must not be empty"));
    }
    let p = Path::new(path);
    if !p.is_absolute() {
        return Err(invalid("must be absolute"));
    }
    if p.components().any(|c| c == Component::ParentDir) {
        return Err(invalid("must not contain '..'"));
    }
    Ok(())
}

/// File modes are permission bits only.
pub(crate) fn validate_mode(id: &ResourceId, mode: Option<u32>) -> Result<(), ConvergeError> {
    match mode {
        Some(m) if m > 0o7777 => Err(ConvergeError::InvalidProperty {
            resource: id.to_string(),
            property: "mode".into(),
            reason: format!("{:o} is not a permission mode", m),
        }),
        _ => Ok(()),
    }
}
