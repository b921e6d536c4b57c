//! Host collaborators.
//!
//! Each trait is the narrow interface the engine needs from one external
//! system: the filesystem, the package manager, the archive fetcher, the
//! service supervisor, the account database, the template renderer and the
//! node inventory. Production implementations shell out through a
//! `CommandRunner` or call the OS directly; `mock` provides in-memory doubles
//! for tests.
//!
//! Collaborator methods report failures as plain strings; resources wrap
//! them into `ConvergeError::UpstreamCollaborator` with their own identity.

pub mod accounts;
pub mod archive;
pub mod inventory;
pub mod local;
pub mod mock;
pub mod packages;
pub mod runner;
pub mod systemd;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::templates::TemplateRenderer;

pub use runner::{shell_escape, CommandRunner, MockRunner, ShellRunner};

// ---------------------------------------------------------------------------
// Filesystem
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    File,
    Directory,
    Symlink,
}

/// What the engine compares against: type, ownership and permission bits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStat {
    pub kind: FileKind,
    pub owner: String,
    pub group: String,
    pub mode: u32,
}

pub trait Filesystem {
    /// `Ok(None)` when nothing exists at the path.
    fn stat(&self, path: &Path) -> Result<Option<FileStat>, String>;

    fn read(&self, path: &Path) -> Result<Vec<u8>, String>;

    /// Replace the file's content. Implementations write atomically so a
    /// failed write leaves the previous content in place.
    fn write(&mut self, path: &Path, content: &[u8]) -> Result<(), String>;

    fn create_dir(&mut self, path: &Path) -> Result<(), String>;

    fn set_owner(&mut self, path: &Path, owner: Option<&str>, group: Option<&str>)
        -> Result<(), String>;

    fn set_mode(&mut self, path: &Path, mode: u32) -> Result<(), String>;

    fn remove(&mut self, path: &Path) -> Result<(), String>;
}

// ---------------------------------------------------------------------------
// Packages, archives
// ---------------------------------------------------------------------------

pub trait PackageManager {
    fn is_installed(&self, name: &str) -> Result<bool, String>;
    fn install(&mut self, name: &str) -> Result<(), String>;
    fn remove(&mut self, name: &str) -> Result<(), String>;
}

/// One versioned archive unpacked under `prefix` and linked from `home_dir`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveRequest {
    pub name: String,
    pub url: String,
    pub version: String,
    pub checksum: Option<String>,
    pub prefix: PathBuf,
    pub home_dir: PathBuf,
    pub owner: String,
    pub group: String,
}

impl ArchiveRequest {
    /// `<prefix>/<name>-<version>`, where the archive is unpacked.
    pub fn release_dir(&self) -> PathBuf {
        self.prefix.join(format!("{}-{}", self.name, self.version))
    }
}

pub trait ArchiveFetcher {
    /// The version currently linked from `request.home_dir`, if any.
    fn installed_version(&self, request: &ArchiveRequest) -> Result<Option<String>, String>;

    /// Download, verify, unpack and point `home_dir` at the release.
    /// Returns the release directory.
    fn fetch_and_unpack(&mut self, request: &ArchiveRequest) -> Result<PathBuf, String>;

    /// Download a single file to `dest`, verifying the SHA-256 checksum
    /// when one is given.
    fn download(&mut self, url: &str, dest: &Path, checksum: Option<&str>) -> Result<(), String>;
}

// ---------------------------------------------------------------------------
// Supervisor
// ---------------------------------------------------------------------------

/// Process supervisor (systemd). Unit content is opaque text here; the
/// `hbase_service` resource builds it from a `UnitDescriptor`.
pub trait Supervisor {
    fn unit_content(&self, unit: &str) -> Result<Option<String>, String>;
    fn install_unit(&mut self, unit: &str, content: &str) -> Result<(), String>;
    fn is_enabled(&self, unit: &str) -> Result<bool, String>;
    fn is_active(&self, unit: &str) -> Result<bool, String>;
    fn enable(&mut self, unit: &str) -> Result<(), String>;
    fn disable(&mut self, unit: &str) -> Result<(), String>;
    fn start(&mut self, unit: &str) -> Result<(), String>;
    fn stop(&mut self, unit: &str) -> Result<(), String>;
    fn restart(&mut self, unit: &str) -> Result<(), String>;
    fn reload(&mut self, unit: &str) -> Result<(), String>;
}

// ---------------------------------------------------------------------------
// Accounts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupInfo {
    pub name: String,
    pub gid: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserInfo {
    pub name: String,
    pub uid: u32,
    pub gid: u32,
    pub home: String,
    pub shell: String,
    pub comment: String,
}

/// Desired account settings. `None` fields are left as the system chooses.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UserRequest {
    pub name: String,
    pub uid: Option<u32>,
    pub group: Option<String>,
    pub home: Option<String>,
    pub shell: Option<String>,
    pub comment: Option<String>,
    pub system: bool,
}

pub trait Accounts {
    fn group(&self, name: &str) -> Result<Option<GroupInfo>, String>;
    fn user(&self, name: &str) -> Result<Option<UserInfo>, String>;
    fn create_group(&mut self, name: &str, gid: Option<u32>, system: bool) -> Result<(), String>;
    fn modify_group(&mut self, name: &str, gid: u32) -> Result<(), String>;
    fn create_user(&mut self, request: &UserRequest) -> Result<(), String>;
    fn modify_user(&mut self, request: &UserRequest) -> Result<(), String>;
    fn remove_user(&mut self, name: &str) -> Result<(), String>;
    fn remove_group(&mut self, name: &str) -> Result<(), String>;
}

// ---------------------------------------------------------------------------
// Node discovery
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDescriptor {
    pub name: String,
    #[serde(default)]
    pub fqdn: Option<String>,
    #[serde(default)]
    pub environment: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

impl NodeDescriptor {
    /// The address written into host lists: fqdn when known, else the name.
    pub fn address(&self) -> &str {
        self.fqdn.as_deref().unwrap_or(&self.name)
    }
}

pub trait NodeSearch {
    fn search(&self, role: &str, environment: &str) -> Result<Vec<NodeDescriptor>, String>;
}

/// Search backend for runs without an inventory: always empty.
pub struct NoSearch;

impl NodeSearch for NoSearch {
    fn search(&self, _role: &str, _environment: &str) -> Result<Vec<NodeDescriptor>, String> {
        Ok(Vec::new())
    }
}

// ---------------------------------------------------------------------------
// Host
// ---------------------------------------------------------------------------

/// Every collaborator a resource may touch during convergence.
pub struct Host {
    pub fs: Box<dyn Filesystem>,
    pub packages: Box<dyn PackageManager>,
    pub fetcher: Box<dyn ArchiveFetcher>,
    pub supervisor: Box<dyn Supervisor>,
    pub accounts: Box<dyn Accounts>,
    pub runner: Box<dyn CommandRunner>,
    pub templates: Box<dyn TemplateRenderer>,
}

impl Host {
    /// Guard helper: treats stat errors as "does not exist".
    pub fn path_exists(&self, path: &Path) -> bool {
        matches!(self.fs.stat(path), Ok(Some(_)))
    }

    pub fn is_directory(&self, path: &Path) -> bool {
        matches!(
            self.fs.stat(path),
            Ok(Some(FileStat {
                kind: FileKind::Directory,
                ..
            }))
        )
    }
}
