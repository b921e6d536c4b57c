//! In-memory collaborators for testing.
//!
//! Every double is a cheap handle around shared state: `MockHost::host()`
//! boxes clones into a `Host` for the engine while the test keeps its own
//! handles to seed state, inject failures and inspect the outcome.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use super::{
    Accounts, ArchiveFetcher, ArchiveRequest, FileKind, FileStat, Filesystem, GroupInfo, Host,
    MockRunner, NodeDescriptor, NodeSearch, PackageManager, Supervisor, UserInfo, UserRequest,
};
use crate::templates::HandlebarsRenderer;

// ---------------------------------------------------------------------------
// MemoryFilesystem
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct MemEntry {
    pub kind: FileKind,
    pub content: Vec<u8>,
    pub owner: String,
    pub group: String,
    pub mode: u32,
}

#[derive(Default)]
struct FsState {
    entries: BTreeMap<PathBuf, MemEntry>,
    fail_writes: HashSet<PathBuf>,
    writes: Vec<PathBuf>,
}

#[derive(Clone, Default)]
pub struct MemoryFilesystem {
    state: Rc<RefCell<FsState>>,
}

impl MemoryFilesystem {
    pub fn new() -> Self {
        MemoryFilesystem::default()
    }

    /// Seed a directory and all of its ancestors.
    pub fn add_dir(&self, path: impl AsRef<Path>) {
        let mut state = self.state.borrow_mut();
        for ancestor in path.as_ref().ancestors() {
            if ancestor == Path::new("/") || ancestor.as_os_str().is_empty() {
                continue;
            }
            state
                .entries
                .entry(ancestor.to_path_buf())
                .or_insert_with(|| MemEntry {
                    kind: FileKind::Directory,
                    content: Vec::new(),
                    owner: "root".into(),
                    group: "root".into(),
                    mode: 0o755,
                });
        }
    }

    /// Seed a file (and its parent directories) owned by root, mode 0644.
    pub fn add_file(&self, path: impl AsRef<Path>, content: &[u8]) {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            self.add_dir(parent);
        }
        self.state.borrow_mut().entries.insert(
            path.to_path_buf(),
            MemEntry {
                kind: FileKind::File,
                content: content.to_vec(),
                owner: "root".into(),
                group: "root".into(),
                mode: 0o644,
            },
        );
    }

    /// Make every write to `path` fail.
    pub fn fail_writes_to(&self, path: impl AsRef<Path>) {
        self.state
            .borrow_mut()
            .fail_writes
            .insert(path.as_ref().to_path_buf());
    }

    pub fn entry(&self, path: impl AsRef<Path>) -> Option<MemEntry> {
        self.state.borrow().entries.get(path.as_ref()).cloned()
    }

    pub fn contents(&self, path: impl AsRef<Path>) -> Option<String> {
        self.entry(path)
            .map(|e| String::from_utf8_lossy(&e.content).to_string())
    }

    /// Number of successful content writes to `path`.
    pub fn write_count(&self, path: impl AsRef<Path>) -> usize {
        let path = path.as_ref();
        self.state
            .borrow()
            .writes
            .iter()
            .filter(|p| p.as_path() == path)
            .count()
    }

    fn parent_exists(state: &FsState, path: &Path) -> bool {
        match path.parent() {
            None => true,
            Some(p) if p == Path::new("/") => true,
            Some(p) => matches!(
                state.entries.get(p),
                Some(MemEntry {
                    kind: FileKind::Directory,
                    ..
                })
            ),
        }
    }
}

impl Filesystem for MemoryFilesystem {
    fn stat(&self, path: &Path) -> Result<Option<FileStat>, String> {
        Ok(self.state.borrow().entries.get(path).map(|e| FileStat {
            kind: e.kind,
            owner: e.owner.clone(),
            group: e.group.clone(),
            mode: e.mode,
        }))
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>, String> {
        self.state
            .borrow()
            .entries
            .get(path)
            .map(|e| e.content.clone())
            .ok_or_else(|| format!("{}: No such file or directory", path.display()))
    }

    fn write(&mut self, path: &Path, content: &[u8]) -> Result<(), String> {
        let mut state = self.state.borrow_mut();
        if state.fail_writes.contains(path) {
            return Err(format!("{}: Read-only file system", path.display()));
        }
        if !Self::parent_exists(&state, path) {
            return Err(format!("{}: No such file or directory", path.display()));
        }
        let entry = state
            .entries
            .entry(path.to_path_buf())
            .or_insert_with(|| MemEntry {
                kind: FileKind::File,
                content: Vec::new(),
                owner: "root".into(),
                group: "root".into(),
                mode: 0o644,
            });
        if entry.kind == FileKind::Directory {
            return Err(format!("{}: Is a directory", path.display()));
        }
        entry.content = content.to_vec();
        state.writes.push(path.to_path_buf());
        Ok(())
    }

    fn create_dir(&mut self, path: &Path) -> Result<(), String> {
        let mut state = self.state.borrow_mut();
        if !Self::parent_exists(&state, path) {
            return Err(format!("{}: No such file or directory", path.display()));
        }
        if state.entries.contains_key(path) {
            return Err(format!("{}: File exists", path.display()));
        }
        state.entries.insert(
            path.to_path_buf(),
            MemEntry {
                kind: FileKind::Directory,
                content: Vec::new(),
                owner: "root".into(),
                group: "root".into(),
                mode: 0o755,
            },
        );
        Ok(())
    }

    fn set_owner(
        &mut self,
        path: &Path,
        owner: Option<&str>,
        group: Option<&str>,
    ) -> Result<(), String> {
        let mut state = self.state.borrow_mut();
        let entry = state
            .entries
            .get_mut(path)
            .ok_or_else(|| format!("{}: No such file or directory", path.display()))?;
        if let Some(owner) = owner {
            entry.owner = owner.to_string();
        }
        if let Some(group) = group {
            entry.group = group.to_string();
        }
        Ok(())
    }

    fn set_mode(&mut self, path: &Path, mode: u32) -> Result<(), String> {
        let mut state = self.state.borrow_mut();
        let entry = state
            .entries
            .get_mut(path)
            .ok_or_else(|| format!("{}: No such file or directory", path.display()))?;
        entry.mode = mode;
        Ok(())
    }

    fn remove(&mut self, path: &Path) -> Result<(), String> {
        let mut state = self.state.borrow_mut();
        state
            .entries
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| format!("{}: No such file or directory", path.display()))
    }
}

// ---------------------------------------------------------------------------
// MockPackages
// ---------------------------------------------------------------------------

#[derive(Default)]
struct PackageState {
    installed: BTreeSet<String>,
    broken: HashSet<String>,
    installs: Vec<String>,
}

#[derive(Clone, Default)]
pub struct MockPackages {
    state: Rc<RefCell<PackageState>>,
}

impl MockPackages {
    pub fn mark_installed(&self, name: &str) {
        self.state.borrow_mut().installed.insert(name.to_string());
    }

    /// Installs of `name` fail until cleared.
    pub fn break_package(&self, name: &str) {
        self.state.borrow_mut().broken.insert(name.to_string());
    }

    pub fn fix_package(&self, name: &str) {
        self.state.borrow_mut().broken.remove(name);
    }

    pub fn is_installed(&self, name: &str) -> bool {
        self.state.borrow().installed.contains(name)
    }

    pub fn install_attempts(&self) -> Vec<String> {
        self.state.borrow().installs.clone()
    }
}

impl PackageManager for MockPackages {
    fn is_installed(&self, name: &str) -> Result<bool, String> {
        Ok(self.state.borrow().installed.contains(name))
    }

    fn install(&mut self, name: &str) -> Result<(), String> {
        let mut state = self.state.borrow_mut();
        state.installs.push(name.to_string());
        if state.broken.contains(name) {
            return Err(format!("E: Unable to locate package {}", name));
        }
        state.installed.insert(name.to_string());
        Ok(())
    }

    fn remove(&mut self, name: &str) -> Result<(), String> {
        self.state.borrow_mut().installed.remove(name);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MockFetcher
// ---------------------------------------------------------------------------

#[derive(Default)]
struct FetchState {
    linked: BTreeMap<PathBuf, String>,
    fetched: Vec<String>,
    downloads: Vec<String>,
    unreachable: bool,
}

/// Records fetches and materialises results in the shared memory filesystem.
#[derive(Clone)]
pub struct MockFetcher {
    state: Rc<RefCell<FetchState>>,
    fs: MemoryFilesystem,
}

impl MockFetcher {
    pub fn new(fs: MemoryFilesystem) -> Self {
        MockFetcher {
            state: Rc::new(RefCell::new(FetchState::default())),
            fs,
        }
    }

    pub fn set_installed(&self, home_dir: impl AsRef<Path>, version: &str) {
        self.state
            .borrow_mut()
            .linked
            .insert(home_dir.as_ref().to_path_buf(), version.to_string());
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.borrow_mut().unreachable = unreachable;
    }

    pub fn fetched_urls(&self) -> Vec<String> {
        self.state.borrow().fetched.clone()
    }

    pub fn downloaded_urls(&self) -> Vec<String> {
        self.state.borrow().downloads.clone()
    }
}

impl ArchiveFetcher for MockFetcher {
    fn installed_version(&self, request: &ArchiveRequest) -> Result<Option<String>, String> {
        Ok(self.state.borrow().linked.get(&request.home_dir).cloned())
    }

    fn fetch_and_unpack(&mut self, request: &ArchiveRequest) -> Result<PathBuf, String> {
        let mut state = self.state.borrow_mut();
        if state.unreachable {
            return Err(format!("could not resolve host for {}", request.url));
        }
        state.fetched.push(request.url.clone());
        state
            .linked
            .insert(request.home_dir.clone(), request.version.clone());
        let release = request.release_dir();
        self.fs.add_dir(&release);
        Ok(release)
    }

    fn download(&mut self, url: &str, dest: &Path, _checksum: Option<&str>) -> Result<(), String> {
        let mut state = self.state.borrow_mut();
        if state.unreachable {
            return Err(format!("could not resolve host for {}", url));
        }
        state.downloads.push(url.to_string());
        self.fs.add_file(dest, url.as_bytes());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MockSupervisor
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MockUnit {
    pub content: Option<String>,
    pub enabled: bool,
    pub active: bool,
}

#[derive(Default)]
struct SupervisorState {
    units: BTreeMap<String, MockUnit>,
    calls: Vec<String>,
    failing: HashSet<String>,
}

#[derive(Clone, Default)]
pub struct MockSupervisor {
    state: Rc<RefCell<SupervisorState>>,
}

impl MockSupervisor {
    pub fn unit(&self, name: &str) -> Option<MockUnit> {
        self.state.borrow().units.get(name).cloned()
    }

    pub fn set_unit(&self, name: &str, unit: MockUnit) {
        self.state.borrow_mut().units.insert(name.to_string(), unit);
    }

    /// Make `op` (e.g. "start") fail for `unit`.
    pub fn fail_on(&self, op: &str, unit: &str) {
        self.state
            .borrow_mut()
            .failing
            .insert(format!("{} {}", op, unit));
    }

    /// Every state-changing call, as `"<op> <unit>"`.
    pub fn calls(&self) -> Vec<String> {
        self.state.borrow().calls.clone()
    }

    pub fn count_calls(&self, call: &str) -> usize {
        self.state.borrow().calls.iter().filter(|c| *c == call).count()
    }

    fn mutate(&self, op: &str, unit: &str, f: impl FnOnce(&mut MockUnit)) -> Result<(), String> {
        let mut state = self.state.borrow_mut();
        let call = format!("{} {}", op, unit);
        if state.failing.contains(&call) {
            return Err(format!("Job for {} failed", unit));
        }
        state.calls.push(call);
        let entry = state
            .units
            .get_mut(unit)
            .ok_or_else(|| format!("Unit {} not found.", unit))?;
        f(entry);
        Ok(())
    }
}

impl Supervisor for MockSupervisor {
    fn unit_content(&self, unit: &str) -> Result<Option<String>, String> {
        Ok(self
            .state
            .borrow()
            .units
            .get(unit)
            .and_then(|u| u.content.clone()))
    }

    fn install_unit(&mut self, unit: &str, content: &str) -> Result<(), String> {
        let mut state = self.state.borrow_mut();
        let call = format!("install {}", unit);
        if state.failing.contains(&call) {
            return Err(format!("Failed to install {}", unit));
        }
        state.calls.push(call);
        state.units.entry(unit.to_string()).or_default().content = Some(content.to_string());
        Ok(())
    }

    fn is_enabled(&self, unit: &str) -> Result<bool, String> {
        Ok(self.state.borrow().units.get(unit).map_or(false, |u| u.enabled))
    }

    fn is_active(&self, unit: &str) -> Result<bool, String> {
        Ok(self.state.borrow().units.get(unit).map_or(false, |u| u.active))
    }

    fn enable(&mut self, unit: &str) -> Result<(), String> {
        self.mutate("enable", unit, |u| u.enabled = true)
    }

    fn disable(&mut self, unit: &str) -> Result<(), String> {
        self.mutate("disable", unit, |u| u.enabled = false)
    }

    fn start(&mut self, unit: &str) -> Result<(), String> {
        self.mutate("start", unit, |u| u.active = true)
    }

    fn stop(&mut self, unit: &str) -> Result<(), String> {
        self.mutate("stop", unit, |u| u.active = false)
    }

    fn restart(&mut self, unit: &str) -> Result<(), String> {
        self.mutate("restart", unit, |u| u.active = true)
    }

    fn reload(&mut self, unit: &str) -> Result<(), String> {
        self.mutate("reload", unit, |_| {})
    }
}

// ---------------------------------------------------------------------------
// MockAccounts
// ---------------------------------------------------------------------------

#[derive(Default)]
struct AccountState {
    groups: BTreeMap<String, GroupInfo>,
    users: BTreeMap<String, UserInfo>,
    next_id: u32,
}

#[derive(Clone, Default)]
pub struct MockAccounts {
    state: Rc<RefCell<AccountState>>,
}

impl MockAccounts {
    pub fn add_group(&self, name: &str, gid: u32) {
        self.state.borrow_mut().groups.insert(
            name.to_string(),
            GroupInfo {
                name: name.to_string(),
                gid,
            },
        );
    }

    pub fn add_user(&self, user: UserInfo) {
        self.state.borrow_mut().users.insert(user.name.clone(), user);
    }

    pub fn user_info(&self, name: &str) -> Option<UserInfo> {
        self.state.borrow().users.get(name).cloned()
    }

    pub fn group_info(&self, name: &str) -> Option<GroupInfo> {
        self.state.borrow().groups.get(name).cloned()
    }

    fn allocate(state: &mut AccountState) -> u32 {
        state.next_id += 1;
        900 + state.next_id
    }
}

impl Accounts for MockAccounts {
    fn group(&self, name: &str) -> Result<Option<GroupInfo>, String> {
        Ok(self.state.borrow().groups.get(name).cloned())
    }

    fn user(&self, name: &str) -> Result<Option<UserInfo>, String> {
        Ok(self.state.borrow().users.get(name).cloned())
    }

    fn create_group(&mut self, name: &str, gid: Option<u32>, _system: bool) -> Result<(), String> {
        let mut state = self.state.borrow_mut();
        let gid = match gid {
            Some(gid) => gid,
            None => Self::allocate(&mut state),
        };
        state.groups.insert(
            name.to_string(),
            GroupInfo {
                name: name.to_string(),
                gid,
            },
        );
        Ok(())
    }

    fn modify_group(&mut self, name: &str, gid: u32) -> Result<(), String> {
        let mut state = self.state.borrow_mut();
        let group = state
            .groups
            .get_mut(name)
            .ok_or_else(|| format!("group '{}' does not exist", name))?;
        group.gid = gid;
        Ok(())
    }

    fn create_user(&mut self, request: &UserRequest) -> Result<(), String> {
        let mut state = self.state.borrow_mut();
        let gid = match &request.group {
            Some(group) => state
                .groups
                .get(group)
                .map(|g| g.gid)
                .ok_or_else(|| format!("group '{}' does not exist", group))?,
            None => Self::allocate(&mut state),
        };
        let uid = match request.uid {
            Some(uid) => uid,
            None => Self::allocate(&mut state),
        };
        state.users.insert(
            request.name.clone(),
            UserInfo {
                name: request.name.clone(),
                uid,
                gid,
                home: request.home.clone().unwrap_or_default(),
                shell: request.shell.clone().unwrap_or_else(|| "/bin/sh".into()),
                comment: request.comment.clone().unwrap_or_default(),
            },
        );
        Ok(())
    }

    fn modify_user(&mut self, request: &UserRequest) -> Result<(), String> {
        let mut state = self.state.borrow_mut();
        let gid = match &request.group {
            Some(group) => Some(
                state
                    .groups
                    .get(group)
                    .map(|g| g.gid)
                    .ok_or_else(|| format!("group '{}' does not exist", group))?,
            ),
            None => None,
        };
        let user = state
            .users
            .get_mut(&request.name)
            .ok_or_else(|| format!("user '{}' does not exist", request.name))?;
        if let Some(uid) = request.uid {
            user.uid = uid;
        }
        if let Some(gid) = gid {
            user.gid = gid;
        }
        if let Some(home) = &request.home {
            user.home = home.clone();
        }
        if let Some(shell) = &request.shell {
            user.shell = shell.clone();
        }
        if let Some(comment) = &request.comment {
            user.comment = comment.clone();
        }
        Ok(())
    }

    fn remove_user(&mut self, name: &str) -> Result<(), String> {
        self.state.borrow_mut().users.remove(name);
        Ok(())
    }

    fn remove_group(&mut self, name: &str) -> Result<(), String> {
        self.state.borrow_mut().groups.remove(name);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MockSearch
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct MockSearch {
    pub nodes: Vec<NodeDescriptor>,
    pub unavailable: bool,
}

impl MockSearch {
    pub fn with_nodes(nodes: Vec<NodeDescriptor>) -> Self {
        MockSearch {
            nodes,
            unavailable: false,
        }
    }

    pub fn unavailable() -> Self {
        MockSearch {
            nodes: Vec::new(),
            unavailable: true,
        }
    }
}

impl NodeSearch for MockSearch {
    fn search(&self, role: &str, environment: &str) -> Result<Vec<NodeDescriptor>, String> {
        if self.unavailable {
            return Err("search backend unavailable".into());
        }
        Ok(self
            .nodes
            .iter()
            .filter(|n| n.role.as_deref() == Some(role))
            .filter(|n| n.environment.as_deref().map_or(true, |e| e == environment))
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// MockHost
// ---------------------------------------------------------------------------

/// Handles to every in-memory collaborator.
#[derive(Clone)]
pub struct MockHost {
    pub fs: MemoryFilesystem,
    pub packages: MockPackages,
    pub fetcher: MockFetcher,
    pub supervisor: MockSupervisor,
    pub accounts: MockAccounts,
    pub runner: MockRunner,
}

impl MockHost {
    pub fn new() -> Self {
        let fs = MemoryFilesystem::new();
        MockHost {
            fetcher: MockFetcher::new(fs.clone()),
            fs,
            packages: MockPackages::default(),
            supervisor: MockSupervisor::default(),
            accounts: MockAccounts::default(),
            runner: MockRunner::new(),
        }
    }

    /// A `Host` backed by these handles and the built-in templates.
    pub fn host(&self) -> Host {
        Host {
            fs: Box::new(self.fs.clone()),
            packages: Box::new(self.packages.clone()),
            fetcher: Box::new(self.fetcher.clone()),
            supervisor: Box::new(self.supervisor.clone()),
            accounts: Box::new(self.accounts.clone()),
            runner: Box::new(self.runner.clone()),
            templates: Box::new(HandlebarsRenderer::builtin()),
        }
    }
}

impl Default for MockHost {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_fs_requires_parent_directory() {
        let mut fs = MemoryFilesystem::new();
        assert!(fs.write(Path::new("/etc/hbase/conf/x"), b"x").is_err());
        fs.add_dir("/etc/hbase/conf");
        fs.write(Path::new("/etc/hbase/conf/x"), b"x").unwrap();
        assert_eq!(fs.contents("/etc/hbase/conf/x").as_deref(), Some("x"));
        assert_eq!(fs.write_count("/etc/hbase/conf/x"), 1);
    }

    #[test]
    fn memory_fs_injected_write_failure() {
        let mut fs = MemoryFilesystem::new();
        fs.add_dir("/etc");
        fs.fail_writes_to("/etc/regionservers");
        let err = fs.write(Path::new("/etc/regionservers"), b"rs1").unwrap_err();
        assert!(err.contains("Read-only"));
        assert!(fs.entry("/etc/regionservers").is_none());
    }

    #[test]
    fn memory_fs_create_dir_single_level() {
        let mut fs = MemoryFilesystem::new();
        assert!(fs.create_dir(Path::new("/a/b")).is_err());
        fs.create_dir(Path::new("/a")).unwrap();
        fs.create_dir(Path::new("/a/b")).unwrap();
        assert_eq!(fs.entry("/a/b").unwrap().kind, FileKind::Directory);
    }

    #[test]
    fn supervisor_tracks_state_and_failures() {
        let mut sup = MockSupervisor::default();
        sup.install_unit("hbase-master.service", "[Unit]").unwrap();
        sup.enable("hbase-master.service").unwrap();
        sup.fail_on("start", "hbase-master.service");
        assert!(sup.start("hbase-master.service").is_err());
        assert!(sup.is_enabled("hbase-master.service").unwrap());
        assert!(!sup.is_active("hbase-master.service").unwrap());
        assert_eq!(
            sup.calls(),
            vec!["install hbase-master.service", "enable hbase-master.service"]
        );
    }

    #[test]
    fn supervisor_unknown_unit_is_error() {
        let mut sup = MockSupervisor::default();
        assert!(sup.start("hbase-rest.service").is_err());
    }

    #[test]
    fn accounts_resolve_primary_group() {
        let mut accounts = MockAccounts::default();
        accounts.create_group("hbase", Some(2313), true).unwrap();
        accounts
            .create_user(&UserRequest {
                name: "hbase".into(),
                uid: Some(2313),
                group: Some("hbase".into()),
                ..UserRequest::default()
            })
            .unwrap();
        assert_eq!(accounts.user_info("hbase").unwrap().gid, 2313);
    }

    #[test]
    fn search_filters_by_role_and_environment() {
        let search = MockSearch::with_nodes(vec![
            NodeDescriptor {
                name: "rs2".into(),
                fqdn: None,
                environment: Some("prod".into()),
                role: Some("regionserver".into()),
            },
            NodeDescriptor {
                name: "m1".into(),
                fqdn: None,
                environment: Some("prod".into()),
                role: Some("master".into()),
            },
        ]);
        let found = search.search("regionserver", "prod").unwrap();
        assert_eq!(found.len(), 1);
        assert!(search.search("regionserver", "dev").unwrap().is_empty());
        assert!(MockSearch::unavailable().search("master", "prod").is_err());
    }
}
