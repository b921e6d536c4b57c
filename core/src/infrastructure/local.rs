//! The real filesystem, plus platform fact detection.

use std::ffi::{CStr, CString};
use std::io::Write;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::Path;

use super::{FileKind, FileStat, Filesystem};

pub struct LocalFilesystem;

impl Filesystem for LocalFilesystem {
    fn stat(&self, path: &Path) -> Result<Option<FileStat>, String> {
        let meta = match std::fs::symlink_metadata(path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(format!("cannot stat {}: {}", path.display(), e)),
        };
        let file_type = meta.file_type();
        let kind = if file_type.is_symlink() {
            FileKind::Symlink
        } else if file_type.is_dir() {
            FileKind::Directory
        } else {
            FileKind::File
        };
        Ok(Some(FileStat {
            kind,
            owner: user_name(meta.uid()).unwrap_or_else(|| meta.uid().to_string()),
            group: group_name(meta.gid()).unwrap_or_else(|| meta.gid().to_string()),
            mode: meta.mode() & 0o7777,
        }))
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>, String> {
        std::fs::read(path).map_err(|e| format!("cannot read {}: {}", path.display(), e))
    }

    fn write(&mut self, path: &Path, content: &[u8]) -> Result<(), String> {
        let file_name = path
            .file_name()
            .ok_or_else(|| format!("{} has no file name", path.display()))?;
        let mut tmp_name = std::ffi::OsString::from(".");
        tmp_name.push(file_name);
        tmp_name.push(".hbase-converge.tmp");
        let tmp = path.with_file_name(tmp_name);

        let result = (|| -> std::io::Result<()> {
            let mut file = std::fs::File::create(&tmp)?;
            file.write_all(content)?;
            file.sync_all()?;
            if let Ok(meta) = std::fs::metadata(path) {
                std::fs::set_permissions(&tmp, meta.permissions())?;
            }
            std::fs::rename(&tmp, path)
        })();
        if let Err(e) = result {
            let _ = std::fs::remove_file(&tmp);
            return Err(format!("cannot write {}: {}", path.display(), e));
        }
        Ok(())
    }

    fn create_dir(&mut self, path: &Path) -> Result<(), String> {
        std::fs::create_dir(path)
            .map_err(|e| format!("cannot create directory {}: {}", path.display(), e))
    }

    fn set_owner(
        &mut self,
        path: &Path,
        owner: Option<&str>,
        group: Option<&str>,
    ) -> Result<(), String> {
        let uid = owner
            .map(|name| user_id(name).ok_or_else(|| format!("unknown user '{}'", name)))
            .transpose()?;
        let gid = group
            .map(|name| group_id(name).ok_or_else(|| format!("unknown group '{}'", name)))
            .transpose()?;
        std::os::unix::fs::lchown(path, uid, gid)
            .map_err(|e| format!("cannot chown {}: {}", path.display(), e))
    }

    fn set_mode(&mut self, path: &Path, mode: u32) -> Result<(), String> {
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
            .map_err(|e| format!("cannot chmod {}: {}", path.display(), e))
    }

    fn remove(&mut self, path: &Path) -> Result<(), String> {
        let meta = std::fs::symlink_metadata(path)
            .map_err(|e| format!("cannot stat {}: {}", path.display(), e))?;
        let result = if meta.is_dir() {
            std::fs::remove_dir_all(path)
        } else {
            std::fs::remove_file(path)
        };
        result.map_err(|e| format!("cannot remove {}: {}", path.display(), e))
    }
}

fn user_name(uid: u32) -> Option<String> {
    // SAFETY: getpwuid returns a pointer into static storage or null; the
    // name is copied out before any other passwd call.
    unsafe {
        let pw = libc::getpwuid(uid);
        if pw.is_null() {
            return None;
        }
        Some(CStr::from_ptr((*pw).pw_name).to_string_lossy().into_owned())
    }
}

fn group_name(gid: u32) -> Option<String> {
    // SAFETY: as for getpwuid.
    unsafe {
        let gr = libc::getgrgid(gid);
        if gr.is_null() {
            return None;
        }
        Some(CStr::from_ptr((*gr).gr_name).to_string_lossy().into_owned())
    }
}

fn user_id(name: &str) -> Option<u32> {
    if let Ok(uid) = name.parse() {
        return Some(uid);
    }
    let c_name = CString::new(name).ok()?;
    // SAFETY: c_name outlives the call; the result is read immediately.
    unsafe {
        let pw = libc::getpwnam(c_name.as_ptr());
        if pw.is_null() {
            None
        } else {
            Some((*pw).pw_uid)
        }
    }
}

fn group_id(name: &str) -> Option<u32> {
    if let Ok(gid) = name.parse() {
        return Some(gid);
    }
    let c_name = CString::new(name).ok()?;
    // SAFETY: as for getpwnam.
    unsafe {
        let gr = libc::getgrnam(c_name.as_ptr());
        if gr.is_null() {
            None
        } else {
            Some((*gr).gr_gid)
        }
    }
}

// ---------------------------------------------------------------------------
// Platform facts
// ---------------------------------------------------------------------------

/// Facts the recipes branch on. Stored under `platform` in the attribute tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformFacts {
    pub family: String,
    pub fqdn: String,
}

pub fn detect_platform() -> PlatformFacts {
    let family = std::fs::read_to_string("/etc/os-release")
        .map(|content| platform_family(&content))
        .unwrap_or_else(|_| "debian".to_string());
    PlatformFacts {
        family,
        fqdn: hostname().unwrap_or_else(|| "localhost".to_string()),
    }
}

/// Map `/etc/os-release` to `debian` or `rhel`.
pub fn platform_family(os_release: &str) -> String {
    let mut ids = Vec::new();
    for line in os_release.lines() {
        if let Some((key, value)) = line.split_once('=') {
            if key == "ID" || key == "ID_LIKE" {
                let value = value.trim_matches('"');
                ids.extend(value.split_whitespace().map(str::to_string));
            }
        }
    }
    let rhel_like = ["rhel", "centos", "fedora", "rocky", "almalinux", "amzn"];
    if ids.iter().any(|id| rhel_like.contains(&id.as_str())) {
        "rhel".to_string()
    } else {
        "debian".to_string()
    }
}

fn hostname() -> Option<String> {
    let mut buf = [0u8; 256];
    // SAFETY: buf is valid for its full length and gethostname NUL-terminates
    // on success when the name fits.
    let ret = unsafe { libc::gethostname(buf.as_mut_ptr() as *mut libc::c_char, buf.len()) };
    if ret != 0 {
        return None;
    }
    let end = buf.iter().position(|b| *b == 0).unwrap_or(buf.len());
    let name = String::from_utf8_lossy(&buf[..end]).trim().to_string();
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}
