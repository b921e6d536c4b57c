//! Tarball download, verification and unpacking.
//!
//! Downloads go through `curl`, unpacking through `tar`; the SHA-256 check
//! runs in-process so a corrupt archive never reaches `tar`.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use super::{shell_escape, ArchiveFetcher, ArchiveRequest, CommandRunner};

pub const DEFAULT_CACHE_DIR: &str = "/var/cache/hbase-converge";

/// Lowercase hex SHA-256 of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    let mut out = String::with_capacity(64);
    for byte in digest.iter() {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}

/// Compare a file's digest against an expected checksum (case-insensitive).
pub fn verify_checksum(path: &Path, expected: &str) -> Result<(), String> {
    let data =
        std::fs::read(path).map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
    let actual = sha256_hex(&data);
    if actual.eq_ignore_ascii_case(expected.trim()) {
        Ok(())
    } else {
        Err(format!(
            "checksum mismatch for {}: expected {}, got {}",
            path.display(),
            expected.trim(),
            actual
        ))
    }
}

pub struct TarballFetcher {
    runner: Box<dyn CommandRunner>,
    cache_dir: PathBuf,
}

impl TarballFetcher {
    pub fn new(runner: Box<dyn CommandRunner>, cache_dir: impl Into<PathBuf>) -> Self {
        TarballFetcher {
            runner,
            cache_dir: cache_dir.into(),
        }
    }

    fn curl(&self, url: &str, dest: &Path) -> Result<(), String> {
        self.runner
            .run(&format!(
                "curl -fsSL --retry 3 -o {} {}",
                shell_escape(&dest.to_string_lossy()),
                shell_escape(url)
            ))
            .map(|_| ())
    }
}

/// The version encoded in a `<prefix>/<name>-<version>` link target.
pub fn version_from_release_dir(name: &str, target: &Path) -> Option<String> {
    let file_name = target.file_name()?.to_str()?;
    file_name
        .strip_prefix(name)
        .and_then(|rest| rest.strip_prefix('-'))
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl ArchiveFetcher for TarballFetcher {
    fn installed_version(&self, request: &ArchiveRequest) -> Result<Option<String>, String> {
        let target = match std::fs::read_link(&request.home_dir) {
            Ok(target) => target,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            // Not a symlink: something else owns the home dir.
            Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => return Ok(None),
            Err(e) => return Err(format!("cannot read {}: {}", request.home_dir.display(), e)),
        };
        if !request.prefix.join(&target).exists() {
            return Ok(None);
        }
        Ok(version_from_release_dir(&request.name, &target))
    }

    fn fetch_and_unpack(&mut self, request: &ArchiveRequest) -> Result<PathBuf, String> {
        std::fs::create_dir_all(&self.cache_dir)
            .map_err(|e| format!("cannot create {}: {}", self.cache_dir.display(), e))?;
        let tarball = self
            .cache_dir
            .join(format!("{}-{}.tar.gz", request.name, request.version));
        self.curl(&request.url, &tarball)?;
        if let Some(checksum) = request.checksum.as_deref() {
            verify_checksum(&tarball, checksum)?;
        }

        let release = request.release_dir();
        let release_str = release.to_string_lossy();
        let owner = format!("{}:{}", request.owner, request.group);
        let steps = [
            format!("mkdir -p {}", shell_escape(&release_str)),
            format!(
                "tar -xzf {} -C {} --strip-components=1",
                shell_escape(&tarball.to_string_lossy()),
                shell_escape(&release_str)
            ),
            format!("chown -R {} {}", shell_escape(&owner), shell_escape(&release_str)),
            format!(
                "ln -sfn {} {}",
                shell_escape(&release_str),
                shell_escape(&request.home_dir.to_string_lossy())
            ),
        ];
        for step in &steps {
            self.runner.run(step)?;
        }
        tracing::debug!(release = %release.display(), "archive unpacked");
        Ok(release)
    }

    fn download(&mut self, url: &str, dest: &Path, checksum: Option<&str>) -> Result<(), String> {
        self.curl(url, dest)?;
        if let Some(checksum) = checksum {
            if let Err(e) = verify_checksum(dest, checksum) {
                let _ = std::fs::remove_file(dest);
                return Err(e);
            }
        }
        Ok(())
    }
}
