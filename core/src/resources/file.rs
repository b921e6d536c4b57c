//! Filesystem resources: `directory`, `file`, `template`, `remote_file`.
//!
//! The shared `converge_file` compares content by SHA-256 digest and
//! metadata field by field, so a metadata-only difference never rewrites the
//! file and the caller can tell content changes apart from the rest.

use std::path::{Path, PathBuf};

use serde_json::Value;

use super::{validate_absolute_path, validate_mode, ActionContext, Provider};
use crate::error::ConvergeError;
use crate::infrastructure::archive::sha256_hex;
use crate::infrastructure::{FileKind, FileStat};
use crate::types::resource::{Action, ResourceId};

const FS: &str = "filesystem";

// ---------------------------------------------------------------------------
// Shared convergence
// ---------------------------------------------------------------------------

/// Desired ownership and permissions. `None` fields are not managed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    pub owner: Option<String>,
    pub group: Option<String>,
    pub mode: Option<u32>,
}

impl Metadata {
    pub fn new(owner: &str, group: &str, mode: u32) -> Self {
        Metadata {
            owner: Some(owner.to_string()),
            group: Some(group.to_string()),
            mode: Some(mode),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileOutcome {
    pub content_changed: bool,
}

fn stat(ctx: &ActionContext<'_>, id: &ResourceId, path: &Path) -> Result<Option<FileStat>, ConvergeError> {
    ctx.host
        .fs
        .stat(path)
        .map_err(|e| ConvergeError::upstream(id, FS, e))
}

/// Bring owner, group and mode in line. `current` is `None` when the path
/// does not exist yet (why-run only), in which case every managed field is
/// reported as a change.
fn converge_metadata(
    ctx: &mut ActionContext<'_>,
    id: &ResourceId,
    path: &Path,
    current: Option<&FileStat>,
    meta: &Metadata,
) -> Result<(), ConvergeError> {
    let owner = meta
        .owner
        .as_deref()
        .filter(|o| current.map_or(true, |c| c.owner != *o));
    let group = meta
        .group
        .as_deref()
        .filter(|g| current.map_or(true, |c| c.group != *g));
    if owner.is_some() || group.is_some() {
        let desc = format!(
            "change owner of {} to {}:{}",
            path.display(),
            owner.unwrap_or("-"),
            group.unwrap_or("-")
        );
        if ctx.change(desc) {
            ctx.host
                .fs
                .set_owner(path, owner, group)
                .map_err(|e| ConvergeError::upstream(id, FS, e))?;
        }
    }
    if let Some(mode) = meta.mode {
        if current.map_or(true, |c| c.mode != mode) {
            if ctx.change(format!("change mode of {} to {:04o}", path.display(), mode)) {
                ctx.host
                    .fs
                    .set_mode(path, mode)
                    .map_err(|e| ConvergeError::upstream(id, FS, e))?;
            }
        }
    }
    Ok(())
}

/// Converge a regular file. `content: None` manages metadata only (and
/// creates an empty file when missing).
pub fn converge_file(
    ctx: &mut ActionContext<'_>,
    id: &ResourceId,
    path: &Path,
    content: Option<&[u8]>,
    meta: &Metadata,
) -> Result<FileOutcome, ConvergeError> {
    let before = stat(ctx, id, path)?;
    if let Some(existing) = &before {
        if existing.kind == FileKind::Directory {
            return Err(ConvergeError::upstream(
                id,
                FS,
                format!("{} is a directory", path.display()),
            ));
        }
    }

    let mut outcome = FileOutcome::default();
    let desired = match (content, &before) {
        (Some(bytes), Some(_)) => {
            let current = ctx
                .host
                .fs
                .read(path)
                .map_err(|e| ConvergeError::upstream(id, FS, e))?;
            let (from, to) = (sha256_hex(&current), sha256_hex(bytes));
            if from == to {
                None
            } else {
                Some((bytes, format!("update content of {} from {:.12} to {:.12}", path.display(), from, to)))
            }
        }
        (Some(bytes), None) => Some((bytes, format!("create {}", path.display()))),
        (None, None) => Some((&b""[..], format!("create {}", path.display()))),
        (None, Some(_)) => None,
    };

    if let Some((bytes, desc)) = desired {
        outcome.content_changed = true;
        if ctx.change(desc) {
            ctx.host
                .fs
                .write(path, bytes)
                .map_err(|e| ConvergeError::upstream(id, FS, e))?;
        }
    }

    let current = if before.is_none() && !ctx.dry_run {
        stat(ctx, id, path)?
    } else {
        before
    };
    converge_metadata(ctx, id, path, current.as_ref(), meta)?;
    Ok(outcome)
}

/// Converge a directory, creating missing ancestors when `recursive`.
/// Ownership and mode apply to the leaf only.
pub fn converge_directory(
    ctx: &mut ActionContext<'_>,
    id: &ResourceId,
    path: &Path,
    meta: &Metadata,
    recursive: bool,
) -> Result<(), ConvergeError> {
    let before = stat(ctx, id, path)?;
    match &before {
        Some(existing) if existing.kind != FileKind::Directory => {
            return Err(ConvergeError::upstream(
                id,
                FS,
                format!("{} exists and is not a directory", path.display()),
            ));
        }
        Some(_) => {}
        None => {
            let mut missing: Vec<PathBuf> = vec![path.to_path_buf()];
            let mut cursor = path.parent();
            while let Some(parent) = cursor {
                if parent == Path::new("/") || stat(ctx, id, parent)?.is_some() {
                    break;
                }
                missing.push(parent.to_path_buf());
                cursor = parent.parent();
            }
            if missing.len() > 1 && !recursive {
                return Err(ConvergeError::upstream(
                    id,
                    FS,
                    format!("parent of {} does not exist", path.display()),
                ));
            }
            if ctx.change(format!("create directory {}", path.display())) {
                for dir in missing.iter().rev() {
                    ctx.host
                        .fs
                        .create_dir(dir)
                        .map_err(|e| ConvergeError::upstream(id, FS, e))?;
                }
            }
        }
    }
    let current = if before.is_none() && !ctx.dry_run {
        stat(ctx, id, path)?
    } else {
        before
    };
    converge_metadata(ctx, id, path, current.as_ref(), meta)
}

fn remove_path(ctx: &mut ActionContext<'_>, id: &ResourceId, path: &Path) -> Result<(), ConvergeError> {
    if stat(ctx, id, path)?.is_some() && ctx.change(format!("remove {}", path.display())) {
        ctx.host
            .fs
            .remove(path)
            .map_err(|e| ConvergeError::upstream(id, FS, e))?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// directory
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DirectorySpec {
    pub meta: Metadata,
    pub recursive: bool,
}

impl Provider for DirectorySpec {
    fn validate(&self, id: &ResourceId) -> Result<(), ConvergeError> {
        validate_absolute_path(&id.name)?;
        validate_mode(id, self.meta.mode)
    }

    fn actions(&self) -> &'static [Action] {
        &[Action::Create, Action::Delete, Action::Nothing]
    }

    fn converge(&self, id: &ResourceId, action: Action, ctx: &mut ActionContext<'_>) -> Result<(), ConvergeError> {
        let path = Path::new(&id.name);
        match action {
            Action::Create => converge_directory(ctx, id, path, &self.meta, self.recursive),
            Action::Delete => remove_path(ctx, id, path),
            _ => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// file
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileSpec {
    pub meta: Metadata,
    /// Managed content; `None` leaves existing content alone.
    pub content: Option<String>,
}

impl Provider for FileSpec {
    fn validate(&self, id: &ResourceId) -> Result<(), ConvergeError> {
        validate_absolute_path(&id.name)?;
        validate_mode(id, self.meta.mode)
    }

    fn actions(&self) -> &'static [Action] {
        &[Action::Create, Action::Delete, Action::Nothing]
    }

    fn converge(&self, id: &ResourceId, action: Action, ctx: &mut ActionContext<'_>) -> Result<(), ConvergeError> {
        let path = Path::new(&id.name);
        match action {
            Action::Create => {
                converge_file(ctx, id, path, self.content.as_deref().map(str::as_bytes), &self.meta)?;
                Ok(())
            }
            Action::Delete => remove_path(ctx, id, path),
            _ => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// template
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct TemplateSpec {
    pub source: String,
    pub variables: Value,
    pub meta: Metadata,
}

impl TemplateSpec {
    pub fn new(source: &str, variables: Value) -> Self {
        TemplateSpec {
            source: source.to_string(),
            variables,
            meta: Metadata::default(),
        }
    }

    pub fn meta(mut self, meta: Metadata) -> Self {
        self.meta = meta;
        self
    }
}

impl Provider for TemplateSpec {
    fn validate(&self, id: &ResourceId) -> Result<(), ConvergeError> {
        validate_absolute_path(&id.name)?;
        validate_mode(id, self.meta.mode)?;
        if !self.variables.is_object() {
            return Err(ConvergeError::InvalidVariables {
                resource: id.to_string(),
                found: json_type(&self.variables).to_string(),
            });
        }
        Ok(())
    }

    fn actions(&self) -> &'static [Action] {
        &[Action::Create, Action::Delete, Action::Nothing]
    }

    fn converge(&self, id: &ResourceId, action: Action, ctx: &mut ActionContext<'_>) -> Result<(), ConvergeError> {
        let path = Path::new(&id.name);
        match action {
            Action::Create => {
                let rendered = ctx.host.templates.render(&self.source, &self.variables)?;
                converge_file(ctx, id, path, Some(&rendered), &self.meta)?;
                Ok(())
            }
            Action::Delete => remove_path(ctx, id, path),
            _ => Ok(()),
        }
    }
}

/// Name of a JSON value's type, for error messages.
pub fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "sequence",
        Value::Object(_) => "mapping",
    }
}

// ---------------------------------------------------------------------------
// remote_file
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoteFileSpec {
    pub url: String,
    /// Expected SHA-256. Without one an existing file is never re-fetched.
    pub checksum: Option<String>,
    pub meta: Metadata,
}

impl Provider for RemoteFileSpec {
    fn validate(&self, id: &ResourceId) -> Result<(), ConvergeError> {
        validate_absolute_path(&id.name)?;
        validate_mode(id, self.meta.mode)?;
        if self.url.trim().is_empty() {
            return Err(ConvergeError::InvalidProperty {
                resource: id.to_string(),
                property: "url".into(),
                reason: "must not be empty".into(),
            });
        }
        Ok(())
    }

    fn actions(&self) -> &'static [Action] {
        &[Action::Create, Action::Nothing]
    }

    fn converge(&self, id: &ResourceId, action: Action, ctx: &mut ActionContext<'_>) -> Result<(), ConvergeError> {
        if action != Action::Create {
            return Ok(());
        }
        let path = Path::new(&id.name);
        let fresh = match (stat(ctx, id, path)?, self.checksum.as_deref()) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(_), Some(expected)) => {
                let current = ctx
                    .host
                    .fs
                    .read(path)
                    .map_err(|e| ConvergeError::upstream(id, FS, e))?;
                sha256_hex(&current).eq_ignore_ascii_case(expected.trim())
            }
        };
        if !fresh {
            if ctx.change(format!("download {} to {}", self.url, path.display())) {
                ctx.host
                    .fetcher
                    .download(&self.url, path, self.checksum.as_deref())
                    .map_err(|e| ConvergeError::upstream(id, "archive fetcher", e))?;
            } else {
                // Nothing on disk to compare metadata against.
                return Ok(());
            }
        }
        let current = stat(ctx, id, path)?;
        converge_metadata(ctx, id, path, current.as_ref(), &self.meta)
    }
}
