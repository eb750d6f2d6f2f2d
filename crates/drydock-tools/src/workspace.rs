//! Workspace path guard
//!
//! Every file tool resolves its paths through a [`WorkspaceGuard`] so the
//! model can only touch the project being deployed. Relative paths resolve
//! against the workspace root; absolute paths are allowed only when they
//! already sit inside it. Symlinks are resolved before the containment
//! check so a link pointing outside the root cannot be used as an escape.

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Confines file operations to a single project directory
#[derive(Debug, Clone)]
pub struct WorkspaceGuard {
    root: PathBuf,
}

impl WorkspaceGuard {
    /// Create a guard rooted at `root`. The directory must exist.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().canonicalize().map_err(|e| {
            Error::InvalidInput(format!(
                "workspace root '{}' is not accessible: {e}",
                root.as_ref().display()
            ))
        })?;
        if !root.is_dir() {
            return Err(Error::InvalidInput(format!(
                "workspace root '{}' is not a directory",
                root.display()
            )));
        }
        Ok(Self { root })
    }

    /// The canonical workspace root
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a tool-supplied path to a canonical path inside the root.
    ///
    /// Works for paths that do not exist yet (file writes) by
    /// canonicalizing the nearest existing ancestor and re-appending the
    /// remainder.
    pub fn resolve(&self, path: &str) -> Result<PathBuf> {
        if path.trim().is_empty() {
            return Err(Error::InvalidInput("path must not be empty".to_string()));
        }

        let joined = {
            let p = Path::new(path);
            if p.is_absolute() {
                p.to_path_buf()
            } else {
                self.root.join(p)
            }
        };

        let canonical = canonicalize_lenient(&joined)?;
        if canonical.starts_with(&self.root) {
            Ok(canonical)
        } else {
            warn!(path = %path, root = %self.root.display(), "path escapes workspace");
            Err(Error::PermissionDenied(format!(
                "path '{path}' is outside the project workspace"
            )))
        }
    }

    /// Resolve a path and require that it exists
    pub fn resolve_existing(&self, path: &str) -> Result<PathBuf> {
        let resolved = self.resolve(path)?;
        if resolved.exists() {
            Ok(resolved)
        } else {
            Err(Error::NotFound(format!("file not found: {path}")))
        }
    }
}

/// Canonicalize a path that may not exist: resolve the deepest existing
/// ancestor, then append the non-existing remainder with `..`/`.` rejected.
fn canonicalize_lenient(path: &Path) -> Result<PathBuf> {
    if path.exists() {
        return path.canonicalize().map_err(Error::Io);
    }

    // Relative segments in a non-existing path cannot be resolved by the
    // filesystem and would bypass the containment check.
    for segment in path.components() {
        if matches!(
            segment,
            std::path::Component::ParentDir | std::path::Component::CurDir
        ) {
            return Err(Error::PermissionDenied(
                "relative path segments (. or ..) are not allowed".to_string(),
            ));
        }
    }

    let mut existing = path.to_path_buf();
    let mut remainder = Vec::new();
    while !existing.exists() {
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                remainder.push(name.to_os_string());
                existing = parent.to_path_buf();
            }
            _ => {
                return Err(Error::InvalidInput(format!(
                    "cannot resolve path '{}'",
                    path.display()
                )))
            }
        }
    }

    let mut resolved = existing.canonicalize().map_err(Error::Io)?;
    for segment in remainder.into_iter().rev() {
        resolved.push(segment);
    }
    Ok(resolved)
}
