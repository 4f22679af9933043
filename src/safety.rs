use std::path::{Path, PathBuf};
use thiserror::Error;

/// Keeps configured file paths inside the project root.
#[derive(Debug, Clone)]
pub struct RootGuard {
    /// Canonical path to the project root
    root: PathBuf,
}

#[derive(Error, Debug)]
pub enum SafetyError {
    #[error("Path is outside project root: {path} (root: {root})")]
    OutsideRoot { path: PathBuf, root: PathBuf },

    #[error("Path has no file name: {0}")]
    NoFileName(PathBuf),

    #[error("Failed to canonicalize {path}: {source}")]
    Canonicalize {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl RootGuard {
    /// Create a guard for `root`, which must exist.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, SafetyError> {
        let root = root.as_ref();
        let root = root
            .canonicalize()
            .map_err(|source| SafetyError::Canonicalize {
                path: root.to_path_buf(),
                source,
            })?;
        Ok(Self { root })
    }

    /// Resolve a root-relative (or absolute) path and check it stays inside the root.
    ///
    /// The file itself does not have to exist, since a target may be created
    /// on first run, but its parent directory does.
    pub fn resolve(&self, path: impl AsRef<Path>) -> Result<PathBuf, SafetyError> {
        let path = path.as_ref();

        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };

        let canonical = if absolute.exists() {
            absolute
                .canonicalize()
                .map_err(|source| SafetyError::Canonicalize {
                    path: absolute.clone(),
                    source,
                })?
        } else {
            let name = absolute
                .file_name()
                .ok_or_else(|| SafetyError::NoFileName(absolute.clone()))?;
            let parent = absolute.parent().unwrap_or(Path::new("."));
            parent
                .canonicalize()
                .map_err(|source| SafetyError::Canonicalize {
                    path: parent.to_path_buf(),
                    source,
                })?
                .join(name)
        };

        if !canonical.starts_with(&self.root) {
            return Err(SafetyError::OutsideRoot {
                path: canonical,
                root: self.root.clone(),
            });
        }

        Ok(canonical)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}
