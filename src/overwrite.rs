//! Rollback-safe in-place file replacement.
//!
//! [`Overwrite::begin`] moves the target aside to `<target>.orig` and opens a
//! fresh file at the original path. The caller streams new content into it
//! (typically while reading the backup) and then calls [`Overwrite::commit`].
//! Every other exit path, including `?` returns and panics, restores the
//! backup through `Drop`, leaving the target byte-identical to its prior state.
//!
//! A crash between the rename and the commit leaves the `.orig` file behind;
//! [`restore_backup`] puts it back.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, error};

/// Suffix appended to the full file name for the backup copy.
pub const BACKUP_SUFFIX: &str = ".orig";

#[derive(Error, Debug)]
pub enum OverwriteError {
    #[error("backup {backup} already exists; an earlier run was interrupted (restore or remove it first)")]
    StaleBackup { backup: PathBuf },

    #[error("failed to move {target} aside to {backup}: {source}")]
    Backup {
        target: PathBuf,
        backup: PathBuf,
        source: io::Error,
    },

    #[error("failed to create {target}: {source}")]
    Create { target: PathBuf, source: io::Error },

    #[error("failed to finish writing {target}: {source}")]
    Commit { target: PathBuf, source: io::Error },

    #[error("failed to restore {target} from {backup}: {source}")]
    Restore {
        target: PathBuf,
        backup: PathBuf,
        source: io::Error,
    },

    #[error("no backup found for {target}")]
    NoBackup { target: PathBuf },
}

/// `<path>.orig`, keeping any existing extension (`version.h` -> `version.h.orig`).
pub fn backup_path(target: &Path) -> PathBuf {
    let mut name = OsString::from(target.as_os_str());
    name.push(BACKUP_SUFFIX);
    PathBuf::from(name)
}

/// An open overwrite transaction on a single file.
///
/// Dropping it without calling [`commit`](Self::commit) rolls back.
#[must_use = "dropping an Overwrite without commit() rolls the file back"]
#[derive(Debug)]
pub struct Overwrite {
    target: PathBuf,
    backup: Option<PathBuf>,
    out: Option<BufWriter<File>>,
}

impl Overwrite {
    /// Move `target` aside and open a new, empty file in its place.
    ///
    /// A missing target is not an error: the transaction simply has no
    /// backup and rollback removes the newly created file.
    pub fn begin(target: impl Into<PathBuf>) -> Result<Self, OverwriteError> {
        Self::begin_with(target, |p: &Path| File::create(p))
    }

    /// [`begin`](Self::begin) with a custom opener for the replacement file.
    ///
    /// If `open` fails after the original was moved aside, the original is
    /// moved back before the error is returned.
    pub fn begin_with<F>(target: impl Into<PathBuf>, open: F) -> Result<Self, OverwriteError>
    where
        F: FnOnce(&Path) -> io::Result<File>,
    {
        let target = target.into();
        let backup = backup_path(&target);

        if backup.exists() {
            return Err(OverwriteError::StaleBackup { backup });
        }

        let backup = match fs::rename(&target, &backup) {
            Ok(()) => {
                debug!(path = %target.display(), backup = %backup.display(), "moved original aside");
                Some(backup)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %target.display(), "no original file, creating from scratch");
                None
            }
            Err(source) => {
                return Err(OverwriteError::Backup {
                    target,
                    backup,
                    source,
                })
            }
        };

        match open(&target) {
            Ok(file) => Ok(Self {
                target,
                backup,
                out: Some(BufWriter::new(file)),
            }),
            Err(source) => {
                if let Some(backup) = &backup {
                    if let Err(e) = fs::rename(backup, &target) {
                        error!(
                            path = %target.display(),
                            backup = %backup.display(),
                            error = %e,
                            "could not put original back after failed create"
                        );
                    }
                }
                Err(OverwriteError::Create { target, source })
            }
        }
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// The moved-aside original, if the target existed.
    pub fn backup(&self) -> Option<&Path> {
        self.backup.as_deref()
    }

    /// Flush and sync the new content, then delete the backup.
    pub fn commit(mut self) -> Result<(), OverwriteError> {
        let Some(out) = self.out.take() else {
            return Ok(());
        };

        let finished = out
            .into_inner()
            .map_err(io::IntoInnerError::into_error)
            .and_then(|file| file.sync_all());

        if let Err(source) = finished {
            // `out` is gone; rollback only has to move files around.
            if let Err(e) = self.rollback() {
                error!(path = %self.target.display(), error = %e, "rollback after failed commit");
            }
            return Err(OverwriteError::Commit {
                target: self.target.clone(),
                source,
            });
        }

        if let Some(backup) = self.backup.take() {
            fs::remove_file(&backup).map_err(|source| OverwriteError::Commit {
                target: self.target.clone(),
                source,
            })?;
        }
        debug!(path = %self.target.display(), "committed");
        Ok(())
    }

    /// Discard the new content and put the original back.
    pub fn rollback(&mut self) -> Result<(), OverwriteError> {
        // Close the handle before touching the path.
        drop(self.out.take());

        match fs::remove_file(&self.target) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(OverwriteError::Restore {
                    target: self.target.clone(),
                    backup: backup_path(&self.target),
                    source,
                })
            }
        }

        if let Some(backup) = self.backup.take() {
            if let Err(source) = fs::rename(&backup, &self.target) {
                self.backup = Some(backup.clone());
                return Err(OverwriteError::Restore {
                    target: self.target.clone(),
                    backup,
                    source,
                });
            }
        }
        debug!(path = %self.target.display(), "rolled back");
        Ok(())
    }

    fn writer(&mut self) -> io::Result<&mut BufWriter<File>> {
        self.out
            .as_mut()
            .ok_or_else(|| io::Error::other("overwrite transaction already finished"))
    }
}

impl Write for Overwrite {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer()?.flush()
    }
}

impl Drop for Overwrite {
    fn drop(&mut self) {
        if self.out.is_none() && self.backup.is_none() {
            return;
        }
        if let Err(e) = self.rollback() {
            error!(path = %self.target.display(), error = %e, "rollback failed; original kept as .orig");
        }
    }
}

/// Run `f` inside an overwrite transaction on `target`.
///
/// Commits when `f` returns `Ok`; rolls back and propagates the error when it
/// returns `Err`.
pub fn overwrite<T, E, F>(target: impl Into<PathBuf>, f: F) -> Result<T, E>
where
    F: FnOnce(&mut Overwrite) -> Result<T, E>,
    E: From<OverwriteError>,
{
    let mut tx = Overwrite::begin(target)?;
    match f(&mut tx) {
        Ok(value) => {
            tx.commit()?;
            Ok(value)
        }
        Err(err) => {
            if let Err(e) = tx.rollback() {
                error!(path = %tx.target.display(), error = %e, "rollback failed; original kept as .orig");
            }
            Err(err)
        }
    }
}

/// Put a leftover `<target>.orig` back in place of `target`.
pub fn restore_backup(target: &Path) -> Result<PathBuf, OverwriteError> {
    let backup = backup_path(target);
    if !backup.exists() {
        return Err(OverwriteError::NoBackup {
            target: target.to_path_buf(),
        });
    }
    fs::rename(&backup, target).map_err(|source| OverwriteError::Restore {
        target: target.to_path_buf(),
        backup: backup.clone(),
        source,
    })?;
    Ok(backup)
}
