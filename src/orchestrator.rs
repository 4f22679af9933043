//! Sequences one version propagation run.
//!
//! `ResolvingVersion -> ConfirmingBuild -> Patching(1..N) -> Done`, with a
//! fatal edge out of `ResolvingVersion` when the authoritative file has no
//! usable declaration. Files are patched strictly in configuration order and
//! each one is its own [`Overwrite`](crate::overwrite::Overwrite) transaction;
//! there is no cross-file atomicity.

use crate::config::ProjectConfig;
use crate::overwrite::{backup_path, restore_backup, OverwriteError};
use crate::patcher::{PatchError, PatchReport, TargetFile};
use crate::rule::{PatchRule, RuleError};
use crate::safety::{RootGuard, SafetyError};
use crate::version::{Version, VersionError, VersionSource};
use regex_lite::Regex;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Version(#[from] VersionError),

    #[error(transparent)]
    Rule(#[from] RuleError),

    #[error(transparent)]
    Path(#[from] SafetyError),

    #[error("invalid last-run pattern: {0}")]
    LastRunPattern(#[source] regex_lite::Error),

    #[error("no last-run marker configured and no target to fall back to")]
    NoLastRunMarker,

    #[error("failed to read last-run marker {file}: {source}")]
    LastRun { file: PathBuf, source: io::Error },

    #[error("{} stale backup file(s) from an interrupted run: {}", .backups.len(), display_paths(.backups))]
    StaleBackups { backups: Vec<PathBuf> },

    #[error("build increment prompt failed: {0}")]
    Prompt(#[source] io::Error),

    #[error("patching stopped at {file} ({committed} of {total} files already updated): {source}")]
    Patch {
        file: PathBuf,
        committed: usize,
        total: usize,
        source: PatchError,
    },

    #[error(transparent)]
    Restore(#[from] OverwriteError),
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// The interactive side of a run.
///
/// Only [`confirm_build_increment`](Self::confirm_build_increment) blocks;
/// the other hooks report progress and default to doing nothing.
pub trait Operator {
    /// The version is unchanged since the last run: bump the build ordinal?
    fn confirm_build_increment(&mut self, version: &Version) -> io::Result<bool>;

    fn version_resolved(&mut self, _version: &Version) {}

    fn build_incremented(&mut self, _version: &Version) {}

    /// Called right before `file` is rewritten.
    fn patching(&mut self, _file: &Path) {}

    /// Called right after `file` was committed, with its warnings.
    fn file_patched(&mut self, _report: &PatchReport) {}
}

/// Where the previously propagated version can be read back.
#[derive(Debug, Clone)]
pub struct LastRunMarker {
    pub file: PathBuf,
    pattern: Regex,
}

impl LastRunMarker {
    pub fn new(file: impl Into<PathBuf>, pattern: &str) -> Result<Self, RunError> {
        Ok(Self {
            file: file.into(),
            pattern: Regex::new(pattern).map_err(RunError::LastRunPattern)?,
        })
    }

    /// First recorded version string, or `None` if the file or line is absent.
    pub fn read(&self) -> Result<Option<String>, RunError> {
        let io_err = |source| RunError::LastRun {
            file: self.file.clone(),
            source,
        };
        let file = match File::open(&self.file) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_err(e)),
        };
        for line in BufReader::new(file).lines() {
            let line = line.map_err(io_err)?;
            if let Some(caps) = self.pattern.captures(line.trim_end_matches('\r')) {
                return Ok(caps.get(1).map(|m| m.as_str().to_string()));
            }
        }
        Ok(None)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Version unchanged and the operator declined the build bump; no file touched.
    Declined { version: Version },
    Updated {
        version: Version,
        reports: Vec<PatchReport>,
    },
}

impl RunOutcome {
    pub fn warning_count(&self) -> usize {
        match self {
            RunOutcome::Declined { .. } => 0,
            RunOutcome::Updated { reports, .. } => {
                reports.iter().map(|r| r.warnings.len()).sum()
            }
        }
    }
}

/// Read-only view of the project, as `status` prints it.
#[derive(Debug)]
pub struct Status {
    pub version: Version,
    pub recorded: Option<String>,
    pub stale_backups: Vec<PathBuf>,
    pub targets: Vec<(PathBuf, Result<PatchReport, PatchError>)>,
}

#[derive(Debug, Clone)]
pub struct Orchestrator {
    source: VersionSource,
    last_run: LastRunMarker,
    targets: Vec<TargetFile>,
}

impl Orchestrator {
    pub fn new(source: VersionSource, last_run: LastRunMarker, targets: Vec<TargetFile>) -> Self {
        Self {
            source,
            last_run,
            targets,
        }
    }

    /// Compile a validated config, resolving every path through `guard`.
    pub fn from_config(config: &ProjectConfig, guard: &RootGuard) -> Result<Self, RunError> {
        let source = VersionSource::new(guard.resolve(&config.source.file)?, &config.source.symbol);

        let marker = config.last_run().ok_or(RunError::NoLastRunMarker)?;
        let last_run = LastRunMarker::new(guard.resolve(&marker.file)?, &marker.pattern)?;

        let mut targets = Vec::with_capacity(config.targets.len());
        for target in &config.targets {
            let rules = target
                .rules
                .iter()
                .map(|rule| {
                    PatchRule::new(&rule.id, &rule.pattern, &rule.replace)
                        .map(|compiled| compiled.expect_matches(rule.expected))
                })
                .collect::<Result<Vec<_>, _>>()?;
            targets.push(TargetFile::new(guard.resolve(&target.file)?, rules));
        }

        Ok(Self::new(source, last_run, targets))
    }

    pub fn source(&self) -> &VersionSource {
        &self.source
    }

    pub fn targets(&self) -> &[TargetFile] {
        &self.targets
    }

    /// `.orig` files left next to any target.
    pub fn stale_backups(&self) -> Vec<PathBuf> {
        self.targets
            .iter()
            .map(|target| backup_path(&target.path))
            .filter(|backup| backup.exists())
            .collect()
    }

    pub fn run(&self, operator: &mut dyn Operator) -> Result<RunOutcome, RunError> {
        // ResolvingVersion
        let mut version = self.source.resolve()?;
        info!(%version, source = %self.source.path().display(), "resolved authoritative version");
        operator.version_resolved(&version);

        let backups = self.stale_backups();
        if !backups.is_empty() {
            return Err(RunError::StaleBackups { backups });
        }

        // ConfirmingBuild
        let recorded = self.last_run.read()?;
        debug!(?recorded, marker = %self.last_run.file.display(), "last recorded version");
        if recorded.as_deref() == Some(version.to_string().as_str()) {
            let bump = operator
                .confirm_build_increment(&version)
                .map_err(RunError::Prompt)?;
            if !bump {
                info!(%version, "version unchanged and build bump declined");
                return Ok(RunOutcome::Declined { version });
            }
            version = version.next_build()?;
            info!(%version, "incremented build number");
            operator.build_incremented(&version);
        }

        // Patching
        let total = self.targets.len();
        let mut reports = Vec::with_capacity(total);
        for (index, target) in self.targets.iter().enumerate() {
            operator.patching(&target.path);
            let report = target.patch(&version).map_err(|source| RunError::Patch {
                file: target.path.clone(),
                committed: index,
                total,
                source,
            })?;
            operator.file_patched(&report);
            reports.push(report);
        }

        // Done
        Ok(RunOutcome::Updated { version, reports })
    }

    /// Resolve the version and count rule hits everywhere, writing nothing.
    pub fn status(&self) -> Result<Status, RunError> {
        let version = self.source.resolve()?;
        let recorded = self.last_run.read()?;
        let targets = self
            .targets
            .iter()
            .map(|target| (target.path.clone(), target.scan(&version)))
            .collect();
        Ok(Status {
            version,
            recorded,
            stale_backups: self.stale_backups(),
            targets,
        })
    }

    /// Put every leftover `.orig` back over its target.
    pub fn restore_backups(&self) -> Result<Vec<PathBuf>, RunError> {
        let mut restored = Vec::new();
        for target in &self.targets {
            if backup_path(&target.path).exists() {
                let backup = restore_backup(&target.path)?;
                info!(file = %target.path.display(), backup = %backup.display(), "restored");
                restored.push(target.path.clone());
            }
        }
        Ok(restored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    struct Scripted {
        answer: bool,
        asked: usize,
    }

    impl Operator for Scripted {
        fn confirm_build_increment(&mut self, _version: &Version) -> io::Result<bool> {
            self.asked += 1;
            Ok(self.answer)
        }
    }

    fn two_file_project(dir: &Path, ci_version: &str) -> Orchestrator {
        fs::write(
            dir.join("version.h"),
            "#define APP_VERSION_STR \"1.2.3.4\"\n",
        )
        .unwrap();
        fs::write(dir.join("ci.yml"), format!("version: {ci_version}\n")).unwrap();

        Orchestrator::new(
            VersionSource::new(dir.join("version.h"), "APP_VERSION_STR"),
            LastRunMarker::new(dir.join("ci.yml"), crate::config::DEFAULT_LAST_RUN_PATTERN)
                .unwrap(),
            vec![
                TargetFile::new(
                    dir.join("version.h"),
                    vec![PatchRule::new(
                        "str",
                        r#"^#define\s+APP_VERSION_STR\s+"[\d.\w-]*""#,
                        r#"#define APP_VERSION_STR "{{version}}""#,
                    )
                    .unwrap()],
                ),
                TargetFile::new(
                    dir.join("ci.yml"),
                    vec![PatchRule::new("ci", r"^version:\s*\S+", "version: {{version}}").unwrap()],
                ),
            ],
        )
    }

    #[test]
    fn test_changed_version_skips_prompt() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = two_file_project(dir.path(), "1.2.3.3");
        let mut operator = Scripted {
            answer: false,
            asked: 0,
        };

        let outcome = orchestrator.run(&mut operator).unwrap();

        assert_eq!(operator.asked, 0);
        assert!(matches!(outcome, RunOutcome::Updated { ref version, .. } if version.to_string() == "1.2.3.4"));
        assert_eq!(
            fs::read_to_string(dir.path().join("ci.yml")).unwrap(),
            "version: 1.2.3.4\n"
        );
    }

    #[test]
    fn test_unchanged_version_declined_touches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = two_file_project(dir.path(), "1.2.3.4");
        let before = fs::read(dir.path().join("version.h")).unwrap();
        let mut operator = Scripted {
            answer: false,
            asked: 0,
        };

        let outcome = orchestrator.run(&mut operator).unwrap();

        assert_eq!(operator.asked, 1);
        assert_eq!(
            outcome,
            RunOutcome::Declined {
                version: Version::new(1, 2, 3, 4)
            }
        );
        assert_eq!(fs::read(dir.path().join("version.h")).unwrap(), before);
    }

    #[test]
    fn test_unchanged_version_accepted_bumps_build() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = two_file_project(dir.path(), "1.2.3.4");
        let mut operator = Scripted {
            answer: true,
            asked: 0,
        };

        let outcome = orchestrator.run(&mut operator).unwrap();

        assert_eq!(outcome.warning_count(), 0);
        assert_eq!(
            fs::read_to_string(dir.path().join("version.h")).unwrap(),
            "#define APP_VERSION_STR \"1.2.3.5\"\n"
        );
        assert_eq!(
            fs::read_to_string(dir.path().join("ci.yml")).unwrap(),
            "version: 1.2.3.5\n"
        );
    }

    #[test]
    fn test_stale_backup_aborts_before_prompt() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = two_file_project(dir.path(), "1.2.3.4");
        fs::write(dir.path().join("ci.yml.orig"), "version: 1.2.3.3\n").unwrap();
        let mut operator = Scripted {
            answer: true,
            asked: 0,
        };

        let err = orchestrator.run(&mut operator).unwrap_err();

        assert!(matches!(err, RunError::StaleBackups { ref backups } if backups.len() == 1));
        assert_eq!(operator.asked, 0);

        let restored = orchestrator.restore_backups().unwrap();
        assert_eq!(restored, vec![dir.path().join("ci.yml")]);
        assert_eq!(
            fs::read_to_string(dir.path().join("ci.yml")).unwrap(),
            "version: 1.2.3.3\n"
        );
    }

    #[test]
    fn test_missing_marker_file_counts_as_changed() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = two_file_project(dir.path(), "1.2.3.4");
        fs::remove_file(dir.path().join("ci.yml")).unwrap();
        let mut operator = Scripted {
            answer: false,
            asked: 0,
        };

        let outcome = orchestrator.run(&mut operator).unwrap();

        assert_eq!(operator.asked, 0);
        // The recreated CI file is empty, so its rule reports drift.
        assert_eq!(outcome.warning_count(), 1);
    }

    #[test]
    fn test_status_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = two_file_project(dir.path(), "1.2.3.3");

        let status = orchestrator.status().unwrap();

        assert_eq!(status.version, Version::new(1, 2, 3, 4));
        assert_eq!(status.recorded.as_deref(), Some("1.2.3.3"));
        assert!(status.stale_backups.is_empty());
        assert_eq!(status.targets.len(), 2);
        assert_eq!(
            fs::read_to_string(dir.path().join("ci.yml")).unwrap(),
            "version: 1.2.3.3\n"
        );
    }

    #[test]
    fn test_config_without_targets_has_no_marker() {
        let dir = tempfile::tempdir().unwrap();
        let guard = RootGuard::new(dir.path()).unwrap();

        let err = Orchestrator::from_config(&ProjectConfig::default(), &guard).unwrap_err();
        assert!(matches!(err, RunError::NoLastRunMarker));
    }
}
