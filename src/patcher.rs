//! Applies an ordered list of [`PatchRule`]s to one target file.
//!
//! The target is rewritten inside an [`Overwrite`] transaction: lines are read
//! from the `.orig` backup, passed through every rule in order and streamed
//! into the new file. Hit counts that differ from a rule's expectation become
//! [`ConsistencyWarning`]s; they never stop the rewrite.

use crate::overwrite::{Overwrite, OverwriteError};
use crate::rule::PatchRule;
use crate::version::Version;
use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};
use xxhash_rust::xxh3::Xxh3;

#[derive(Error, Debug)]
pub enum PatchError {
    #[error(transparent)]
    Overwrite(#[from] OverwriteError),

    #[error("I/O error while patching {file} (original restored): {source}")]
    Io { file: PathBuf, source: io::Error },
}

/// A rule matched a different number of lines than expected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsistencyWarning {
    pub rule: String,
    pub expected: usize,
    pub found: usize,
}

impl fmt::Display for ConsistencyWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rule '{}' matched {} time{} (expected {})",
            self.rule,
            self.found,
            if self.found == 1 { "" } else { "s" },
            self.expected
        )
    }
}

/// Outcome of patching one file.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "PatchReport carries consistency warnings that should be surfaced"]
pub struct PatchReport {
    pub file: PathBuf,
    /// `(rule id, hits)` in rule order
    pub hits: Vec<(String, usize)>,
    pub warnings: Vec<ConsistencyWarning>,
    /// Whether the written bytes differ from the original
    pub changed: bool,
}

impl PatchReport {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// A file to keep in sync and the rules that rewrite it.
#[derive(Debug, Clone)]
pub struct TargetFile {
    pub path: PathBuf,
    pub rules: Vec<PatchRule>,
}

impl TargetFile {
    pub fn new(path: impl Into<PathBuf>, rules: Vec<PatchRule>) -> Self {
        Self {
            path: path.into(),
            rules,
        }
    }

    pub fn patch(&self, version: &Version) -> Result<PatchReport, PatchError> {
        patch_file(&self.path, &self.rules, version)
    }

    pub fn scan(&self, version: &Version) -> Result<PatchReport, PatchError> {
        scan_file(&self.path, &self.rules, version)
    }
}

/// Counts rule hits over a stream of lines without touching the filesystem.
struct LinePatcher<'r> {
    rules: &'r [PatchRule],
    version: &'r Version,
    hits: Vec<usize>,
    before: Xxh3,
    after: Xxh3,
}

impl<'r> LinePatcher<'r> {
    fn new(rules: &'r [PatchRule], version: &'r Version) -> Self {
        Self {
            rules,
            version,
            hits: vec![0; rules.len()],
            before: Xxh3::new(),
            after: Xxh3::new(),
        }
    }

    fn patch_line(&mut self, line: &str) -> String {
        self.before.update(line.as_bytes());
        // Rules see the line body only; the terminator is put back unchanged.
        let body = line.trim_end_matches(['\r', '\n']);
        let ending = &line[body.len()..];
        let mut current = body.to_string();
        for (rule, hits) in self.rules.iter().zip(self.hits.iter_mut()) {
            let (rewritten, count) = rule.apply(&current, self.version);
            if count > 0 {
                *hits += count;
                current = rewritten.into_owned();
            }
        }
        current.push_str(ending);
        self.after.update(current.as_bytes());
        current
    }

    /// Feed every line of `input` through the rules into `out`.
    fn run<R: BufRead, W: Write>(&mut self, mut input: R, out: &mut W) -> io::Result<()> {
        let mut line = String::new();
        loop {
            line.clear();
            // `read_line` keeps the terminator, so CRLF files stay CRLF.
            if input.read_line(&mut line)? == 0 {
                return Ok(());
            }
            let patched = self.patch_line(&line);
            out.write_all(patched.as_bytes())?;
        }
    }

    fn finish(self, file: &Path) -> PatchReport {
        let mut warnings = Vec::new();
        let mut hits = Vec::with_capacity(self.rules.len());
        for (rule, &found) in self.rules.iter().zip(&self.hits) {
            if found != rule.expected {
                warnings.push(ConsistencyWarning {
                    rule: rule.id.clone(),
                    expected: rule.expected,
                    found,
                });
            }
            hits.push((rule.id.clone(), found));
        }
        PatchReport {
            file: file.to_path_buf(),
            hits,
            warnings,
            changed: self.before.digest() != self.after.digest(),
        }
    }
}

/// Rewrite `file` in place with `rules` rendered for `version`.
///
/// On any I/O failure (including non-UTF-8 input) the file is restored from
/// its backup before the error is returned.
pub fn patch_file(
    file: &Path,
    rules: &[PatchRule],
    version: &Version,
) -> Result<PatchReport, PatchError> {
    let io_err = |source| PatchError::Io {
        file: file.to_path_buf(),
        source,
    };

    let mut tx = Overwrite::begin(file)?;
    let mut patcher = LinePatcher::new(rules, version);

    let backup = tx.backup().map(Path::to_path_buf);
    let streamed = match backup {
        Some(backup) => File::open(backup)
            .map(BufReader::new)
            .and_then(|reader| patcher.run(reader, &mut tx)),
        None => patcher.run(io::empty(), &mut tx),
    };
    // Leaving early drops `tx`, which rolls back.
    streamed.map_err(io_err)?;
    tx.commit()?;

    let report = patcher.finish(file);
    debug!(file = %file.display(), hits = ?report.hits, changed = report.changed, "patched");
    for warning in &report.warnings {
        warn!(file = %file.display(), "{warning}");
    }
    Ok(report)
}

/// Count rule hits in `file` without modifying it.
pub fn scan_file(
    file: &Path,
    rules: &[PatchRule],
    version: &Version,
) -> Result<PatchReport, PatchError> {
    let reader = File::open(file).map(BufReader::new).map_err(|source| PatchError::Io {
        file: file.to_path_buf(),
        source,
    })?;
    let mut patcher = LinePatcher::new(rules, version);
    patcher
        .run(reader, &mut io::sink())
        .map_err(|source| PatchError::Io {
            file: file.to_path_buf(),
            source,
        })?;
    Ok(patcher.finish(file))
}
