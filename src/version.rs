//! The authoritative four-part version and the reader that extracts it.
//!
//! The version lives in a C header as
//! `#define HASHCHECK_VERSION_STR "major.minor.patch.build[-suffix]"`. Only the
//! first matching line counts; the file itself is never mutated here.

use regex_lite::Regex;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Default `#define` symbol carrying the authoritative version string.
pub const DEFAULT_SYMBOL: &str = "HASHCHECK_VERSION_STR";

#[derive(Error, Debug)]
pub enum VersionError {
    #[error("failed to read version source {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("valid version not found in {path} (looked for #define {symbol})")]
    NotFound { path: PathBuf, symbol: String },

    #[error("invalid version '{input}': {reason}")]
    InvalidComponent { input: String, reason: String },

    #[error("build number {build} cannot be incremented")]
    BuildOverflow { build: u64 },
}

/// A `major.minor.patch.build[-suffix]` version.
///
/// Ordinals are stored numerically. Superfluous leading zeros are rejected on
/// parse so that `to_string()` always reproduces the parsed text exactly.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub build: u64,
    /// Pre-release tag without the leading `-`, e.g. `beta`
    pub suffix: Option<String>,
}

impl Version {
    pub fn new(major: u64, minor: u64, patch: u64, build: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            build,
            suffix: None,
        }
    }

    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = Some(suffix.into());
        self
    }

    /// The same version with the build ordinal bumped by one.
    pub fn next_build(&self) -> Result<Version, VersionError> {
        let build = self
            .build
            .checked_add(1)
            .ok_or(VersionError::BuildOverflow { build: self.build })?;
        Ok(Version {
            build,
            ..self.clone()
        })
    }

    /// `major,minor,patch,build` as used by resource-script constants.
    pub fn numeric_commas(&self) -> String {
        format!("{},{},{},{}", self.major, self.minor, self.patch, self.build)
    }

    fn from_parts(
        input: &str,
        ordinals: [&str; 4],
        suffix: Option<&str>,
    ) -> Result<Version, VersionError> {
        let mut values = [0u64; 4];
        for (slot, text) in values.iter_mut().zip(ordinals) {
            *slot = parse_ordinal(input, text)?;
        }
        let suffix = match suffix {
            None | Some("") => None,
            Some(tag) => {
                let tag = tag.strip_prefix('-').unwrap_or(tag);
                if tag.is_empty() || !tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
                {
                    return Err(VersionError::InvalidComponent {
                        input: input.to_string(),
                        reason: format!("suffix '-{tag}' must be word characters"),
                    });
                }
                Some(tag.to_string())
            }
        };
        let [major, minor, patch, build] = values;
        Ok(Version {
            major,
            minor,
            patch,
            build,
            suffix,
        })
    }
}

fn parse_ordinal(input: &str, text: &str) -> Result<u64, VersionError> {
    let invalid = |reason: String| VersionError::InvalidComponent {
        input: input.to_string(),
        reason,
    };
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid(format!("'{text}' is not a non-negative integer")));
    }
    if text.len() > 1 && text.starts_with('0') {
        return Err(invalid(format!("'{text}' has a leading zero")));
    }
    text.parse::<u64>()
        .map_err(|e| invalid(format!("'{text}': {e}")))
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.patch, self.build
        )?;
        if let Some(suffix) = &self.suffix {
            write!(f, "-{suffix}")?;
        }
        Ok(())
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (numbers, suffix) = match s.split_once('-') {
            Some((numbers, tag)) => (numbers, Some(tag)),
            None => (s, None),
        };
        let parts: Vec<&str> = numbers.split('.').collect();
        let ordinals: [&str; 4] =
            parts
                .try_into()
                .map_err(|parts: Vec<&str>| VersionError::InvalidComponent {
                    input: s.to_string(),
                    reason: format!("expected 4 dot-separated ordinals, found {}", parts.len()),
                })?;
        // A bare trailing '-' is not a suffix.
        if suffix == Some("") {
            return Err(VersionError::InvalidComponent {
                input: s.to_string(),
                reason: "empty suffix".to_string(),
            });
        }
        Version::from_parts(s, ordinals, suffix)
    }
}

/// Locates the authoritative `#define` in a header file.
#[derive(Debug, Clone)]
pub struct VersionSource {
    path: PathBuf,
    symbol: String,
    pattern: Regex,
}

impl VersionSource {
    pub fn new(path: impl Into<PathBuf>, symbol: &str) -> Self {
        let pattern = Regex::new(&format!(
            r#"^#define\s+{}\s+"(\d+)\.(\d+)\.(\d+)\.(\d+)((?:-\w+)?)""#,
            regex_lite::escape(symbol)
        ))
        .expect("escaped symbol always yields a valid pattern");
        Self {
            path: path.into(),
            symbol: symbol.to_string(),
            pattern,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Parse a single line; `None` if it is not the version declaration.
    pub fn parse_line(&self, line: &str) -> Option<Result<Version, VersionError>> {
        let caps = self.pattern.captures(line)?;
        let whole = caps.get(0).map_or(line, |m| m.as_str());
        let ordinals = [&caps[1], &caps[2], &caps[3], &caps[4]];
        let suffix = caps.get(5).map(|m| m.as_str());
        Some(Version::from_parts(whole, ordinals, suffix))
    }

    /// Read the file and return the first declared version.
    pub fn resolve(&self) -> Result<Version, VersionError> {
        let io_err = |source| VersionError::Io {
            path: self.path.clone(),
            source,
        };
        let reader = BufReader::new(File::open(&self.path).map_err(io_err)?);
        for line in reader.lines() {
            let line = line.map_err(io_err)?;
            if let Some(parsed) = self.parse_line(&line) {
                return parsed;
            }
        }
        Err(VersionError::NotFound {
            path: self.path.clone(),
            symbol: self.symbol.clone(),
        })
    }
}
