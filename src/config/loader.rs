use crate::config::defaults::BUILTIN_CONFIG;
use crate::config::schema::{ProjectConfig, ValidationError};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File name looked up in the project root when no config is given explicitly.
pub const CONFIG_FILE_NAME: &str = "version-patcher.toml";

/// Where a config was loaded from, for error messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigOrigin {
    Builtin,
    Inline,
    File(PathBuf),
}

impl fmt::Display for ConfigOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigOrigin::Builtin => f.write_str("built-in config"),
            ConfigOrigin::Inline => f.write_str("config"),
            ConfigOrigin::File(path) => write!(f, "config {}", path.display()),
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("{origin} is not valid TOML: {source}")]
    Parse {
        origin: ConfigOrigin,
        source: toml_edit::de::Error,
    },

    #[error("{origin} is invalid:\n{source}")]
    Invalid {
        origin: ConfigOrigin,
        source: ValidationError,
    },
}

impl ConfigError {
    pub fn origin(&self) -> Option<&ConfigOrigin> {
        match self {
            ConfigError::Read { .. } => None,
            ConfigError::Parse { origin, .. } | ConfigError::Invalid { origin, .. } => Some(origin),
        }
    }
}

fn parse(input: &str, origin: ConfigOrigin) -> Result<ProjectConfig, ConfigError> {
    let config: ProjectConfig = match toml_edit::de::from_str(input) {
        Ok(config) => config,
        Err(source) => return Err(ConfigError::Parse { origin, source }),
    };
    config
        .validate()
        .map_err(|source| ConfigError::Invalid { origin, source })?;
    Ok(config)
}

pub fn load_from_str(input: &str) -> Result<ProjectConfig, ConfigError> {
    parse(input, ConfigOrigin::Inline)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<ProjectConfig, ConfigError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse(&contents, ConfigOrigin::File(path.to_path_buf()))
}

/// The HashCheck layout: `version.h`, the NSIS installer and `appveyor.yml`.
pub fn builtin() -> Result<ProjectConfig, ConfigError> {
    parse(BUILTIN_CONFIG, ConfigOrigin::Builtin)
}

/// Explicit path if given, else `<root>/version-patcher.toml`, else the builtin.
///
/// Returns the config and the file it came from (`None` for the builtin).
pub fn discover(
    root: &Path,
    explicit: Option<&Path>,
) -> Result<(ProjectConfig, Option<PathBuf>), ConfigError> {
    if let Some(path) = explicit {
        return Ok((load_from_path(path)?, Some(path.to_path_buf())));
    }
    let candidate = root.join(CONFIG_FILE_NAME);
    if candidate.is_file() {
        return Ok((load_from_path(&candidate)?, Some(candidate)));
    }
    Ok((builtin()?, None))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_config_is_valid() {
        let config = builtin().unwrap();
        assert_eq!(config.source.file, "version.h");
        assert_eq!(config.targets.len(), 3);
        let rule_counts: Vec<usize> = config.targets.iter().map(|t| t.rules.len()).collect();
        assert_eq!(rule_counts, vec![3, 4, 1]);
        assert_eq!(config.last_run().unwrap().file, "appveyor.yml");
    }

    #[test]
    fn test_parse_error_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "[[targets]\nfile = ").unwrap();

        let err = load_from_path(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert_eq!(err.origin(), Some(&ConfigOrigin::File(path.clone())));
        assert!(err.to_string().contains(CONFIG_FILE_NAME));
    }

    #[test]
    fn test_discover_prefers_root_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            r#"
[[targets]]
file = "VERSION.txt"
[[targets.rules]]
id = "plain"
pattern = '^\d+\.\d+\.\d+\.\d+'
replace = "{{version}}"
"#,
        )
        .unwrap();

        let (config, from) = discover(dir.path(), None).unwrap();
        assert_eq!(config.targets[0].file, "VERSION.txt");
        assert_eq!(from, Some(dir.path().join(CONFIG_FILE_NAME)));
    }

    #[test]
    fn test_discover_falls_back_to_builtin() {
        let dir = tempfile::tempdir().unwrap();
        let (config, from) = discover(dir.path(), None).unwrap();
        assert_eq!(config.targets.len(), 3);
        assert!(from.is_none());
    }
}
