use crate::rule::Template;
use crate::version::DEFAULT_SYMBOL;
use regex_lite::Regex;
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;

/// Pattern used to find the previously written version in the last target.
pub const DEFAULT_LAST_RUN_PATTERN: &str = r"^version:\s*(\S+)\s*$";

#[derive(Debug, Deserialize, Default, Clone)]
pub struct ProjectConfig {
    #[serde(default)]
    pub source: SourceConfig,
    /// Where the previous run's version is recorded; defaults to the last target
    #[serde(default)]
    pub last_run: Option<LastRunConfig>,
    #[serde(default)]
    pub targets: Vec<TargetConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    #[serde(default = "default_source_file")]
    pub file: String,
    #[serde(default = "default_symbol")]
    pub symbol: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            file: default_source_file(),
            symbol: default_symbol(),
        }
    }
}

fn default_source_file() -> String {
    "version.h".to_string()
}

fn default_symbol() -> String {
    DEFAULT_SYMBOL.to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LastRunConfig {
    pub file: String,
    /// Capture group 1 must yield the recorded version string
    #[serde(default = "default_last_run_pattern")]
    pub pattern: String,
}

fn default_last_run_pattern() -> String {
    DEFAULT_LAST_RUN_PATTERN.to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct TargetConfig {
    pub file: String,
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RuleConfig {
    pub id: String,
    pub pattern: String,
    pub replace: String,
    #[serde(default = "default_expected")]
    pub expected: usize,
}

fn default_expected() -> usize {
    1
}

impl ProjectConfig {
    /// The marker location, falling back to the last target's file.
    pub fn last_run(&self) -> Option<LastRunConfig> {
        self.last_run.clone().or_else(|| {
            self.targets.last().map(|target| LastRunConfig {
                file: target.file.clone(),
                pattern: default_last_run_pattern(),
            })
        })
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        if self.source.file.trim().is_empty() {
            issues.push(ValidationIssue::MissingField {
                target: None,
                field: "source.file",
            });
        }
        if self.source.symbol.trim().is_empty() {
            issues.push(ValidationIssue::MissingField {
                target: None,
                field: "source.symbol",
            });
        }

        if self.targets.is_empty() {
            issues.push(ValidationIssue::EmptyTargetList);
        }

        if let Some(last_run) = &self.last_run {
            if last_run.file.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    target: None,
                    field: "last_run.file",
                });
            }
            match Regex::new(&last_run.pattern) {
                Ok(regex) if regex.captures_len() < 2 => {
                    issues.push(ValidationIssue::Invalid {
                        target: None,
                        message: "last_run.pattern needs a capture group for the version"
                            .to_string(),
                    });
                }
                Ok(_) => {}
                Err(e) => issues.push(ValidationIssue::Invalid {
                    target: None,
                    message: format!("last_run.pattern: {e}"),
                }),
            }
        }

        for target in &self.targets {
            if target.file.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    target: None,
                    field: "file",
                });
                continue;
            }
            let file = Some(target.file.clone());

            if target.rules.is_empty() {
                issues.push(ValidationIssue::Invalid {
                    target: file.clone(),
                    message: "target has no rules".to_string(),
                });
            }

            let mut seen = HashSet::new();
            for rule in &target.rules {
                if rule.id.trim().is_empty() {
                    issues.push(ValidationIssue::MissingField {
                        target: file.clone(),
                        field: "rules.id",
                    });
                } else if !seen.insert(rule.id.as_str()) {
                    issues.push(ValidationIssue::Invalid {
                        target: file.clone(),
                        message: format!("duplicate rule id '{}'", rule.id),
                    });
                }
                if rule.pattern.is_empty() {
                    issues.push(ValidationIssue::MissingField {
                        target: file.clone(),
                        field: "rules.pattern",
                    });
                } else if let Err(e) = Regex::new(&rule.pattern) {
                    issues.push(ValidationIssue::Invalid {
                        target: file.clone(),
                        message: format!("rule '{}': invalid pattern: {e}", rule.id),
                    });
                }
                if let Err(e) = Template::parse(&rule.replace) {
                    issues.push(ValidationIssue::Invalid {
                        target: file.clone(),
                        message: format!("rule '{}': {e}", rule.id),
                    });
                }
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone)]
pub enum ValidationIssue {
    EmptyTargetList,
    MissingField {
        target: Option<String>,
        field: &'static str,
    },
    Invalid {
        target: Option<String>,
        message: String,
    },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::EmptyTargetList => write!(f, "config contains no targets"),
            ValidationIssue::MissingField { target, field } => match target {
                Some(file) => write!(f, "target '{file}' missing required field '{field}'"),
                None => write!(f, "missing required field '{field}'"),
            },
            ValidationIssue::Invalid { target, message } => match target {
                Some(file) => write!(f, "target '{file}' has invalid configuration: {message}"),
                None => write!(f, "invalid configuration: {message}"),
            },
        }
    }
}
