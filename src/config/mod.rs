pub mod defaults;
pub mod loader;
pub mod schema;

pub use loader::{
    builtin, discover, load_from_path, load_from_str, ConfigError, ConfigOrigin, CONFIG_FILE_NAME,
};
pub use schema::{
    LastRunConfig, ProjectConfig, RuleConfig, SourceConfig, TargetConfig, ValidationError,
    ValidationIssue, DEFAULT_LAST_RUN_PATTERN,
};
