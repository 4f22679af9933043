//! Version Patcher: propagate one authoritative version into many files
//!
//! A release tree keeps its version in one `#define` and repeats it, in
//! different shapes, in a header, an installer script and a CI manifest.
//! This crate reads the authoritative value and rewrites every copy.
//!
//! # Architecture
//!
//! - [`VersionSource`] finds and parses the authoritative declaration.
//! - [`PatchRule`] is a declarative line matcher plus a `{{field}}` template.
//! - [`patch_file`] streams a target through its rules inside an
//!   [`Overwrite`] transaction and reports per-rule hit counts.
//! - [`Orchestrator`] runs resolve, confirm, patch and done in order,
//!   asking an [`Operator`] only when the build number should be bumped.
//!
//! # Safety
//!
//! - Each target is moved to `<file>.orig` before it is rewritten
//! - Any failure restores the original byte-for-byte
//! - Leftover `.orig` files block the next run until restored
//! - Rule drift (0 or several matches) is reported, never fatal
//!
//! # Example
//!
//! ```no_run
//! use version_patcher::{patch_file, PatchRule, Version};
//! use std::path::Path;
//!
//! let rule = PatchRule::new("ci", r"^version:\s*\S+", "version: {{version}}").unwrap();
//! let report = patch_file(Path::new("appveyor.yml"), &[rule], &Version::new(2, 1, 11, 2));
//!
//! match report {
//!     Ok(report) => println!("hits: {:?}", report.hits),
//!     Err(e) => eprintln!("patch failed: {}", e),
//! }
//! ```

pub mod config;
pub mod orchestrator;
pub mod overwrite;
pub mod patcher;
pub mod rule;
pub mod safety;
pub mod version;

// Re-exports
pub use config::{
    discover, load_from_path, load_from_str, ConfigError, ConfigOrigin, ProjectConfig,
};
pub use orchestrator::{LastRunMarker, Operator, Orchestrator, RunError, RunOutcome, Status};
pub use overwrite::{backup_path, overwrite, restore_backup, Overwrite, OverwriteError};
pub use patcher::{patch_file, scan_file, ConsistencyWarning, PatchError, PatchReport, TargetFile};
pub use rule::{PatchRule, RuleError, Template, TemplateError};
pub use safety::{RootGuard, SafetyError};
pub use version::{Version, VersionError, VersionSource};
