//! Integration tests for the command-line interface
//!
//! Drives the built binary over a temp HashCheck tree with stdin scripted

use std::fs;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Output, Stdio};
use tempfile::TempDir;

/// Helper to create a minimal HashCheck tree
fn setup_test_tree() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("version.h"),
        "#define HASHCHECK_VERSION_FULL 2,1,11,1\n\
         #define HASHCHECK_VERSION_STR \"2.1.11.1\"\n\
         #pragma comment(linker, \"/version:2.1\")\n",
    )
    .unwrap();
    fs::create_dir(dir.path().join("installer")).unwrap();
    fs::write(
        dir.path().join("installer/HashCheck.nsi"),
        "OutFile \"HashCheckSetup-v2.1.11.1.exe\"\n\
         VIProductVersion \"2.1.11.1\"\n\
         VIAddVersionKey /LANG=${LANG_ENGLISH} \"ProductVersion\" \"2.1.11.1\"\n\
         VIAddVersionKey /LANG=${LANG_ENGLISH} \"FileVersion\" \"2.1.11.1\"\n",
    )
    .unwrap();
    fs::write(
        dir.path().join("appveyor.yml"),
        "version: 2.1.11.1\nimage: Visual Studio 2015\n",
    )
    .unwrap();
    dir
}

fn patcher(root: &Path, args: &[&str], stdin: &str) -> Output {
    let mut child = Command::new(env!("CARGO_BIN_EXE_version-patcher"))
        .args(args)
        .arg("--root")
        .arg(root)
        .arg("--no-pause")
        .env_remove("VERSION_PATCHER_ROOT")
        .env_remove("RUST_LOG")
        .env("NO_COLOR", "1")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    // The child may exit without reading stdin; a closed pipe is not a test failure.
    if let Err(e) = child.stdin.take().unwrap().write_all(stdin.as_bytes()) {
        assert_eq!(e.kind(), std::io::ErrorKind::BrokenPipe, "{e}");
    }
    child.wait_with_output().unwrap()
}

#[test]
fn test_help_lists_subcommands() {
    let output = Command::new(env!("CARGO_BIN_EXE_version-patcher"))
        .arg("--help")
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("update"));
    assert!(stdout.contains("status"));
    assert!(stdout.contains("restore"));
    assert!(stdout.contains("--no-pause"));
}

#[test]
fn test_default_run_prompts_and_bumps_build() {
    let tree = setup_test_tree();
    let output = patcher(tree.path(), &[], "y\n");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "stdout: {stdout}");
    assert!(stdout.contains("v2.1.11.1"));
    assert!(stdout.contains("Version is unchanged, increment build number (Y/n)? "));
    assert!(stdout.contains("v2.1.11.2"));
    assert!(stdout.contains("Updating version.h..."));
    assert!(stdout.contains("Done."));

    let ci = fs::read_to_string(tree.path().join("appveyor.yml")).unwrap();
    assert_eq!(ci, "version: 2.1.11.2\nimage: Visual Studio 2015\n");
}

#[test]
fn test_empty_answer_means_yes() {
    let tree = setup_test_tree();
    let output = patcher(tree.path(), &["update"], "\n");

    assert!(output.status.success());
    let header = fs::read_to_string(tree.path().join("version.h")).unwrap();
    assert!(header.contains("#define HASHCHECK_VERSION_FULL 2,1,11,2\n"));
}

#[test]
fn test_declined_bump_writes_nothing() {
    let tree = setup_test_tree();
    let before = fs::read(tree.path().join("version.h")).unwrap();
    let output = patcher(tree.path(), &["update"], "n\n");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Nothing to do."));
    assert!(!stdout.contains("Updating"));
    assert_eq!(fs::read(tree.path().join("version.h")).unwrap(), before);
}

#[test]
fn test_update_diff_shows_changed_lines() {
    let tree = setup_test_tree();
    let output = patcher(tree.path(), &["update", "--diff"], "y\n");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("--- appveyor.yml (original)"));
    assert!(stdout.contains("-version: 2.1.11.1"));
    assert!(stdout.contains("+version: 2.1.11.2"));
}

#[test]
fn test_status_reports_without_writing() {
    let tree = setup_test_tree();
    let before = fs::read(tree.path().join("installer/HashCheck.nsi")).unwrap();
    let output = patcher(tree.path(), &["status"], "");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Version: 2.1.11.1"));
    assert!(stdout.contains("(unchanged)"));
    assert!(stdout.contains("outfile: 1 match(es)"));
    assert_eq!(
        fs::read(tree.path().join("installer/HashCheck.nsi")).unwrap(),
        before
    );
}

#[test]
fn test_missing_declaration_fails_without_prompt() {
    let tree = setup_test_tree();
    fs::write(tree.path().join("version.h"), "// empty\n").unwrap();
    let output = patcher(tree.path(), &[], "y\n");

    assert!(!output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(!stdout.contains("increment build number"));
    assert!(stderr.contains("valid version not found"));
}

#[test]
fn test_stale_backup_blocks_update_until_restored() {
    let tree = setup_test_tree();
    let ci = tree.path().join("appveyor.yml");
    fs::write(tree.path().join("appveyor.yml.orig"), "version: 2.1.11.0\n").unwrap();
    fs::write(&ci, "half-written").unwrap();

    let output = patcher(tree.path(), &["update"], "y\n");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("stale backup"));
    assert_eq!(fs::read_to_string(&ci).unwrap(), "half-written");

    let output = patcher(tree.path(), &["restore"], "");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("restored"));
    assert_eq!(fs::read_to_string(&ci).unwrap(), "version: 2.1.11.0\n");
    assert!(!tree.path().join("appveyor.yml.orig").exists());
}

#[test]
fn test_pause_waits_for_enter() {
    let tree = setup_test_tree();
    let mut child = Command::new(env!("CARGO_BIN_EXE_version-patcher"))
        .args(["status", "--root"])
        .arg(tree.path())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    child.stdin.take().unwrap().write_all(b"\n").unwrap();
    let output = child.wait_with_output().unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.ends_with("Press Enter to exit ..."));
}

fn run_with_stdin(args: &[&str], stdin: &str) -> Output {
    let mut child = Command::new(env!("CARGO_BIN_EXE_version-patcher"))
        .args(args)
        .env("NO_COLOR", "1")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    // The child may exit without reading stdin; a closed pipe is not a test failure.
    if let Err(e) = child.stdin.take().unwrap().write_all(stdin.as_bytes()) {
        assert_eq!(e.kind(), std::io::ErrorKind::BrokenPipe, "{e}");
    }
    child.wait_with_output().unwrap()
}

#[test]
fn test_usage_error_still_pauses() {
    let output = run_with_stdin(&["--bogus-flag"], "\n");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stderr.contains("--bogus-flag"));
    assert!(stdout.ends_with("Press Enter to exit ..."));
}

#[test]
fn test_help_still_pauses() {
    let output = run_with_stdin(&["--help"], "\n");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("restore"));
    assert!(stdout.ends_with("Press Enter to exit ..."));
}

#[test]
fn test_usage_error_honours_no_pause() {
    let output = run_with_stdin(&["--bogus-flag", "--no-pause"], "");

    assert!(!output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(!stdout.contains("Press Enter to exit"));
}
