use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use similar::{ChangeTag, TextDiff};
use std::env;
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use version_patcher::config::discover;
use version_patcher::{Operator, Orchestrator, PatchReport, RootGuard, RunOutcome, Version};

#[derive(Parser)]
#[command(name = "version-patcher")]
#[command(about = "Propagate the authoritative version into every versioned file", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Project root (defaults to $VERSION_PATCHER_ROOT, then the current directory)
    #[arg(short, long, global = true)]
    root: Option<PathBuf>,

    /// Config file (defaults to <root>/version-patcher.toml, then the built-in rules)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Exit immediately instead of waiting for Enter
    #[arg(long, global = true)]
    no_pause: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Update every target to the authoritative version (default)
    Update {
        /// Show unified diff of changes
        #[arg(short, long)]
        diff: bool,
    },

    /// Show the authoritative version and rule matches without writing
    Status,

    /// Restore `.orig` backups left by an interrupted run
    Restore,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let (code, pause) = match Cli::try_parse() {
        Ok(cli) => {
            let pause = !cli.no_pause;
            let code = match run(cli) {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    eprintln!("{} {:#}", "error:".red().bold(), e);
                    ExitCode::FAILURE
                }
            };
            (code, pause)
        }
        // Usage errors, --help and --version still end with the pause.
        Err(e) => {
            let _ = e.print();
            let code = if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
            (code, !env::args_os().any(|arg| arg == "--no-pause"))
        }
    };

    // Keeps a double-clicked console window open.
    if pause {
        print!("Press Enter to exit ...");
        let _ = io::stdout().flush();
        let _ = io::stdin().lock().read_line(&mut String::new());
    }

    code
}

fn run(cli: Cli) -> Result<()> {
    let root = resolve_root(cli.root)?;
    let (config, config_path) = discover(&root, cli.config.as_deref())?;
    if let Some(path) = &config_path {
        println!("{}", format!("Using config {}", path.display()).dimmed());
    }

    let guard = RootGuard::new(&root)?;
    let orchestrator = Orchestrator::from_config(&config, &guard)?;

    match cli.command.unwrap_or(Commands::Update { diff: false }) {
        Commands::Update { diff } => cmd_update(&orchestrator, guard.root(), diff),
        Commands::Status => cmd_status(&orchestrator),
        Commands::Restore => cmd_restore(&orchestrator),
    }
}

/// Resolve project root
///
/// Priority order:
/// 1. Explicit --root flag
/// 2. VERSION_PATCHER_ROOT environment variable
/// 3. Current directory
fn resolve_root(cli_root: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = cli_root {
        return path
            .canonicalize()
            .with_context(|| format!("project root {} not found", path.display()));
    }

    if let Ok(env_path) = env::var("VERSION_PATCHER_ROOT") {
        let path = PathBuf::from(&env_path);
        if path.exists() {
            return Ok(path.canonicalize()?);
        }
        eprintln!(
            "{}",
            format!(
                "Warning: VERSION_PATCHER_ROOT is set but path doesn't exist: {}",
                env_path
            )
            .yellow()
        );
    }

    Ok(env::current_dir()?)
}

/// Terminal front end for an update run.
struct Terminal {
    root: PathBuf,
    show_diff: bool,
    before: Option<String>,
}

impl Terminal {
    fn relative<'a>(&self, file: &'a Path) -> &'a Path {
        file.strip_prefix(&self.root).unwrap_or(file)
    }
}

impl Operator for Terminal {
    fn confirm_build_increment(&mut self, _version: &Version) -> io::Result<bool> {
        print!("Version is unchanged, increment build number (Y/n)? ");
        io::stdout().flush()?;

        let mut answer = String::new();
        if io::stdin().lock().read_line(&mut answer)? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "no answer on stdin",
            ));
        }
        let answer = answer.trim().to_ascii_lowercase();
        Ok(answer != "n" && answer != "no")
    }

    fn version_resolved(&mut self, version: &Version) {
        println!("{}", format!("v{version}").bold());
    }

    fn build_incremented(&mut self, version: &Version) {
        println!("{}", format!("v{version}").bold());
    }

    fn patching(&mut self, file: &Path) {
        println!("Updating {}...", self.relative(file).display());
        if self.show_diff {
            self.before = fs::read_to_string(file).ok();
        }
    }

    fn file_patched(&mut self, report: &PatchReport) {
        let name = self.relative(&report.file).display().to_string();
        if report.changed {
            println!("{} {}: updated", "✓".green(), name);
        } else {
            println!("{} {}: already up to date", "⊙".yellow(), name);
        }
        for warning in &report.warnings {
            eprintln!("  {} {}", "warning:".yellow().bold(), warning);
        }

        if let Some(before) = self.before.take() {
            if let Ok(after) = fs::read_to_string(&report.file) {
                if before != after {
                    display_diff(self.relative(&report.file), &before, &after);
                }
            }
        }
    }
}

/// Helper: Show unified diff between original and modified content
fn display_diff(file: &Path, original: &str, modified: &str) {
    println!(
        "\n{}",
        format!("--- {} (original)", file.display()).dimmed()
    );
    println!("{}", format!("+++ {} (patched)", file.display()).dimmed());

    let diff = TextDiff::from_lines(original, modified);

    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => format!("-{}", change).red(),
            ChangeTag::Insert => format!("+{}", change).green(),
            ChangeTag::Equal => continue,
        };
        print!("{}", sign);
    }
    println!();
}

fn cmd_update(orchestrator: &Orchestrator, root: &Path, show_diff: bool) -> Result<()> {
    let mut terminal = Terminal {
        root: root.to_path_buf(),
        show_diff,
        before: None,
    };

    match orchestrator.run(&mut terminal)? {
        RunOutcome::Declined { .. } => {
            println!("{}", "Nothing to do.".dimmed());
        }
        outcome @ RunOutcome::Updated { .. } => {
            let warnings = outcome.warning_count();
            if warnings > 0 {
                println!(
                    "{}",
                    format!("{} consistency warning(s); check the rules above", warnings).yellow()
                );
            }
            println!("Done.");
        }
    }
    Ok(())
}

fn cmd_status(orchestrator: &Orchestrator) -> Result<()> {
    let status = orchestrator.status()?;

    println!("{}", "Version Status Report".bold());
    println!(
        "Source: {} (#define {})",
        orchestrator.source().path().display(),
        orchestrator.source().symbol()
    );
    println!("Version: {}", status.version);
    match &status.recorded {
        Some(recorded) if *recorded == status.version.to_string() => {
            println!("Last run: {} {}", recorded, "(unchanged)".dimmed());
        }
        Some(recorded) => println!("Last run: {}", recorded.yellow()),
        None => println!("Last run: {}", "none recorded".dimmed()),
    }
    println!();

    for (file, result) in &status.targets {
        match result {
            Ok(report) => {
                let mark = if report.is_clean() {
                    "✓".green()
                } else {
                    "⊙".yellow()
                };
                let state = if report.changed {
                    "out of date"
                } else {
                    "up to date"
                };
                println!("{} {} ({})", mark, file.display(), state);
                for (rule, hits) in &report.hits {
                    println!("  - {}: {} match(es)", rule, hits);
                }
                for warning in &report.warnings {
                    println!("  {} {}", "warning:".yellow().bold(), warning);
                }
            }
            Err(e) => println!("{} {}: {}", "✗".red(), file.display(), e),
        }
    }

    if !status.stale_backups.is_empty() {
        println!();
        println!(
            "{} {} ({} files)",
            "⊘".red(),
            "STALE BACKUPS".red().bold(),
            status.stale_backups.len()
        );
        for backup in &status.stale_backups {
            println!("  - {}", backup.display());
        }
        println!("  Run `version-patcher restore` to put them back.");
    }

    Ok(())
}

fn cmd_restore(orchestrator: &Orchestrator) -> Result<()> {
    let restored = orchestrator.restore_backups()?;
    if restored.is_empty() {
        println!("{}", "No backups to restore.".dimmed());
    }
    for file in &restored {
        println!("{} restored {}", "✓".green(), file.display());
    }
    Ok(())
}
