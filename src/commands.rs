//! Core CLI commands for dtxmend: check, fix, layout.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use walkdir::WalkDir;

use crate::config::{Config, DirRule};
use crate::error;
use crate::package;
use crate::prompt::{DisambiguationPort, KeepCurrent, TerminalPrompt};
use crate::reconcile::Reconciler;
use crate::scanner;
use crate::types::{Mode, Outcome, PackageReport};

/// How `check` prints its findings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Format {
    /// Pretty-printed JSON array of package reports.
    Json,
    /// One line per finding.
    Text,
}

/// Options for `fix`.
#[derive(Debug, Clone, Copy)]
pub struct FixOptions {
    /// Never prompt; ambiguous references stay unchanged.
    pub no_prompt: bool,
    /// Rename package directories to their set title.
    pub rename_dirs: bool,
}

/// Counts across a run, used for the summary and the exit code.
#[derive(Debug, Default)]
struct Tally {
    /// Charts or packages skipped because of a recoverable error.
    errors: u32,
    /// Properties repaired (or repairable, in a dry run).
    repaired: u32,
    /// Properties left broken.
    unresolved: u32,
}

impl Tally {
    /// Exit status priority: unresolved or errors (2) > repairable (1) > clean (0).
    const fn exit_status(&self, repairs_count_as_findings: bool) -> u8 {
        if self.unresolved > 0 || self.errors > 0 {
            return 2;
        }
        if repairs_count_as_findings && self.repaired > 0 {
            return 1;
        }
        return 0;
    }

    fn of(reports: &[PackageReport]) -> Self {
        let mut tally = Self::default();
        for report in reports {
            if report.error.is_some() {
                tally.errors = tally.errors.saturating_add(1);
            }
            for chart in report.charts.iter().filter(|c| return c.error.is_some()) {
                tally.errors = tally.errors.saturating_add(1);
                tracing::debug!(chart = %chart.chart.display(), "chart skipped");
            }
            for (_, check) in report.checks() {
                if check.outcome.is_repaired() {
                    tally.repaired = tally.repaired.saturating_add(1);
                } else if check.outcome.is_unresolved() {
                    tally.unresolved = tally.unresolved.saturating_add(1);
                }
            }
        }
        return tally;
    }
}

/// Dry-run every selected package and report what `fix` would do.
///
/// # Errors
///
/// Returns errors from package discovery, filesystem access, or JSON output.
pub fn check(config: &Config, song: Option<&str>, format: Format) -> Result<ExitCode, error::Error> {
    let packages = scanner::select_packages(&config.songs_directory, song)?;
    let mut port = KeepCurrent;
    let mut reconciler = Reconciler::new(&mut port, Mode::DryRun);

    let mut reports = Vec::with_capacity(packages.len());
    for package in &packages {
        reports.push(package::process(package, config, &mut reconciler, false)?);
    }

    let tally = Tally::of(&reports);
    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&reports)?),
        Format::Text => print_check_lines(&reports, &tally),
    }
    return Ok(ExitCode::from(tally.exit_status(true)));
}

/// Apply repairs to every selected package, prompting when a reference has
/// several candidates. Outputs a markdown report on stderr.
///
/// Closing the prompt (end of input) stops the run after the current chart.
///
/// # Errors
///
/// Returns errors from package discovery, renames, or descriptor writes.
pub fn fix(config: &Config, song: Option<&str>, options: FixOptions) -> Result<ExitCode, error::Error> {
    let packages = scanner::select_packages(&config.songs_directory, song)?;
    let rename_dirs = options.rename_dirs || config.rename_song_dirs;

    let mut port: Box<dyn DisambiguationPort> = if options.no_prompt {
        Box::new(KeepCurrent)
    } else {
        Box::new(TerminalPrompt::stdio())
    };
    let mut reconciler = Reconciler::new(port.as_mut(), Mode::Apply);

    let mut reports = Vec::with_capacity(packages.len());
    for package in &packages {
        reports.push(package::process(package, config, &mut reconciler, rename_dirs)?);
        if reconciler.is_cancelled() {
            tracing::warn!("input closed; stopping after {}", package::package_name(package));
            break;
        }
    }

    let tally = Tally::of(&reports);
    print_fix_report(&reports, &tally);
    return Ok(ExitCode::from(tally.exit_status(false)));
}

/// List assets that do not live in the directory their layout rule names.
/// Nothing is moved.
///
/// # Errors
///
/// Returns errors from package discovery or directory traversal.
pub fn layout(config: &Config, song: Option<&str>) -> Result<ExitCode, error::Error> {
    if config.dir_structure.is_empty() {
        eprintln!("No `dir_structure` rules configured, nothing to check.");
        return Ok(ExitCode::SUCCESS);
    }

    let packages = scanner::select_packages(&config.songs_directory, song)?;
    let mut misplaced_count = 0_u32;

    for package in &packages {
        for (relative, rule) in misplaced_assets(package, config)? {
            misplaced_count = misplaced_count.saturating_add(1);
            println!(
                "MISPLACED  {}/{}  (expected under {}/)",
                package::package_name(package),
                relative.display(),
                rule.dir_name
            );
        }
    }

    if misplaced_count > 0 {
        println!();
        println!("{misplaced_count} misplaced");
        return Ok(ExitCode::from(1));
    }
    println!("All assets in place");
    return Ok(ExitCode::SUCCESS);
}

/// Files in `package` covered by a layout rule but outside its directory.
///
/// # Errors
///
/// Returns `Error::Walk` if the package cannot be traversed.
fn misplaced_assets<'c>(package: &Path, config: &'c Config) -> Result<Vec<(PathBuf, &'c DirRule)>, error::Error> {
    let mut misplaced = Vec::new();
    for entry in WalkDir::new(package).min_depth(1).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(rule) = config.rule_for(&entry.file_name().to_string_lossy()) else {
            continue;
        };
        let relative = entry.path().strip_prefix(package).unwrap_or(entry.path());
        let in_place = relative
            .parent()
            .and_then(|p| return p.components().next())
            .is_some_and(|c| return c.as_os_str().to_string_lossy().eq_ignore_ascii_case(&rule.dir_name));
        if !in_place {
            misplaced.push((relative.to_path_buf(), rule));
        }
    }
    return Ok(misplaced);
}

/// Print one line per finding plus a summary, for `check --format text`.
fn print_check_lines(reports: &[PackageReport], tally: &Tally) {
    for report in reports {
        let label = package::package_name(&report.package);
        if let Some(err) = &report.error {
            println!("ERROR       {label}  ({err})");
        }
        for chart in &report.charts {
            if let Some(err) = &chart.error {
                println!("ERROR       {label}/{}  ({err})", chart.chart.display());
            }
        }
        for (chart, check) in report.checks() {
            let location = format!("{label}/{}", chart.chart.display());
            match &check.outcome {
                Outcome::Repaired { new_value, old_value, .. } => {
                    println!("REPAIR      {location}  {} {old_value} -> {new_value}", check.key);
                },
                Outcome::Unchanged => {},
                Outcome::Unresolved { reason } => {
                    println!("UNRESOLVED  {location}  {} ({reason})", check.key);
                },
            }
        }
    }

    if tally.unresolved > 0 || tally.errors > 0 || tally.repaired > 0 {
        println!();
        println!(
            "{} repairable, {} unresolved, {} errors",
            tally.repaired, tally.unresolved, tally.errors
        );
    } else {
        println!("All references valid in {} packages", reports.len());
    }
    return;
}

/// Print a markdown summary of fix results.
fn print_fix_report(reports: &[PackageReport], tally: &Tally) {
    let renamed: Vec<(&PackageReport, &PathBuf)> = reports
        .iter()
        .filter_map(|r| return r.renamed_to.as_ref().map(|to| return (r, to)))
        .collect();

    if tally.repaired == 0 && tally.unresolved == 0 && tally.errors == 0 && renamed.is_empty() {
        eprintln!("All references valid, nothing to fix.");
        return;
    }

    if tally.repaired > 0 {
        eprintln!("## Repaired\n");
        for report in reports {
            let label = package::package_name(&report.package);
            for (chart, check) in report.checks() {
                let Outcome::Repaired { new_value, old_value, renamed_from } = &check.outcome else {
                    continue;
                };
                let via = renamed_from
                    .as_ref()
                    .map(|from| return format!(" (renamed from `{from}`)"))
                    .unwrap_or_default();
                eprintln!(
                    "- {label}/{}  `{}` `{old_value}` -> `{new_value}`{via}",
                    chart.chart.display(),
                    check.key
                );
            }
        }
        eprintln!();
    }

    if !renamed.is_empty() {
        eprintln!("## Renamed directories\n");
        for (report, to) in &renamed {
            eprintln!("- `{}` -> `{}`", package::package_name(&report.package), package::package_name(to));
        }
        eprintln!();
    }

    if tally.unresolved > 0 {
        eprintln!("## Unresolved\n");
        for report in reports {
            let label = package::package_name(&report.package);
            for (chart, check) in report.checks() {
                if let Outcome::Unresolved { reason } = &check.outcome {
                    eprintln!("- {label}/{}  `{}` ({reason})", chart.chart.display(), check.key);
                }
            }
        }
        eprintln!();
    }

    if tally.errors > 0 {
        eprintln!("## Errors\n");
        for report in reports {
            let label = package::package_name(&report.package);
            if let Some(err) = &report.error {
                eprintln!("- {label}: {err}");
            }
            for chart in &report.charts {
                if let Some(err) = &chart.error {
                    eprintln!("- {label}/{}: {err}", chart.chart.display());
                }
            }
        }
        eprintln!();
    }
    return;
}
