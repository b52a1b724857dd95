//! One song package end to end: set descriptor, every chart it lists, and the
//! optional rename of the package directory to the song title.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::config::Config;
use crate::document::DescriptorDocument;
use crate::encoding::MARKER;
use crate::error::Error;
use crate::parser;
use crate::reconcile::Reconciler;
use crate::types::{ChartReport, Mode, PackageReport};

/// Find the set descriptor in `package`, matching `set_file_name` ignoring ASCII case.
fn find_set_descriptor(package: &Path, set_file_name: &str) -> Option<PathBuf> {
    return WalkDir::new(package)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| return e.file_type().is_file())
        .find(|e| return e.file_name().to_string_lossy().eq_ignore_ascii_case(set_file_name))
        .map(walkdir::DirEntry::into_path);
}

/// Errors that skip one chart or package instead of ending the run.
const fn is_recoverable(err: &Error) -> bool {
    return matches!(
        err,
        Error::DescriptorNotFound { .. } | Error::SetDescriptorAbsent { .. } | Error::UndecodableContent { .. }
    );
}

/// Reconcile one package.
///
/// Missing or undecodable descriptors are logged and recorded in the report.
/// With `rename_dirs`, the package directory is renamed to its set title after
/// the charts are done (apply mode only).
///
/// # Errors
///
/// Returns `Error::Io` if a rename or write fails, or errors from the port.
/// A chart that was already repaired in memory is written back first.
pub fn process(
    package: &Path,
    config: &Config,
    reconciler: &mut Reconciler<'_>,
    rename_dirs: bool,
) -> Result<PackageReport, Error> {
    let mut report = PackageReport::new(package.to_path_buf());

    let Some(set_path) = find_set_descriptor(package, &config.set_file_name) else {
        let err = Error::SetDescriptorAbsent { package: package.to_path_buf() };
        tracing::error!("{err}");
        report.error = Some(err.to_string());
        return Ok(report);
    };
    let set = match DescriptorDocument::open(&set_path) {
        Err(e) if is_recoverable(&e) => {
            tracing::error!("{e}");
            report.error = Some(e.to_string());
            return Ok(report);
        },
        Err(e) => return Err(e),
        Ok(doc) => doc,
    };

    let title = set.value_of(MARKER).filter(|t| return !t.is_empty());
    let song = title.clone().unwrap_or_else(|| return package_name(package));
    report.title = title;

    for chart in parser::referenced_file_lines(set.text(), &config.chart_extension) {
        report.charts.push(process_chart(package, &chart, &song, reconciler)?);
        if reconciler.is_cancelled() {
            return Ok(report);
        }
    }

    if rename_dirs
        && reconciler.mode() == Mode::Apply
        && let Some(title) = &report.title
    {
        report.renamed_to = rename_to_title(package, title)?;
    }
    return Ok(report);
}

/// Open, reconcile, and write back one chart listed by the set descriptor.
///
/// # Errors
///
/// Returns fatal errors only; see [`process`].
fn process_chart(
    package: &Path,
    chart: &str,
    song: &str,
    reconciler: &mut Reconciler<'_>,
) -> Result<ChartReport, Error> {
    let path = package.join(chart);
    let mut doc = match DescriptorDocument::open(&path) {
        Err(e) if is_recoverable(&e) => {
            tracing::error!("{e}");
            return Ok(ChartReport::failed(PathBuf::from(chart), &e));
        },
        Err(e) => return Err(e),
        Ok(doc) => doc,
    };

    let apply = reconciler.mode() == Mode::Apply;
    let properties = match reconciler.reconcile_document(&mut doc, song) {
        Err(e) => {
            if apply && doc.is_dirty() {
                doc.persist()?;
            }
            return Err(e);
        },
        Ok(checks) => checks,
    };
    if apply && doc.is_dirty() {
        doc.persist()?;
    }

    return Ok(ChartReport {
        chart: PathBuf::from(chart),
        dirty: doc.is_dirty(),
        error: None,
        properties,
    });
}

/// Directory name of a package, for messages and report lines.
pub fn package_name(package: &Path) -> String {
    return package
        .file_name()
        .map_or_else(|| return package.display().to_string(), |n| return n.to_string_lossy().into_owned());
}

/// Rename `package` to `title` within the same parent directory.
///
/// Titles that cannot be a single directory name are skipped, as is a
/// destination that already exists. Returns the new path when renamed.
///
/// # Errors
///
/// Returns `Error::Io` if the rename itself fails.
fn rename_to_title(package: &Path, title: &str) -> Result<Option<PathBuf>, Error> {
    let title = title.trim();
    if package.file_name().is_some_and(|n| return n == title) {
        return Ok(None);
    }
    if title.is_empty() || title == "." || title == ".." || title.contains(['/', '\\']) {
        tracing::warn!(package = %package.display(), "title `{title}` is not a valid directory name");
        return Ok(None);
    }

    let target = package.with_file_name(title);
    if target.exists() {
        tracing::warn!(package = %package.display(), target = %target.display(), "rename target exists");
        return Ok(None);
    }

    std::fs::rename(package, &target)?;
    tracing::info!(from = %package.display(), to = %target.display(), "renamed song directory");
    return Ok(Some(target));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::KeepCurrent;
    use crate::types::Outcome;

    fn write(root: &Path, relative: &str, bytes: &[u8]) {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, bytes).unwrap();
    }

    fn run(package: &Path, mode: Mode, rename_dirs: bool) -> PackageReport {
        let mut port = KeepCurrent;
        let mut reconciler = Reconciler::new(&mut port, mode);
        return process(package, &Config::default(), &mut reconciler, rename_dirs).unwrap();
    }

    #[test]
    fn undecodable_chart_is_skipped_and_siblings_processed() {
        let songs = tempfile::TempDir::new().unwrap();
        let package = songs.path().join("Song");
        let garbage = b"no marker here \x81";
        write(&package, "SET.DEF", b"#TITLE: Song\r\n#L1FILE: bad.dtx\r\n#L2FILE: good.dtx\r\n");
        write(&package, "bad.dtx", garbage);
        write(&package, "good.dtx", b"#TITLE: Song\r\n#PREVIEW: pre.ogg\r\n");
        write(&package, "pre_old.ogg", b"ogg");

        let report = run(&package, Mode::Apply, false);

        assert_eq!(report.title.as_deref(), Some("Song"));
        assert_eq!(report.charts.len(), 2);
        let bad = &report.charts[0];
        assert_eq!(bad.chart, PathBuf::from("bad.dtx"));
        assert!(bad.error.as_deref().unwrap().contains("undecodable"));
        assert!(bad.properties.is_empty());
        assert_eq!(std::fs::read(package.join("bad.dtx")).unwrap(), garbage);

        let good = &report.charts[1];
        assert!(good.error.is_none());
        assert!(good.dirty);
        assert!(package.join("pre.ogg").exists());
        assert!(!package.join("pre_old.ogg").exists());
    }

    #[test]
    fn missing_set_descriptor_is_recorded() {
        let songs = tempfile::TempDir::new().unwrap();
        let package = songs.path().join("Song");
        write(&package, "chart.dtx", b"#TITLE: Song\n");

        let report = run(&package, Mode::Apply, false);

        assert!(report.error.as_deref().unwrap().contains("no set descriptor"));
        assert!(report.charts.is_empty());
    }

    #[test]
    fn missing_chart_is_recorded() {
        let songs = tempfile::TempDir::new().unwrap();
        let package = songs.path().join("Song");
        write(&package, "set.def", b"#TITLE: Song\n#L1FILE: gone.dtx\n");

        let report = run(&package, Mode::Apply, false);

        assert_eq!(report.charts.len(), 1);
        assert!(report.charts[0].error.as_deref().unwrap().contains("descriptor not found"));
    }

    #[test]
    fn dry_run_leaves_disk_untouched() {
        let songs = tempfile::TempDir::new().unwrap();
        let package = songs.path().join("Song");
        let chart = b"#TITLE: Song\n#PREIMAGE: jacket.png\n";
        write(&package, "set.def", b"#TITLE: Song\n#L1FILE: chart.dtx\n");
        write(&package, "chart.dtx", chart);
        write(&package, "art/jacket.png", b"png");

        let report = run(&package, Mode::DryRun, true);

        let (_, check) = report.checks().find(|(_, c)| return c.outcome.is_repaired()).unwrap();
        assert_eq!(
            check.outcome,
            Outcome::Repaired {
                new_value: "art/jacket.png".to_string(),
                old_value: "jacket.png".to_string(),
                renamed_from: None,
            }
        );
        assert_eq!(std::fs::read(package.join("chart.dtx")).unwrap(), chart);
        assert!(report.renamed_to.is_none());
        assert!(package.exists());
    }

    #[test]
    fn package_directory_is_renamed_to_title() {
        let songs = tempfile::TempDir::new().unwrap();
        let package = songs.path().join("0042");
        write(&package, "set.def", b"#TITLE: Night Drive\n");

        let report = run(&package, Mode::Apply, true);

        assert_eq!(report.renamed_to, Some(songs.path().join("Night Drive")));
        assert!(songs.path().join("Night Drive/set.def").exists());
        assert!(!package.exists());
    }

    #[test]
    fn unusable_titles_do_not_rename() {
        let songs = tempfile::TempDir::new().unwrap();
        let slash = songs.path().join("a");
        write(&slash, "set.def", b"#TITLE: AC/DC\n");
        let taken = songs.path().join("b");
        write(&taken, "set.def", b"#TITLE: a\n");

        assert!(run(&slash, Mode::Apply, true).renamed_to.is_none());
        assert!(run(&taken, Mode::Apply, true).renamed_to.is_none());
        assert!(slash.exists());
        assert!(taken.exists());
    }
}
