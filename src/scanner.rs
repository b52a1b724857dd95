use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::Error;

/// List the song packages under `songs_root`: its immediate subdirectories,
/// sorted by name so runs are repeatable.
///
/// # Errors
///
/// Returns `Error::SongsDirectoryNotFound` if `songs_root` is not a directory,
/// or `Error::Walk` if it cannot be listed.
pub fn discover_packages(songs_root: &Path) -> Result<Vec<PathBuf>, Error> {
    if !songs_root.is_dir() {
        return Err(Error::SongsDirectoryNotFound { path: songs_root.to_path_buf() });
    }

    let mut packages = Vec::new();
    for entry in WalkDir::new(songs_root)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry?;
        if entry.file_type().is_dir() {
            packages.push(entry.into_path());
        }
    }

    tracing::debug!(root = %songs_root.display(), count = packages.len(), "discovered packages");
    return Ok(packages);
}

/// Select the package directory called `name` under `songs_root`.
///
/// # Errors
///
/// Returns `Error::SongsDirectoryNotFound` if `songs_root` is not a directory,
/// or `Error::PackageNotFound` if no such package exists.
pub fn find_package(songs_root: &Path, name: &str) -> Result<PathBuf, Error> {
    if !songs_root.is_dir() {
        return Err(Error::SongsDirectoryNotFound { path: songs_root.to_path_buf() });
    }

    let candidate = songs_root.join(name);
    let is_child = candidate.parent() == Some(songs_root);
    if !is_child || !candidate.is_dir() {
        return Err(Error::PackageNotFound {
            name: name.to_string(),
            songs_root: songs_root.to_path_buf(),
        });
    }
    return Ok(candidate);
}

/// Packages a command operates on: the one named by `--song`, or all of them.
///
/// # Errors
///
/// See [`discover_packages`] and [`find_package`].
pub fn select_packages(songs_root: &Path, song: Option<&str>) -> Result<Vec<PathBuf>, Error> {
    return match song {
        None => discover_packages(songs_root),
        Some(name) => Ok(vec![find_package(songs_root, name)?]),
    };
}
