//! Exact-name file search below a directory.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// File-name component of a referenced path, accepting either separator.
/// Descriptors authored on Windows use `\` even when read elsewhere.
pub fn file_name_of(reference: &str) -> &str {
    return reference.rsplit(['/', '\\']).next().unwrap_or(reference).trim();
}

/// Find a file named like `target` anywhere below `root`.
///
/// Depth-first, in the platform's directory-listing order; the first match
/// wins, which is not necessarily the "best" one. Names are compared
/// case-sensitively after trimming. The result is relative to `root`.
/// Unreadable subtrees are skipped.
pub fn find(target: &str, root: &Path) -> Option<PathBuf> {
    let wanted = file_name_of(target);
    if wanted.is_empty() {
        return None;
    }

    for entry in WalkDir::new(root).min_depth(1) {
        let entry = match entry {
            Err(e) => {
                tracing::debug!(root = %root.display(), "skipping unreadable entry: {e}");
                continue;
            },
            Ok(entry) => entry,
        };
        if !entry.file_type().is_file() {
            continue;
        }
        if entry.file_name().to_string_lossy().trim() != wanted {
            continue;
        }
        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        return Some(relative.to_path_buf());
    }

    return None;
}
