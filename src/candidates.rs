//! Replacement candidates for a broken reference, enumerated by extension.

use std::path::Path;

use walkdir::WalkDir;

use crate::types::Candidate;

/// List files below `root` whose names end with one of `extensions`.
///
/// Extensions compare ASCII case-insensitively (`.OGG` matches `.ogg`).
/// Recursive mode descends into every subdirectory as it is listed, so the
/// result keeps directory-enumeration order; callers index into it.
pub fn by_extension(root: &Path, extensions: &[&str], recursive: bool) -> Vec<Candidate> {
    let suffixes: Vec<String> = extensions
        .iter()
        .filter(|e| return !e.is_empty())
        .map(|e| return e.to_ascii_lowercase())
        .collect();
    if suffixes.is_empty() {
        return Vec::new();
    }

    let max_depth = if recursive { usize::MAX } else { 1 };
    let mut found = Vec::new();

    for entry in WalkDir::new(root).min_depth(1).max_depth(max_depth) {
        let Ok(entry) = entry else {
            continue;
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_ascii_lowercase();
        if !suffixes.iter().any(|s| return name.ends_with(s.as_str())) {
            continue;
        }
        let Ok(metadata) = entry.metadata() else {
            tracing::debug!(path = %entry.path().display(), "skipping candidate without metadata");
            continue;
        };
        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        found.push(Candidate {
            relative_path: relative.to_path_buf(),
            size_bytes: metadata.len(),
        });
    }

    return found;
}

/// Drop candidates whose relative path already appears in the descriptor text.
///
/// A plain substring test: a file some other property points at is not up
/// for grabs.
pub fn exclude_referenced(candidates: Vec<Candidate>, text: &str) -> Vec<Candidate> {
    return candidates
        .into_iter()
        .filter(|c| return !text.contains(c.display_path().as_str()))
        .collect();
}
