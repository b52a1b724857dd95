/// Core domain types for dtxmend candidates, outcomes, and reports.
use std::ops::Range;
use std::path::PathBuf;

use serde::Serialize;

/// Bytes per mebibyte, used for candidate size display.
const BYTES_PER_MIB: u64 = 1024 * 1024;

/// A file on disk considered as a replacement for a broken reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Candidate {
    /// Path relative to the directory that was searched.
    pub relative_path: PathBuf,
    /// File size in bytes.
    pub size_bytes: u64,
}

impl Candidate {
    /// The relative path as descriptor text.
    pub fn display_path(&self) -> String {
        return self.relative_path.to_string_lossy().into_owned();
    }

    /// Size in MiB rounded half-up to two decimals, e.g. `"3.42"`.
    pub fn size_mib(&self) -> String {
        let hundredths = self
            .size_bytes
            .saturating_mul(100)
            .saturating_add(BYTES_PER_MIB / 2)
            .checked_div(BYTES_PER_MIB)
            .unwrap_or(0);
        let whole = hundredths.checked_div(100).unwrap_or(0);
        let frac = hundredths.checked_rem(100).unwrap_or(0);
        return format!("{whole}.{frac:02}");
    }
}

/// Whether reconciliation may touch the filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Rename files and write patched descriptors.
    Apply,
    /// Patch in memory only; report what would change.
    DryRun,
}

/// Result of checking one reference property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    /// The reference now points at an existing file.
    Repaired {
        /// Value written into the descriptor.
        new_value: String,
        /// Value found in the descriptor before the repair.
        old_value: String,
        /// Candidate that was renamed to satisfy the reference, if any.
        renamed_from: Option<String>,
    },
    /// Nothing to do: no value, not a file reference, or the file exists.
    Unchanged,
    /// The reference is still broken.
    Unresolved {
        /// Why no repair was applied.
        reason: UnresolvedReason,
    },
}

impl Outcome {
    /// True when this outcome should mark the descriptor dirty.
    pub const fn is_repaired(&self) -> bool {
        return matches!(self, Outcome::Repaired { .. });
    }

    /// True when the reference is still broken.
    pub const fn is_unresolved(&self) -> bool {
        return matches!(self, Outcome::Unresolved { .. });
    }
}

/// Why a broken reference was left as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UnresolvedReason {
    /// Several candidates exist and nobody was asked (dry run).
    Ambiguous {
        /// Number of candidates found.
        candidates: usize,
    },
    /// The prompt reached end of input.
    Cancelled,
    /// The user chose to leave the reference unchanged.
    Declined,
    /// No file with a matching extension is left unreferenced.
    NoCandidates,
    /// The rename destination already exists.
    TargetOccupied,
    /// The replacement path cannot be written in the descriptor's encoding, or
    /// the current value borders a malformed byte sequence.
    Unencodable,
}

impl std::fmt::Display for UnresolvedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        return match self {
            UnresolvedReason::Ambiguous { candidates } => write!(f, "{candidates} candidates"),
            UnresolvedReason::Cancelled => f.write_str("prompt cancelled"),
            UnresolvedReason::Declined => f.write_str("left unchanged"),
            UnresolvedReason::NoCandidates => f.write_str("no candidates"),
            UnresolvedReason::TargetOccupied => f.write_str("rename target exists"),
            UnresolvedReason::Unencodable => f.write_str("value cannot be written in descriptor encoding"),
        };
    }
}

/// Located value of a property in descriptor text.
/// `span` always lies on char boundaries of the text it was read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyValue {
    /// Byte range of the trimmed value.
    pub span: Range<usize>,
    /// The trimmed value.
    pub value: String,
}

/// One property and what happened to it.
#[derive(Debug, Clone, Serialize)]
pub struct PropertyCheck {
    /// Property key as it appears in the descriptor, e.g. `#WAV01:`.
    pub key: String,
    /// Reconciliation result.
    #[serde(flatten)]
    pub outcome: Outcome,
}

/// Reconciliation result for one chart descriptor.
#[derive(Debug, Clone, Serialize)]
pub struct ChartReport {
    /// Chart descriptor path, relative to its package.
    pub chart: PathBuf,
    /// Whether any property was repaired.
    pub dirty: bool,
    /// Recoverable failure that skipped this chart.
    pub error: Option<String>,
    /// Checked properties in check order.
    pub properties: Vec<PropertyCheck>,
}

impl ChartReport {
    /// A chart that could not be opened or decoded.
    pub fn failed(chart: PathBuf, error: &crate::error::Error) -> Self {
        return Self {
            chart,
            dirty: false,
            error: Some(error.to_string()),
            properties: Vec::new(),
        };
    }
}

/// Reconciliation result for one song package.
#[derive(Debug, Clone, Serialize)]
pub struct PackageReport {
    /// Chart reports in set-descriptor order.
    pub charts: Vec<ChartReport>,
    /// Recoverable failure that skipped the whole package.
    pub error: Option<String>,
    /// Package directory.
    pub package: PathBuf,
    /// New directory after a title rename.
    pub renamed_to: Option<PathBuf>,
    /// Title from the set descriptor.
    pub title: Option<String>,
}

impl PackageReport {
    /// Empty report for a package that has not been processed yet.
    pub const fn new(package: PathBuf) -> Self {
        return Self {
            charts: Vec::new(),
            error: None,
            package,
            renamed_to: None,
            title: None,
        };
    }

    /// Every property check across all charts, with its chart.
    pub fn checks(&self) -> impl Iterator<Item = (&ChartReport, &PropertyCheck)> {
        return self
            .charts
            .iter()
            .flat_map(|c| return c.properties.iter().map(move |p| return (c, p)));
    }
}
