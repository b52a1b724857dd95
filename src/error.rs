/// Crate-level error types for dtxmend diagnostics.
use std::path::PathBuf;

/// All errors in dtxmend carry enough context to produce a useful diagnostic
/// without a debugger. Each variant names the file, key, or reason for failure.
#[allow(clippy::error_impl_error, reason = "crate-internal error type in binary")]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An explicitly requested config file does not exist on disk.
    #[error("config not found: {}", path.display())]
    ConfigNotFound {
        /// Path to the missing config file.
        path: PathBuf,
    },

    /// A descriptor file named by a set descriptor cannot be opened.
    #[error("descriptor not found: {}", path.display())]
    DescriptorNotFound {
        /// Path to the missing descriptor.
        path: PathBuf,
    },

    /// Underlying I/O error from the filesystem.
    #[error("io: {0}")]
    Io(
        /// The wrapped I/O error.
        #[from]
        std::io::Error,
    ),

    /// JSON report serialization failed.
    #[error("json serialize: {0}")]
    JsonSer(
        /// The wrapped serde_json error.
        #[from]
        serde_json::Error,
    ),

    /// `--song` named a package that is not under the songs directory.
    #[error("package not found: `{name}` in {}", songs_root.display())]
    PackageNotFound {
        /// Requested package directory name.
        name: String,
        /// Songs directory that was searched.
        songs_root: PathBuf,
    },

    /// A key-discovery pattern failed to compile.
    #[error("pattern: {0}")]
    Pattern(
        /// The wrapped regex error.
        #[from]
        regex::Error,
    ),

    /// A package directory has no recognizable set descriptor.
    #[error("no set descriptor in {}", package.display())]
    SetDescriptorAbsent {
        /// Package directory that was searched.
        package: PathBuf,
    },

    /// The configured songs directory does not exist or is not a directory.
    #[error("songs directory not found: {}", path.display())]
    SongsDirectoryNotFound {
        /// Configured songs directory.
        path: PathBuf,
    },

    /// TOML deserialization failed.
    #[error("toml deserialize: {0}")]
    TomlDe(
        /// The wrapped TOML deserialization error.
        #[from]
        toml::de::Error,
    ),

    /// No supported encoding decodes the descriptor into text containing `#TITLE`.
    #[error("undecodable descriptor: {}", path.display())]
    UndecodableContent {
        /// Descriptor whose bytes failed every candidate encoding.
        path: PathBuf,
    },

    /// A broken reference has no usable replacement on disk.
    #[error("unresolved reference: `{key}` -> `{value}` for song {song} ({reason})")]
    UnresolvedReference {
        /// Property key whose value is broken.
        key: String,
        /// Why no replacement was applied.
        reason: String,
        /// Song title (or package name) used in messages.
        song: String,
        /// The stale referenced filename.
        value: String,
    },

    /// Directory traversal failed at the walk root.
    #[error("walk: {0}")]
    Walk(
        /// The wrapped walkdir error.
        #[from]
        walkdir::Error,
    ),
}
