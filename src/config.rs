use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::Error;

/// Config file looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "dtxmend.toml";

/// Run configuration loaded from `dtxmend.toml`.
/// Every key is optional; relative paths resolve against the working directory.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Extension that marks chart lines in a set descriptor.
    pub chart_extension: String,
    /// Where each kind of asset is expected to live inside a package.
    pub dir_structure: Vec<DirRule>,
    /// Append-only run log.
    pub log_file: PathBuf,
    /// Rename package directories to their set title during `fix`.
    pub rename_song_dirs: bool,
    /// Set descriptor file name, matched ignoring ASCII case.
    pub set_file_name: String,
    /// Directory holding one subdirectory per song package.
    pub songs_directory: PathBuf,
}

impl Config {
    /// Load config from `explicit`, or from `dtxmend.toml` in the working
    /// directory when no path is given.
    ///
    /// A missing default file yields the defaults. A file that exists but is
    /// malformed is an error; it never silently falls back.
    ///
    /// # Errors
    ///
    /// Returns `Error::ConfigNotFound` if `explicit` does not exist,
    /// `Error::Io` if reading fails, or `Error::TomlDe` if the TOML is malformed.
    pub fn load(explicit: Option<&Path>) -> Result<Self, Error> {
        let path = explicit.unwrap_or(Path::new(DEFAULT_CONFIG_FILE));
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if explicit.is_some() {
                    return Err(Error::ConfigNotFound { path: path.to_path_buf() });
                }
                return Ok(Self::default());
            },
            Err(e) => return Err(Error::Io(e)),
        };

        let config: Self = toml::from_str(&content)?;
        tracing::debug!(path = %path.display(), "loaded config");
        return Ok(config);
    }

    /// The layout rule whose extension list covers `file_name`, if any.
    pub fn rule_for(&self, file_name: &str) -> Option<&DirRule> {
        let lower = file_name.to_ascii_lowercase();
        return self.dir_structure.iter().find(|rule| {
            return rule
                .extensions
                .iter()
                .any(|e| return !e.is_empty() && lower.ends_with(&e.to_ascii_lowercase()));
        });
    }

    /// Replace the songs directory, e.g. from `--songs`.
    #[must_use]
    pub fn with_songs_directory(self, songs_directory: Option<PathBuf>) -> Self {
        return match songs_directory {
            None => self,
            Some(dir) => Self { songs_directory: dir, ..self },
        };
    }
}

impl Default for Config {
    fn default() -> Self {
        return Self {
            chart_extension: ".dtx".to_string(),
            dir_structure: Vec::new(),
            log_file: PathBuf::from("dtxmend.log"),
            rename_song_dirs: false,
            set_file_name: "set.def".to_string(),
            songs_directory: PathBuf::from("."),
        };
    }
}

/// Expected subdirectory for assets with the given extensions.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DirRule {
    /// Subdirectory of the package, e.g. `sounds`.
    pub dir_name: String,
    /// Dotted extensions, e.g. `[".wav", ".ogg"]`.
    pub extensions: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(content: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, content).unwrap();
        return (dir, path);
    }

    #[test]
    fn explicit_file_overrides_defaults() {
        let (_dir, path) = write_config(
            r#"
songs_directory = "/games/dtx/songs"
rename_song_dirs = true

[[dir_structure]]
dir_name = "sounds"
extensions = [".wav", ".ogg"]
"#,
        );
        let config = Config::load(Some(&path)).unwrap();

        assert_eq!(config.songs_directory, PathBuf::from("/games/dtx/songs"));
        assert!(config.rename_song_dirs);
        assert_eq!(config.set_file_name, "set.def");
        assert_eq!(config.chart_extension, ".dtx");
        assert_eq!(config.dir_structure.len(), 1);
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nope.toml");
        let err = Config::load(Some(&path)).unwrap_err();
        assert!(matches!(err, Error::ConfigNotFound { .. }));
    }

    #[test]
    fn malformed_file_is_an_error() {
        let (_dir, path) = write_config("songs_directory = [");
        assert!(matches!(Config::load(Some(&path)), Err(Error::TomlDe(_))));

        let (_dir, path) = write_config("song_directory = \"typo\"");
        assert!(matches!(Config::load(Some(&path)), Err(Error::TomlDe(_))));
    }

    #[test]
    fn songs_flag_overrides_file() {
        let config = Config::default().with_songs_directory(Some(PathBuf::from("other")));
        assert_eq!(config.songs_directory, PathBuf::from("other"));
        let config = Config::default().with_songs_directory(None);
        assert_eq!(config.songs_directory, PathBuf::from("."));
    }

    #[test]
    fn rule_lookup_ignores_case() {
        let config = Config {
            dir_structure: vec![
                DirRule { dir_name: "sounds".into(), extensions: vec![".wav".into(), ".ogg".into()] },
                DirRule { dir_name: "movies".into(), extensions: vec![".avi".into()] },
            ],
            ..Config::default()
        };
        assert_eq!(config.rule_for("KICK.WAV").map(|r| r.dir_name.as_str()), Some("sounds"));
        assert_eq!(config.rule_for("bg.avi").map(|r| r.dir_name.as_str()), Some("movies"));
        assert_eq!(config.rule_for("chart.dtx"), None);
    }
}
