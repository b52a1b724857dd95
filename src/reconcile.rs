//! Reference reconciliation: detect a broken asset reference, find the file it
//! meant, and repair the reference (renaming the file when needed).
//!
//! Properties are handled one at a time and in order. A rename or patch made for
//! one property is visible to the next, because the candidate filter reads the
//! live descriptor text.

use std::path::{Path, PathBuf};

use crate::candidates;
use crate::document::DescriptorDocument;
use crate::error::Error;
use crate::locator;
use crate::parser;
use crate::prompt::{DisambiguationPort, Selection, SelectionRequest};
use crate::types::{Candidate, Mode, Outcome, PropertyCheck, UnresolvedReason};

/// Preview audio played on the song select screen.
pub const PREVIEW_KEY: &str = "#PREVIEW:";

/// Preview image shown on the song select screen.
pub const PREIMAGE_KEY: &str = "#PREIMAGE:";

/// Background video.
pub const VIDEO_KEY: &str = "#AVI01:";

/// Prefix shared by the numbered per-sample audio keys (`#WAV01:`, `#WAV1Z:` ...).
pub const SAMPLE_PREFIX: &str = "#WAV";

/// How a broken reference with several candidates was settled.
enum Resolution {
    /// Use this candidate.
    Adopt(Candidate),
    /// Leave the reference broken.
    GiveUp(UnresolvedReason),
}

/// Drives locating, filtering, and disambiguation for each reference property.
pub struct Reconciler<'p> {
    /// Set once the prompt reports end of input; no further prompts are made.
    cancelled: bool,
    /// Whether renames happen on disk.
    mode: Mode,
    /// Who decides between several candidates.
    port: &'p mut dyn DisambiguationPort,
}

impl<'p> Reconciler<'p> {
    /// Rename `chosen` to the referenced file name (keeping its directory) and
    /// point the property at it.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the rename fails.
    fn adopt_candidate(
        &self,
        doc: &mut DescriptorDocument,
        dir: &Path,
        key: &str,
        old_value: &str,
        chosen: &Candidate,
        song: &str,
    ) -> Result<Outcome, Error> {
        let new_relative = chosen.relative_path.with_file_name(locator::file_name_of(old_value));
        let new_value = new_relative.to_string_lossy().into_owned();
        if !doc.can_change_property(key, &new_value) {
            return Ok(unresolved(key, old_value, song, UnresolvedReason::Unencodable));
        }

        let from = dir.join(&chosen.relative_path);
        let to = dir.join(&new_relative);
        if to.exists() {
            return Ok(unresolved(key, old_value, song, UnresolvedReason::TargetOccupied));
        }

        if self.mode == Mode::Apply {
            std::fs::rename(&from, &to).inspect_err(|e| {
                tracing::error!(from = %from.display(), to = %to.display(), "rename failed: {e}");
            })?;
            tracing::info!(from = %from.display(), to = %to.display(), "renamed candidate for {key}");
        }
        doc.change_property(key, &new_value);

        return Ok(Outcome::Repaired {
            new_value,
            old_value: old_value.to_string(),
            renamed_from: Some(chosen.display_path()),
        });
    }

    /// Ask the port to settle between several candidates.
    ///
    /// # Errors
    ///
    /// Returns errors from the port itself.
    fn choose(
        &mut self,
        key: &str,
        current_value: &str,
        song: &str,
        candidates: &[Candidate],
    ) -> Result<Resolution, Error> {
        if self.mode == Mode::DryRun {
            return Ok(Resolution::GiveUp(UnresolvedReason::Ambiguous { candidates: candidates.len() }));
        }
        if self.cancelled {
            return Ok(Resolution::GiveUp(UnresolvedReason::Cancelled));
        }

        let request = SelectionRequest { candidates, current_value, key, song };
        return match self.port.select(&request)? {
            Selection::Cancelled => {
                self.cancelled = true;
                tracing::warn!("prompt closed; remaining ambiguous references stay unchanged");
                Ok(Resolution::GiveUp(UnresolvedReason::Cancelled))
            },
            Selection::Chosen(index) => Ok(candidates
                .get(index)
                .cloned()
                .map_or(Resolution::GiveUp(UnresolvedReason::Declined), Resolution::Adopt)),
            Selection::KeepCurrent => Ok(Resolution::GiveUp(UnresolvedReason::Declined)),
        };
    }

    /// True once the prompt has been closed during this run.
    pub const fn is_cancelled(&self) -> bool {
        return self.cancelled;
    }

    pub const fn mode(&self) -> Mode {
        return self.mode;
    }

    pub fn new(port: &'p mut dyn DisambiguationPort, mode: Mode) -> Self {
        return Self { cancelled: false, mode, port };
    }

    /// Check every reference property of a chart descriptor.
    ///
    /// Fixed keys come first, then every `#WAV` key found in the text. The
    /// document is marked dirty when any property is repaired.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if a rename fails, or errors from the port.
    pub fn reconcile_document(
        &mut self,
        doc: &mut DescriptorDocument,
        song: &str,
    ) -> Result<Vec<PropertyCheck>, Error> {
        let dir = descriptor_dir(doc.path());
        let mut keys: Vec<String> = [PREVIEW_KEY, PREIMAGE_KEY, VIDEO_KEY]
            .into_iter()
            .map(String::from)
            .collect();
        keys.extend(parser::keys_with_prefix(doc.text(), SAMPLE_PREFIX)?);

        let mut checks = Vec::with_capacity(keys.len());
        for key in keys {
            let outcome = self.reconcile_property(doc, &dir, &key, song)?;
            if outcome.is_repaired() {
                doc.mark_dirty();
            }
            checks.push(PropertyCheck { key, outcome });
        }
        return Ok(checks);
    }

    /// Check one property and repair it if it is broken.
    ///
    /// An exact-name match anywhere below `dir` is preferred because it keeps
    /// the original file untouched. Only when that fails are same-extension
    /// files considered.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if a rename fails, or errors from the port.
    pub fn reconcile_property(
        &mut self,
        doc: &mut DescriptorDocument,
        dir: &Path,
        key: &str,
        song: &str,
    ) -> Result<Outcome, Error> {
        let Some(value) = doc.value_of(key).filter(|v| return !v.is_empty()) else {
            return Ok(Outcome::Unchanged);
        };
        let Some(extension) = extension_of(&value) else {
            tracing::debug!(key, value, "value is not a file reference");
            return Ok(Outcome::Unchanged);
        };
        if dir.join(&value).exists() {
            return Ok(Outcome::Unchanged);
        }

        if let Some(found) = locator::find(&value, dir) {
            let new_value = found.to_string_lossy().into_owned();
            if !doc.can_change_property(key, &new_value) {
                return Ok(unresolved(key, &value, song, UnresolvedReason::Unencodable));
            }
            doc.change_property(key, &new_value);
            tracing::info!(key, song, "relinked `{value}` to `{new_value}`");
            return Ok(Outcome::Repaired { new_value, old_value: value, renamed_from: None });
        }

        let found = candidates::by_extension(dir, &[extension.as_str()], true);
        let candidates = candidates::exclude_referenced(found, doc.text());
        let resolution = match candidates.as_slice() {
            [] => Resolution::GiveUp(UnresolvedReason::NoCandidates),
            [only] => Resolution::Adopt(only.clone()),
            many => self.choose(key, &value, song, many)?,
        };

        return match resolution {
            Resolution::Adopt(chosen) => self.adopt_candidate(doc, dir, key, &value, &chosen, song),
            Resolution::GiveUp(reason) => Ok(unresolved(key, &value, song, reason)),
        };
    }
}

/// Directory a descriptor's references are relative to.
fn descriptor_dir(path: &Path) -> PathBuf {
    return match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
}

/// Dotted extension of a referenced file name, e.g. `.ogg`.
fn extension_of(value: &str) -> Option<String> {
    let extension = Path::new(locator::file_name_of(value)).extension()?;
    return Some(format!(".{}", extension.to_string_lossy()));
}

/// Log a reference that stays broken and build its outcome.
fn unresolved(key: &str, value: &str, song: &str, reason: UnresolvedReason) -> Outcome {
    let err = Error::UnresolvedReference {
        key: key.to_string(),
        reason: reason.to_string(),
        song: song.to_string(),
        value: value.to_string(),
    };
    tracing::warn!("{err}");
    return Outcome::Unresolved { reason };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::DescriptorEncoding;

    /// Port that replays scripted answers and records what it was shown.
    #[derive(Default)]
    struct ScriptedPort {
        answers: Vec<Selection>,
        seen: Vec<Vec<PathBuf>>,
    }

    impl DisambiguationPort for ScriptedPort {
        fn select(&mut self, request: &SelectionRequest<'_>) -> Result<Selection, Error> {
            self.seen
                .push(request.candidates.iter().map(|c| return c.relative_path.clone()).collect());
            if self.answers.is_empty() {
                return Ok(Selection::Cancelled);
            }
            return Ok(self.answers.remove(0));
        }
    }

    struct Fixture {
        dir: tempfile::TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            return Self { dir: tempfile::TempDir::new().unwrap() };
        }

        fn file(&self, relative: &str, len: usize) -> &Self {
            let path = self.dir.path().join(relative);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, vec![1_u8; len]).unwrap();
            return self;
        }

        fn doc(&self, text: &str) -> DescriptorDocument {
            return DescriptorDocument::from_text(
                self.dir.path().join("chart.dtx"),
                text,
                DescriptorEncoding::ShiftJis,
            );
        }

        fn exists(&self, relative: &str) -> bool {
            return self.dir.path().join(relative).exists();
        }

        fn listing(&self) -> Vec<PathBuf> {
            let mut out: Vec<PathBuf> = walkdir::WalkDir::new(self.dir.path())
                .into_iter()
                .filter_map(Result::ok)
                .map(|e| return e.path().strip_prefix(self.dir.path()).unwrap().to_path_buf())
                .collect();
            out.sort();
            return out;
        }
    }

    fn run(doc: &mut DescriptorDocument, port: &mut ScriptedPort, mode: Mode) -> Vec<PropertyCheck> {
        let mut reconciler = Reconciler::new(port, mode);
        return reconciler.reconcile_document(doc, "Song").unwrap();
    }

    fn outcome_of<'a>(checks: &'a [PropertyCheck], key: &str) -> &'a Outcome {
        return &checks.iter().find(|c| return c.key == key).unwrap().outcome;
    }

    #[test]
    fn single_candidate_is_renamed_to_referenced_name() {
        let fx = Fixture::new();
        fx.file("preview_old.ogg", 10);
        let mut doc = fx.doc("#TITLE: Song\n#PREVIEW: preview.ogg\n");
        let mut port = ScriptedPort::default();

        let checks = run(&mut doc, &mut port, Mode::Apply);

        assert!(fx.exists("preview.ogg"));
        assert!(!fx.exists("preview_old.ogg"));
        assert_eq!(doc.value_of(PREVIEW_KEY).as_deref(), Some("preview.ogg"));
        assert!(doc.is_dirty());
        assert!(port.seen.is_empty());
        assert_eq!(
            outcome_of(&checks, PREVIEW_KEY),
            &Outcome::Repaired {
                new_value: "preview.ogg".to_string(),
                old_value: "preview.ogg".to_string(),
                renamed_from: Some("preview_old.ogg".to_string()),
            }
        );
    }

    #[test]
    fn keeping_current_value_changes_nothing() {
        let fx = Fixture::new();
        fx.file("intro.avi", 10).file("loop.avi", 20);
        let text = "#TITLE: Song\r\n#AVI01: bg.avi\r\n";
        let mut doc = fx.doc(text);
        let before = fx.listing();
        let mut port = ScriptedPort { answers: vec![Selection::KeepCurrent], ..Default::default() };

        let checks = run(&mut doc, &mut port, Mode::Apply);

        assert_eq!(port.seen.len(), 1);
        assert_eq!(port.seen[0].len(), 2);
        assert_eq!(doc.text(), text);
        assert_eq!(fx.listing(), before);
        assert!(!doc.is_dirty());
        assert_eq!(
            outcome_of(&checks, VIDEO_KEY),
            &Outcome::Unresolved { reason: UnresolvedReason::Declined }
        );
    }

    #[test]
    fn chosen_candidate_is_renamed() {
        let fx = Fixture::new();
        fx.file("intro.avi", 10).file("movie/loop.avi", 20);
        let mut doc = fx.doc("#TITLE: Song\n#AVI01: bg.avi\n");
        let dir = fx.dir.path().to_path_buf();

        // Pick whichever candidate lives in the subdirectory.
        let index = candidates::by_extension(&dir, &[".avi"], true)
            .iter()
            .position(|c| return c.relative_path == Path::new("movie/loop.avi"))
            .unwrap();
        let mut port = ScriptedPort { answers: vec![Selection::Chosen(index)], ..Default::default() };
        let mut reconciler = Reconciler::new(&mut port, Mode::Apply);

        let outcome = reconciler.reconcile_property(&mut doc, &dir, VIDEO_KEY, "Song").unwrap();

        assert!(outcome.is_repaired());
        assert!(fx.exists("movie/bg.avi"));
        assert!(!fx.exists("movie/loop.avi"));
        assert!(fx.exists("intro.avi"));
        assert_eq!(doc.value_of(VIDEO_KEY).as_deref(), Some("movie/bg.avi"));
    }

    #[test]
    fn occupied_target_is_never_overwritten() {
        let fx = Fixture::new();
        fx.file("movie/clip.avi", 5);
        std::fs::create_dir(fx.dir.path().join("movie/bg.avi")).unwrap();
        let mut doc = fx.doc("#TITLE: Song\n#AVI01: bg.avi\n");
        let dir = fx.dir.path().to_path_buf();
        let mut port = ScriptedPort::default();
        let mut reconciler = Reconciler::new(&mut port, Mode::Apply);

        let outcome = reconciler.reconcile_property(&mut doc, &dir, VIDEO_KEY, "Song").unwrap();

        assert_eq!(outcome, Outcome::Unresolved { reason: UnresolvedReason::TargetOccupied });
        assert!(fx.exists("movie/clip.avi"));
        assert!(!doc.is_dirty());
    }

    #[test]
    fn relocated_file_is_relinked_without_rename() {
        let fx = Fixture::new();
        fx.file("sounds/kick.wav", 10).file("decoy.wav", 10);
        let mut doc = fx.doc("#TITLE: Song\n#WAV01: kick.wav\n");
        let mut port = ScriptedPort::default();

        let checks = run(&mut doc, &mut port, Mode::Apply);

        assert!(fx.exists("sounds/kick.wav"));
        assert!(fx.exists("decoy.wav"));
        assert!(port.seen.is_empty());
        assert_eq!(doc.value_of("#WAV01:").as_deref(), Some("sounds/kick.wav"));
        assert_eq!(
            outcome_of(&checks, "#WAV01:"),
            &Outcome::Repaired {
                new_value: "sounds/kick.wav".to_string(),
                old_value: "kick.wav".to_string(),
                renamed_from: None,
            }
        );
    }

    #[test]
    fn no_candidates_is_unresolved() {
        let fx = Fixture::new();
        fx.file("cover.png", 1);
        let mut doc = fx.doc("#TITLE: Song\n#PREIMAGE: jacket.jpg\n");
        let checks = run(&mut doc, &mut ScriptedPort::default(), Mode::Apply);
        assert_eq!(
            outcome_of(&checks, PREIMAGE_KEY),
            &Outcome::Unresolved { reason: UnresolvedReason::NoCandidates }
        );
        assert!(!doc.is_dirty());
    }

    #[test]
    fn existing_and_non_file_values_are_unchanged() {
        let fx = Fixture::new();
        fx.file("a.wav", 1).file("b.wav", 1);
        let mut doc = fx.doc("#TITLE: Song\n#WAV01: a.wav\n#WAVVOL01 100\n#PREVIEW:\n");
        let checks = run(&mut doc, &mut ScriptedPort::default(), Mode::Apply);
        assert!(checks.iter().all(|c| return c.outcome == Outcome::Unchanged));
        assert_eq!(checks.len(), 5);
    }

    #[test]
    fn already_referenced_files_are_not_candidates() {
        let fx = Fixture::new();
        fx.file("kick.wav", 1).file("snare_v2.wav", 1);
        let mut doc = fx.doc("#TITLE: Song\n#WAV01: kick.wav\n#WAV02: snare.wav\n");
        let mut port = ScriptedPort::default();

        run(&mut doc, &mut port, Mode::Apply);

        // kick.wav is referenced, so snare_v2.wav is the only candidate.
        assert!(port.seen.is_empty());
        assert!(fx.exists("snare.wav"));
        assert!(fx.exists("kick.wav"));
        assert_eq!(doc.value_of("#WAV02:").as_deref(), Some("snare.wav"));
    }

    #[test]
    fn earlier_repair_narrows_later_candidates() {
        let fx = Fixture::new();
        fx.file("sub/one.wav", 1).file("two.wav", 1);
        // #WAV01 is relinked to sub/one.wav first, which removes it from
        // the candidates for #WAV02.
        let mut doc = fx.doc("#TITLE: Song\n#WAV01: one.wav\n#WAV02: gone.wav\n");
        let mut port = ScriptedPort::default();

        run(&mut doc, &mut port, Mode::Apply);

        assert!(port.seen.is_empty());
        assert_eq!(doc.value_of("#WAV01:").as_deref(), Some("sub/one.wav"));
        assert!(fx.exists("gone.wav"));
    }

    #[test]
    fn dry_run_reports_without_touching_disk() {
        let fx = Fixture::new();
        fx.file("old.ogg", 1).file("a.avi", 1).file("b.avi", 1);
        let mut doc = fx.doc("#TITLE: Song\n#PREVIEW: new.ogg\n#AVI01: bg.avi\n");
        let before = fx.listing();
        let mut port = ScriptedPort::default();

        let checks = run(&mut doc, &mut port, Mode::DryRun);

        assert_eq!(fx.listing(), before);
        assert!(port.seen.is_empty());
        assert!(outcome_of(&checks, PREVIEW_KEY).is_repaired());
        assert_eq!(
            outcome_of(&checks, VIDEO_KEY),
            &Outcome::Unresolved { reason: UnresolvedReason::Ambiguous { candidates: 2 } }
        );
    }

    #[test]
    fn cancelled_prompt_is_not_asked_again() {
        let fx = Fixture::new();
        fx.file("a.wav", 1).file("b.wav", 1);
        let mut doc = fx.doc("#TITLE: Song\n#WAV01: x.wav\n#WAV02: y.wav\n");
        let mut port = ScriptedPort::default();
        let mut reconciler = Reconciler::new(&mut port, Mode::Apply);

        let checks = reconciler.reconcile_document(&mut doc, "Song").unwrap();

        assert!(reconciler.is_cancelled());
        drop(reconciler);
        assert_eq!(port.seen.len(), 1);
        let cancelled = Outcome::Unresolved { reason: UnresolvedReason::Cancelled };
        assert_eq!(outcome_of(&checks, "#WAV01:"), &cancelled);
        assert_eq!(outcome_of(&checks, "#WAV02:"), &cancelled);
    }

    #[test]
    fn windows_separators_in_value_still_resolve() {
        let fx = Fixture::new();
        fx.file("snd/hat.wav", 1);
        let mut doc = fx.doc("#TITLE: Song\n#WAV03: old\\hat.wav\n");
        run(&mut doc, &mut ScriptedPort::default(), Mode::Apply);
        assert_eq!(doc.value_of("#WAV03:").as_deref(), Some("snd/hat.wav"));
    }
}
