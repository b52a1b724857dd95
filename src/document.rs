//! In-memory descriptor with span-based patching and write-back.
//!
//! The source bytes are the document. Patches splice the encoded new value
//! into them, so everything outside a patched value is written back exactly as
//! it was read, including sequences the encoder could not reproduce.

use std::path::{Path, PathBuf};

use crate::encoding::{self, Decoded, DescriptorEncoding};
use crate::error::Error;
use crate::parser;
use crate::types::PropertyValue;

/// One descriptor file. Owns its bytes exclusively; lookups always re-scan the
/// live text so a value can be read back right after a patch.
#[derive(Debug)]
pub struct DescriptorDocument {
    /// File contents as they will be written back.
    bytes: Vec<u8>,
    /// Decoding of `bytes`, refreshed after every patch.
    decoded: Decoded,
    /// Whether the document must be written back.
    dirty: bool,
    /// File the document was read from and will be written to.
    path: PathBuf,
}

impl DescriptorDocument {
    /// Whether `key` can be set to `new_value` by splicing its byte span.
    ///
    /// False when the encoding cannot represent `new_value`, when the key is
    /// absent, or when the current value borders a malformed sequence so its
    /// bytes cannot be isolated.
    pub fn can_change_property(&self, key: &str, new_value: &str) -> bool {
        if !self.decoded.encoding.can_encode(new_value) {
            return false;
        }
        return self
            .locate(key)
            .is_some_and(|found| return self.decoded.byte_span(&found.span).is_some());
    }

    /// Replace the current value of `key` with `new_value`.
    ///
    /// Only the bytes of the located value are replaced, so an identical
    /// string elsewhere in the document is never touched. Returns `false` (and
    /// changes nothing) if the key is not present or its value cannot be
    /// isolated in the source bytes.
    pub fn change_property(&mut self, key: &str, new_value: &str) -> bool {
        let Some(found) = self.locate(key) else {
            return false;
        };
        if found.value != new_value {
            let Some(span) = self.decoded.byte_span(&found.span) else {
                tracing::warn!(path = %self.path.display(), key, "value borders a malformed sequence; left unchanged");
                return false;
            };
            let (Some(before), Some(after)) = (self.bytes.get(..span.start), self.bytes.get(span.end..)) else {
                return false;
            };
            let encoding = self.decoded.encoding;
            self.bytes = [before, encoding.encode(new_value).as_slice(), after].concat();
            self.decoded = encoding.decode_tracked(&self.bytes);
        }
        self.dirty = true;
        return true;
    }

    /// Build a document from text, encoding it as `encoding` would on disk.
    #[cfg(test)]
    pub fn from_text(path: PathBuf, text: &str, encoding: DescriptorEncoding) -> Self {
        let bytes = encoding.encode(text);
        let decoded = encoding.decode_tracked(&bytes);
        return Self { bytes, decoded, dirty: false, path };
    }

    pub const fn is_dirty(&self) -> bool {
        return self.dirty;
    }

    /// Locate `key`, trying `key:` first when the caller omitted the colon.
    fn locate(&self, key: &str) -> Option<PropertyValue> {
        if !key.ends_with(':') {
            let with_colon = format!("{key}:");
            if let Some(found) = parser::value_of(&self.decoded.text, &with_colon) {
                return Some(found);
            }
        }
        return parser::value_of(&self.decoded.text, key);
    }

    /// Flag the document for write-back without changing its text.
    /// A rename that lands on the referenced name needs no text edit.
    pub const fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Read and decode a descriptor from disk.
    ///
    /// # Errors
    ///
    /// Returns `Error::DescriptorNotFound` if the file does not exist,
    /// `Error::Io` for other read failures, or `Error::UndecodableContent`
    /// if no supported encoding validates.
    pub fn open(path: &Path) -> Result<Self, Error> {
        let bytes = match std::fs::read(path) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::DescriptorNotFound { path: path.to_path_buf() });
            },
            Err(e) => return Err(Error::Io(e)),
            Ok(b) => b,
        };
        let decoded = encoding::decode(&bytes, path)?;
        if decoded.had_errors {
            tracing::warn!(path = %path.display(), encoding = %decoded.encoding, "malformed sequences read as U+FFFD");
        } else {
            tracing::debug!(path = %path.display(), encoding = %decoded.encoding, "decoded descriptor");
        }
        return Ok(Self { bytes, decoded, dirty: false, path: path.to_path_buf() });
    }

    pub fn path(&self) -> &Path {
        return &self.path;
    }

    /// Overwrite the original file with the current bytes.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the file cannot be written.
    pub fn persist(&self) -> Result<(), Error> {
        std::fs::write(&self.path, &self.bytes)?;
        tracing::info!(path = %self.path.display(), encoding = %self.decoded.encoding, "wrote descriptor");
        return Ok(());
    }

    pub fn text(&self) -> &str {
        return &self.decoded.text;
    }

    /// Current value of `key`, if present.
    pub fn value_of(&self, key: &str) -> Option<String> {
        return self.locate(key).map(|found| return found.value);
    }
}
