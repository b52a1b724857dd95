//! Descriptor byte encodings: tolerant decoding with a byte-offset map.

use std::ops::Range;
use std::path::Path;

use encoding_rs::{CoderResult, Decoder, SHIFT_JIS, UTF_16LE};
use serde::Serialize;

use crate::error::Error;

/// Key every valid descriptor contains; used to validate a decode.
pub const MARKER: &str = "#TITLE";

/// Candidate encodings, tried in this order. First success wins.
const CANDIDATES: [DescriptorEncoding; 2] = [DescriptorEncoding::ShiftJis, DescriptorEncoding::Utf16Le];

/// Text decoded from descriptor bytes, with enough bookkeeping to map text
/// positions back to the bytes they came from.
#[derive(Debug, Clone)]
pub struct Decoded {
    /// Encoding that validated.
    pub encoding: DescriptorEncoding,
    /// Whether some byte sequences were malformed and decoded as U+FFFD.
    pub had_errors: bool,
    /// `offsets[i]` is the text length produced once the first `i` bytes are
    /// fed to the decoder. Non-decreasing, one entry per byte plus one.
    offsets: Vec<usize>,
    /// Decoded text, BOM preserved as U+FEFF if present.
    pub text: String,
}

impl Decoded {
    /// Source byte range that decoded to exactly `span` of the text.
    ///
    /// `None` when either end of `span` falls inside a single decoder step.
    /// That only happens beside a malformed sequence, where the replacement
    /// character and the byte after it come out together.
    pub fn byte_span(&self, span: &Range<usize>) -> Option<Range<usize>> {
        let start = self.offsets.partition_point(|&len| return len < span.start);
        let end = self.offsets.partition_point(|&len| return len < span.end);
        let aligned = self.offsets.get(start) == Some(&span.start) && self.offsets.get(end) == Some(&span.end);
        return aligned.then_some(start..end);
    }
}

/// Byte encodings a descriptor may be authored in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DescriptorEncoding {
    /// Shift_JIS (Windows-31J superset), the usual authoring encoding.
    ShiftJis,
    /// UTF-16 little-endian, written by some newer editors.
    Utf16Le,
}

impl DescriptorEncoding {
    /// Whether `text` can be written in this encoding without substitution.
    pub fn can_encode(self, text: &str) -> bool {
        return match self {
            DescriptorEncoding::ShiftJis => !SHIFT_JIS.encode(text).2,
            DescriptorEncoding::Utf16Le => true,
        };
    }

    /// Decode without BOM sniffing, replacing malformed sequences with U+FFFD.
    ///
    /// Bytes are fed one at a time so the offset map records where every
    /// character ends in the source.
    pub fn decode_tracked(self, bytes: &[u8]) -> Decoded {
        let mut decoder = match self {
            DescriptorEncoding::ShiftJis => SHIFT_JIS.new_decoder_without_bom_handling(),
            DescriptorEncoding::Utf16Le => UTF_16LE.new_decoder_without_bom_handling(),
        };
        let mut text = String::with_capacity(bytes.len());
        let mut offsets = Vec::with_capacity(bytes.len().saturating_add(1));
        let mut had_errors = false;

        offsets.push(0);
        for byte in bytes.chunks(1) {
            had_errors |= decode_step(&mut decoder, byte, &mut text, false);
            offsets.push(text.len());
        }
        had_errors |= decode_step(&mut decoder, &[], &mut text, true);
        // A sequence cut off by end of input is flushed after the last byte.
        if let Some(last) = offsets.last_mut() {
            *last = text.len();
        }

        return Decoded { encoding: self, had_errors, offsets, text };
    }

    /// Encode text to bytes.
    ///
    /// encoding_rs only encodes to UTF-8 for UTF-16 targets, so UTF-16LE code
    /// units are emitted directly.
    pub fn encode(self, text: &str) -> Vec<u8> {
        return match self {
            DescriptorEncoding::ShiftJis => SHIFT_JIS.encode(text).0.into_owned(),
            DescriptorEncoding::Utf16Le => text.encode_utf16().flat_map(u16::to_le_bytes).collect(),
        };
    }
}

impl std::fmt::Display for DescriptorEncoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        return f.write_str(match self {
            DescriptorEncoding::ShiftJis => "Shift_JIS",
            DescriptorEncoding::Utf16Le => "UTF-16LE",
        });
    }
}

/// Decode descriptor bytes by trying each candidate encoding in order.
///
/// A candidate validates when its text contains [`MARKER`]. Malformed
/// sequences elsewhere do not disqualify it; they decode as U+FFFD and
/// [`Decoded::had_errors`] is set. Inconsistent authoring tools are the reason
/// for the fallback, so the order is fixed rather than scored.
///
/// # Errors
///
/// Returns `Error::UndecodableContent` naming `origin` if no candidate validates.
pub fn decode(bytes: &[u8], origin: &Path) -> Result<Decoded, Error> {
    for encoding in CANDIDATES {
        let decoded = encoding.decode_tracked(bytes);
        if decoded.text.contains(MARKER) {
            return Ok(decoded);
        }
    }
    return Err(Error::UndecodableContent { path: origin.to_path_buf() });
}

/// Feed `chunk` to `decoder`, growing `text` until the chunk is consumed.
/// Returns whether a malformed sequence was replaced.
fn decode_step(decoder: &mut Decoder, chunk: &[u8], text: &mut String, last: bool) -> bool {
    let mut had_errors = false;
    let mut rest = chunk;
    loop {
        text.reserve(decoder.max_utf8_buffer_length(rest.len()).unwrap_or(rest.len().saturating_add(8)));
        let (result, read, errors) = decoder.decode_to_string(rest, text, last);
        had_errors |= errors;
        match result {
            CoderResult::InputEmpty => return had_errors,
            CoderResult::OutputFull => rest = rest.get(read..).unwrap_or_default(),
        }
    }
}
