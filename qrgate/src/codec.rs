//! QR payload codec
//!
//! Long texts are shrunk with snappy before being rendered into a QR code.
//! Every codec payload starts with a marker byte:
//!
//! | first byte | body                         |
//! |------------|------------------------------|
//! | `0xFE`     | the UTF-8 text, unchanged    |
//! | `0xFF`     | snappy raw block of the text |
//!
//! Neither `0xFE` nor `0xFF` can appear anywhere in valid UTF-8, so a
//! payload produced by another tool (a plain URL, say) is never mistaken
//! for a codec payload. [`decode_payload`] relies on that to auto-detect.
//!
//! Compression is best effort: when snappy does not beat the raw text, the
//! text is stored behind the raw marker instead.

use std::error::Error;
use std::fmt;

/// Marks a payload whose body is the text itself
pub const RAW_MARKER: u8 = 0xFE;
/// Marks a payload whose body is a snappy raw block
pub const COMPRESSED_MARKER: u8 = 0xFF;

/// Errors produced while encoding or decoding a payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The payload has no bytes at all
    Empty,
    /// The first byte is not a codec marker
    UnknownMarker(u8),
    /// Snappy rejected the input
    Corrupt(String),
    /// The decoded bytes are not UTF-8
    InvalidUtf8(String),
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::Empty => write!(f, "empty payload"),
            CodecError::UnknownMarker(b) => write!(f, "unknown payload marker 0x{b:02X}"),
            CodecError::Corrupt(msg) => write!(f, "invalid compressed data: {msg}"),
            CodecError::InvalidUtf8(msg) => write!(f, "payload is not valid UTF-8: {msg}"),
        }
    }
}

impl Error for CodecError {}

/// How a decoded payload was stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadEncoding {
    /// No marker: text written by something other than this codec
    Plain,
    /// Raw marker
    Raw,
    /// Compressed marker
    Compressed,
}

/// Text recovered from a QR payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedPayload {
    pub text: String,
    pub encoding: PayloadEncoding,
}

impl DecodedPayload {
    pub fn was_compressed(&self) -> bool {
        self.encoding == PayloadEncoding::Compressed
    }
}

/// Encode `text` into a marked payload, compressing when it helps
///
/// # Example
///
/// ```
/// use qrgate::codec::{self, COMPRESSED_MARKER, RAW_MARKER};
///
/// let short = codec::compress("hi").unwrap();
/// assert_eq!(short, [RAW_MARKER, b'h', b'i']);
///
/// let long = codec::compress(&"abc".repeat(100)).unwrap();
/// assert_eq!(long[0], COMPRESSED_MARKER);
/// assert!(long.len() < 300);
/// ```
pub fn compress(text: &str) -> Result<Vec<u8>, CodecError> {
    let raw = text.as_bytes();
    let body = snap::raw::Encoder::new()
        .compress_vec(raw)
        .map_err(|e| CodecError::Corrupt(e.to_string()))?;

    let (marker, body) = if body.len() < raw.len() {
        (COMPRESSED_MARKER, body.as_slice())
    } else {
        (RAW_MARKER, raw)
    };

    let mut payload = Vec::with_capacity(body.len() + 1);
    payload.push(marker);
    payload.extend_from_slice(body);
    Ok(payload)
}

/// Decode a marked payload back into text
///
/// Unmarked input is rejected; see [`decode_payload`] for the lenient path.
pub fn decompress(payload: &[u8]) -> Result<String, CodecError> {
    let (&marker, body) = payload.split_first().ok_or(CodecError::Empty)?;
    match marker {
        RAW_MARKER => into_text(body.to_vec()),
        COMPRESSED_MARKER => {
            let inflated = snap::raw::Decoder::new()
                .decompress_vec(body)
                .map_err(|e| CodecError::Corrupt(e.to_string()))?;
            into_text(inflated)
        }
        other => Err(CodecError::UnknownMarker(other)),
    }
}

/// Decode any scanned QR payload, decompressing only codec payloads
///
/// # Example
///
/// ```
/// use qrgate::codec::{self, PayloadEncoding};
///
/// let plain = codec::decode_payload(b"https://example.com").unwrap();
/// assert_eq!(plain.encoding, PayloadEncoding::Plain);
///
/// let packed = codec::compress(&"long text ".repeat(20)).unwrap();
/// let decoded = codec::decode_payload(&packed).unwrap();
/// assert!(decoded.was_compressed());
/// ```
pub fn decode_payload(payload: &[u8]) -> Result<DecodedPayload, CodecError> {
    match payload.first() {
        Some(&RAW_MARKER) => Ok(DecodedPayload {
            text: decompress(payload)?,
            encoding: PayloadEncoding::Raw,
        }),
        Some(&COMPRESSED_MARKER) => Ok(DecodedPayload {
            text: decompress(payload)?,
            encoding: PayloadEncoding::Compressed,
        }),
        _ => Ok(DecodedPayload {
            text: into_text(payload.to_vec())?,
            encoding: PayloadEncoding::Plain,
        }),
    }
}

fn into_text(bytes: Vec<u8>) -> Result<String, CodecError> {
    String::from_utf8(bytes).map_err(|e| CodecError::InvalidUtf8(e.to_string()))
}
