//! HTTP body extraction.

use std::fmt;
use tracing::debug;

/// Separator between the header block and the body.
pub const HEADER_DELIMITER: &str = "\r\n\r\n";

/// Substring looked for when the request is not valid UTF-8.
const HELLO: &[u8] = b"hello";

/// Message extracted from a request buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extracted {
    /// The request decoded as UTF-8; body (or whole payload) trimmed.
    DecodedText(String),
    /// Decoding failed but the raw bytes contain `hello`.
    FallbackHello,
    /// Decoding failed; lowercase hex of the raw bytes.
    RawHex(String),
}

impl fmt::Display for Extracted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Extracted::DecodedText(text) => f.write_str(text),
            Extracted::FallbackHello => f.write_str("hello"),
            Extracted::RawHex(hex) => write!(f, "[Raw data: {hex}]"),
        }
    }
}

/// Extract the message carried by a request buffer.
///
/// A multi-byte character cut off by the end of the read buffer is not a
/// decoding failure: the text before it is used.
pub fn extract_message(request: &[u8]) -> Extracted {
    match std::str::from_utf8(request) {
        Ok(text) => decoded(text),
        Err(e) if e.error_len().is_none() => {
            let valid = &request[..e.valid_up_to()];
            debug!(dropped = request.len() - valid.len(), "Request ends mid-character");
            // valid_up_to() marks a UTF-8 boundary
            match std::str::from_utf8(valid) {
                Ok(text) => decoded(text),
                Err(_) => Extracted::RawHex(to_hex(request)),
            }
        }
        Err(e) => {
            debug!(error = %e, bytes = request.len(), "Request is not valid UTF-8");
            if contains(request, HELLO) {
                Extracted::FallbackHello
            } else {
                Extracted::RawHex(to_hex(request))
            }
        }
    }
}

fn decoded(text: &str) -> Extracted {
    debug!(request = %text, "Received HTTP request");
    Extracted::DecodedText(body(text).to_string())
}

/// Everything after the first delimiter, or the whole text when there is none.
fn body(text: &str) -> &str {
    match text.split_once(HEADER_DELIMITER) {
        Some((_, body)) => body.trim(),
        None => text.trim(),
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}

fn to_hex(bytes: &[u8]) -> String {
    use std::fmt::Write;

    let mut hex = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        // Writing to a String cannot fail
        let _ = write!(hex, "{byte:02x}");
    }
    hex
}
