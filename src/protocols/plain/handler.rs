//! Plain protocol handler.

use crate::protocols::Exchange;

/// Decode the request as text and trim it.
///
/// Invalid UTF-8 is replaced rather than rejected so every payload has
/// something to log.
pub fn process(request: &[u8]) -> Exchange {
    let message = String::from_utf8_lossy(request).trim().to_string();
    Exchange {
        message,
        response: None,
    }
}
