//! Protocol implementations.
//!
//! Each protocol turns the bytes of a single read into an [`Exchange`]:
//! the message to log and, optionally, the bytes to write back.
//!
//! - `plain`: log the received text, no reply
//! - `http`: extract the request body and reply with a fixed 200 response

pub mod http;
pub mod plain;

use crate::config::ProtocolType;
use bytes::BytesMut;

/// Result of processing one request buffer.
#[derive(Debug)]
pub struct Exchange {
    /// Human-readable form of what the peer sent.
    pub message: String,
    /// Bytes to write back before closing, if any.
    pub response: Option<BytesMut>,
}

/// Process a request buffer with the configured protocol.
pub fn process(protocol: ProtocolType, request: &[u8]) -> Exchange {
    match protocol {
        ProtocolType::Plain => plain::process(request),
        ProtocolType::Http => http::process(request),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_by_protocol() {
        let plain = process(ProtocolType::Plain, b"hello world\n");
        assert_eq!(plain.message, "hello world");
        assert!(plain.response.is_none());

        let http = process(ProtocolType::Http, b"hello world");
        assert_eq!(http.message, "hello world");
        assert!(http.response.is_some());
    }
}
