//! HTTP protocol handler.

use super::{parser, response};
use crate::protocols::Exchange;

/// Extract the message and build the fixed reply for it.
pub fn process(request: &[u8]) -> Exchange {
    let message = parser::extract_message(request).to_string();
    let response = response::ok(&message);
    Exchange {
        message,
        response: Some(response),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_request_with_body() {
        let exchange = process(b"POST / HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello");
        assert_eq!(exchange.message, "hello");
        let response = exchange.response.unwrap();
        assert!(response.starts_with(b"HTTP/1.1 200 OK\r\n"));
        assert!(response.ends_with(b"Server received: hello"));
    }

    #[test]
    fn test_process_raw_bytes_still_answers_200() {
        let exchange = process(&[0x80, 0x81]);
        assert_eq!(exchange.message, "[Raw data: 8081]");
        let response = exchange.response.unwrap();
        assert!(response.starts_with(b"HTTP/1.1 200 OK\r\n"));
        assert!(response.ends_with(b"Server received: [Raw data: 8081]"));
    }
}
