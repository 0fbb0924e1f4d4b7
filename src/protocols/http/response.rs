//! Fixed HTTP response construction.

use bytes::BytesMut;

const HEAD: &[u8] = b"HTTP/1.1 200 OK\r\n\
Content-Type: text/plain\r\n\
Connection: close\r\n\
\r\n";

const BODY_PREFIX: &[u8] = b"Server received: ";

/// Build the 200 response echoing `message`.
pub fn ok(message: &str) -> BytesMut {
    let mut response = BytesMut::with_capacity(HEAD.len() + BODY_PREFIX.len() + message.len());
    response.extend_from_slice(HEAD);
    response.extend_from_slice(BODY_PREFIX);
    response.extend_from_slice(message.as_bytes());
    response
}
