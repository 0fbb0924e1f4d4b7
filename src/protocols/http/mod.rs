//! Minimal HTTP protocol implementation.
//!
//! No request-line validation happens: the buffer from a single read is
//! split on the first `\r\n\r\n` and whatever follows is taken as the
//! message. Every request that produced bytes gets the same response:
//!
//! ```text
//! HTTP/1.1 200 OK
//! Content-Type: text/plain
//! Connection: close
//!
//! Server received: <extracted message>
//! ```
//!
//! Text decoding is strict. When it fails the message degrades to
//! `hello` (if those ASCII bytes are present) or to a hex dump of the
//! raw bytes; see [`parser::Extracted`].

pub mod handler;
pub mod parser;
pub mod response;

pub use handler::process;
